// src/extraction/mod.rs — Trajectory clustering and batch extraction

pub mod clusterer;
pub mod extractor;

pub use clusterer::{cluster_trajectories, TrajectoryCluster};
pub use extractor::{BatchExtractor, ExtractionOptions, BATCH_EXTRACTED_TAG};
