// src/playbook/mod.rs — Playbook domain model

pub mod metrics;
pub mod types;

pub use types::{
    canonical_pair, Playbook, PlaybookAction, PlaybookMetrics, PlaybookStatus, SimilarityRecord,
    TagVocabularyEntry, Trajectory, TypeTag,
};
