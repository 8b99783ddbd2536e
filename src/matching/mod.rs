// src/matching/mod.rs — Match scoring engine

pub mod scorer;
pub mod signals;
pub mod types;

pub use scorer::MatchScorer;
pub use types::{MatchConfig, MatchContext, PlaybookMatch, TagMatchKind, TagScore};
