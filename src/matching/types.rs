// src/matching/types.rs — Match scoring types

use serde::{Deserialize, Serialize};

use crate::playbook::types::Playbook;

/// The caller's query context for a match run.
#[derive(Debug, Clone, Default)]
pub struct MatchContext {
    pub query: String,
    pub domain: Option<String>,
    pub scenario: Option<String>,
    /// Upper bound on acceptable action count, when the caller has one.
    pub max_steps: Option<usize>,
    /// Resources the caller can actually provide.
    pub available_resources: Vec<String>,
    /// Tag patterns that worked for this caller in the past.
    pub successful_tags: Vec<String>,
}

impl MatchContext {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Query text for the retrieval layer: free text plus structured context.
    pub fn search_text(&self) -> String {
        let mut text = self.query.clone();
        for part in [&self.domain, &self.scenario].into_iter().flatten() {
            text.push(' ');
            text.push_str(part);
        }
        text
    }
}

/// Knobs the orchestrator may pass per match run.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub max_recommendations: usize,
    pub min_match_score: f64,
    pub use_dynamic_types: bool,
    pub use_similarity_matching: bool,
    pub similarity_threshold: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_recommendations: 5,
            min_match_score: 0.3,
            use_dynamic_types: true,
            use_similarity_matching: true,
            similarity_threshold: 0.5,
        }
    }
}

/// How a type tag earned its contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMatchKind {
    Exact,
    Similar,
    CoOccurrence,
}

/// Per-tag score breakdown for dynamic-type matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagScore {
    pub tag: String,
    pub score: f64,
    pub kind: TagMatchKind,
}

/// A ranked match: the playbook, its final [0, 1] score, and the
/// justification trail. Never persisted.
#[derive(Debug, Clone)]
pub struct PlaybookMatch {
    pub playbook: Playbook,
    pub score: f64,
    pub reasons: Vec<String>,
    /// 0-based indices of actions executable with the caller's resources.
    pub applicable_steps: Vec<usize>,
    /// Populated by the dynamic-type path only.
    pub tag_scores: Vec<TagScore>,
}
