// src/playbook/types.rs — Playbook data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tags that mark a playbook as distilled from failures. Such playbooks are
/// scored on context fit instead of success rate.
pub const RISK_TAGS: [&str; 2] = ["failure-derived", "risk-avoidance"];

/// Lifecycle state of a playbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybookStatus {
    Active,
    Archived,
    Deprecated,
}

impl Default for PlaybookStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl PlaybookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Deprecated => "deprecated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            "deprecated" => Some(Self::Deprecated),
            _ => None,
        }
    }
}

/// A dynamically discovered type tag carried by a playbook, with the
/// confidence the discovery path assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeTag {
    pub name: String,
    pub confidence: f64,
}

/// One step of a playbook's action sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookAction {
    pub step: u32,
    pub description: String,
    #[serde(default)]
    pub expected_outcome: String,
    #[serde(default)]
    pub resources: Vec<String>,
}

/// Mutable usage metrics. Updated only through the pure functions in
/// `playbook::metrics`, then persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookMetrics {
    pub usage_count: u32,
    /// Always within [0, 1]; recomputed as an exponential moving average.
    pub success_rate: f64,
    pub avg_outcome_score: f64,
    pub avg_execution_time_ms: f64,
    pub last_used: Option<DateTime<Utc>>,
    pub user_satisfaction: f64,
}

impl Default for PlaybookMetrics {
    fn default() -> Self {
        Self {
            usage_count: 0,
            success_rate: 0.5,
            avg_outcome_score: 0.0,
            avg_execution_time_ms: 0.0,
            last_used: None,
            user_satisfaction: 0.0,
        }
    }
}

/// A reusable strategy record distilled from past task executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub status: PlaybookStatus,

    /// Coarse classification (problem-solving, growth, crisis, ...).
    pub playbook_type: String,
    /// Dynamic type tags with per-tag confidence.
    #[serde(default)]
    pub type_tags: Vec<TypeTag>,

    pub domain: String,
    pub scenario: String,
    #[serde(default)]
    pub complexity: String,
    #[serde(default)]
    pub stakeholders: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,

    pub actions: Vec<PlaybookAction>,

    #[serde(default)]
    pub source_learning_ids: Vec<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub optimization_count: u32,

    pub metrics: PlaybookMetrics,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Playbook {
    /// Create a fresh active playbook with default metrics.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            version: "1.0.0".into(),
            status: PlaybookStatus::Active,
            playbook_type: "problem-solving".into(),
            type_tags: Vec::new(),
            domain: String::new(),
            scenario: String::new(),
            complexity: String::new(),
            stakeholders: Vec::new(),
            tags: Vec::new(),
            actions: Vec::new(),
            source_learning_ids: Vec::new(),
            parent_id: None,
            optimization_count: 0,
            metrics: PlaybookMetrics::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this playbook records failures rather than successes.
    pub fn is_risk_tagged(&self) -> bool {
        self.tags
            .iter()
            .any(|t| RISK_TAGS.contains(&t.as_str()))
    }

    /// All resources referenced across the action sequence.
    pub fn required_resources(&self) -> HashSet<&str> {
        self.actions
            .iter()
            .flat_map(|a| a.resources.iter().map(String::as_str))
            .collect()
    }

    /// Text used for textual match scoring.
    pub fn match_text(&self) -> String {
        format!("{} {} {}", self.name, self.description, self.scenario)
    }
}

/// A named type tag in the vocabulary, with the keywords that define it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagVocabularyEntry {
    pub name: String,
    pub keywords: Vec<String>,
    pub confidence: f64,
    pub first_identified: DateTime<Utc>,
    /// How many playbooks currently carry this tag.
    pub playbook_count: u32,
    /// True when the tag was discovered automatically rather than authored.
    pub auto_discovered: bool,
}

impl TagVocabularyEntry {
    pub fn new(name: impl Into<String>, keywords: Vec<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            keywords,
            confidence,
            first_identified: Utc::now(),
            playbook_count: 0,
            auto_discovered: false,
        }
    }
}

/// A symmetric pairwise tag relation. Canonicalized so `tag1 < tag2`
/// lexically, which guarantees a single row per unordered pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityRecord {
    pub tag1: String,
    pub tag2: String,
    pub score: f64,
    pub co_occurrence: u64,
    pub updated_at: DateTime<Utc>,
}

impl SimilarityRecord {
    /// Whether this record involves the given tag on either side.
    pub fn involves(&self, tag: &str) -> bool {
        self.tag1 == tag || self.tag2 == tag
    }

    /// The tag opposite `tag` in the pair.
    pub fn other(&self, tag: &str) -> &str {
        if self.tag1 == tag {
            &self.tag2
        } else {
            &self.tag1
        }
    }
}

/// Canonicalize an unordered tag pair so `tag1 < tag2` lexically.
pub fn canonical_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// A recorded execution trace of a past task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    pub id: String,
    /// The user input that started the task.
    pub input: String,
    /// Descriptions of the steps taken, in order.
    #[serde(default)]
    pub steps: Vec<String>,
    /// Tools used during execution.
    #[serde(default)]
    pub tools: Vec<String>,
    pub success: bool,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl Trajectory {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            input: input.into(),
            steps: Vec::new(),
            tools: Vec::new(),
            success: true,
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    /// Keyword set used for clustering.
    pub fn keywords(&self) -> Vec<String> {
        crate::util::tokenize(&self.input)
    }
}
