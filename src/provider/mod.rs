// src/provider/mod.rs — External collaborator contracts
//
// The engine never talks to an LLM or a vector index directly; it goes
// through these traits. The excluded transport subsystems implement them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::infra::errors::Result;
use crate::playbook::types::Playbook;

/// Metadata tag identifying a playbook-shaped record in the vector index.
pub const PLAYBOOK_RECORD_TYPE: &str = "strategic_playbook";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// LLM text-completion collaborator. Used only to distill free text into
/// structured playbook drafts and to rank execution sequences.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

/// A record handed to the vector index for approximate-nearest-neighbor
/// retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRequest {
    pub id: String,
    /// Text the provider embeds.
    pub text: String,
    /// Opaque payload returned verbatim on hits.
    pub metadata: serde_json::Value,
}

/// A loosely-typed tool record returned by the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRecord {
    pub name: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// One ANN search hit with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    pub tool: ToolRecord,
    pub score: f64,
}

/// Vector-index collaborator (an ANN search service).
#[async_trait]
pub trait VectorIndexProvider: Send + Sync {
    async fn index(&self, request: IndexRequest) -> Result<()>;
    async fn remove(&self, id: &str) -> Result<()>;
    async fn find_relevant(
        &self,
        query: &str,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<VectorHit>>;
}

/// The disambiguated shape of a vector-index hit.
///
/// Hits are heterogeneous; only records tagged `strategic_playbook` carry a
/// playbook payload. Anything else — including a tagged record whose payload
/// doesn't parse — is `Other`, never a partial object and never an error.
#[derive(Debug, Clone)]
pub enum VectorRecord {
    Playbook(Box<Playbook>),
    Other,
}

impl VectorRecord {
    pub fn parse(hit: &VectorHit) -> Self {
        let metadata = &hit.tool.metadata;
        if metadata.get("type").and_then(|v| v.as_str()) != Some(PLAYBOOK_RECORD_TYPE) {
            return VectorRecord::Other;
        }
        metadata
            .get("playbook")
            .and_then(|v| serde_json::from_value::<Playbook>(v.clone()).ok())
            .map(|p| VectorRecord::Playbook(Box::new(p)))
            .unwrap_or(VectorRecord::Other)
    }

    pub fn into_playbook(self) -> Option<Playbook> {
        match self {
            VectorRecord::Playbook(p) => Some(*p),
            VectorRecord::Other => None,
        }
    }
}

/// Build the index request for a playbook.
pub fn playbook_index_request(playbook: &Playbook) -> Result<IndexRequest> {
    let text = format!(
        "{} {} {} {} {}",
        playbook.name,
        playbook.description,
        playbook.domain,
        playbook.scenario,
        playbook.tags.join(" "),
    );
    Ok(IndexRequest {
        id: playbook.id.clone(),
        text,
        metadata: json!({
            "type": PLAYBOOK_RECORD_TYPE,
            "playbook": serde_json::to_value(playbook)?,
        }),
    })
}
