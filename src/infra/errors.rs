// src/infra/errors.rs — Error types for the playbook engine

use thiserror::Error;

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    // Lookup failures (surfaced to the caller, not retried)
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    // Bad input ranges / self-pair requests (rejected, never coerced)
    #[error("validation failed: {0}")]
    Validation(String),

    // Malformed collaborator output (recovered locally by skipping the item)
    #[error("failed to parse collaborator response: {0}")]
    Parse(String),

    // Vector / LLM collaborator failures (degradable at call sites)
    #[error("{provider} provider error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    // Infra
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        EngineError::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Whether this error may be recovered by skipping the offending item
    /// and continuing the batch.
    pub fn is_degradable(&self) -> bool {
        matches!(self, EngineError::Parse(_) | EngineError::Provider { .. })
    }
}
