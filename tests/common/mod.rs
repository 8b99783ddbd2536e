// tests/common/mod.rs — Shared fixtures: in-memory corpus + fake providers
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use stratagem::corpus::{self, Store};
use stratagem::infra::errors::{EngineError, Result};
use stratagem::infra::logger::init_logging;
use stratagem::playbook::types::{Playbook, TagVocabularyEntry, Trajectory};
use stratagem::provider::{
    CompletionProvider, IndexRequest, Message, ToolRecord, VectorHit, VectorIndexProvider,
};

pub fn setup() -> Arc<Store> {
    init_logging("warn");
    Arc::new(corpus::in_memory().unwrap())
}

/// Vector provider that serves hits from whatever was indexed into it,
/// matching on naive token overlap with the query.
#[derive(Default)]
pub struct EchoVector {
    indexed: Mutex<HashMap<String, IndexRequest>>,
}

#[async_trait]
impl VectorIndexProvider for EchoVector {
    async fn index(&self, request: IndexRequest) -> Result<()> {
        self.indexed
            .lock()
            .unwrap()
            .insert(request.id.clone(), request);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.indexed.lock().unwrap().remove(id);
        Ok(())
    }

    async fn find_relevant(
        &self,
        query: &str,
        limit: usize,
        _threshold: f64,
    ) -> Result<Vec<VectorHit>> {
        let query_tokens: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect();

        let indexed = self.indexed.lock().unwrap();
        let mut hits: Vec<(usize, VectorHit)> = indexed
            .values()
            .filter_map(|request| {
                let text = request.text.to_lowercase();
                let overlap = query_tokens.iter().filter(|t| text.contains(*t)).count();
                if overlap == 0 {
                    return None;
                }
                Some((
                    overlap,
                    VectorHit {
                        tool: ToolRecord {
                            name: request.id.clone(),
                            metadata: request.metadata.clone(),
                        },
                        score: 0.9,
                    },
                ))
            })
            .collect();
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(hits.into_iter().take(limit).map(|(_, h)| h).collect())
    }
}

/// Vector provider returning a fixed hit list regardless of the query.
pub struct StaticVector {
    pub hits: Vec<VectorHit>,
}

#[async_trait]
impl VectorIndexProvider for StaticVector {
    async fn index(&self, _request: IndexRequest) -> Result<()> {
        Ok(())
    }
    async fn remove(&self, _id: &str) -> Result<()> {
        Ok(())
    }
    async fn find_relevant(
        &self,
        _query: &str,
        _limit: usize,
        _threshold: f64,
    ) -> Result<Vec<VectorHit>> {
        Ok(self.hits.clone())
    }
}

/// Vector provider that always fails.
pub struct DownVector;

#[async_trait]
impl VectorIndexProvider for DownVector {
    async fn index(&self, _request: IndexRequest) -> Result<()> {
        Err(EngineError::provider("vector", "index unavailable"))
    }
    async fn remove(&self, _id: &str) -> Result<()> {
        Err(EngineError::provider("vector", "index unavailable"))
    }
    async fn find_relevant(
        &self,
        _query: &str,
        _limit: usize,
        _threshold: f64,
    ) -> Result<Vec<VectorHit>> {
        Err(EngineError::provider("vector", "index unavailable"))
    }
}

/// Completion provider replying with a fixed string.
pub struct CannedCompletion {
    pub response: String,
}

impl CannedCompletion {
    pub fn new(response: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            response: response.into(),
        })
    }
}

#[async_trait]
impl CompletionProvider for CannedCompletion {
    async fn complete(&self, _messages: &[Message]) -> Result<String> {
        Ok(self.response.clone())
    }
}

/// Completion provider that always fails.
pub struct DownCompletion;

#[async_trait]
impl CompletionProvider for DownCompletion {
    async fn complete(&self, _messages: &[Message]) -> Result<String> {
        Err(EngineError::provider("completion", "model unavailable"))
    }
}

pub fn playbook(id: &str, name: &str, description: &str) -> Playbook {
    let mut p = Playbook::new(name, description);
    p.id = id.to_string();
    p
}

pub fn vocab_entry(name: &str, keywords: &[&str], confidence: f64, count: u32) -> TagVocabularyEntry {
    let mut entry = TagVocabularyEntry::new(
        name,
        keywords.iter().map(|s| s.to_string()).collect(),
        confidence,
    );
    entry.playbook_count = count;
    entry
}

pub fn trajectory(input: &str, tools: &[&str], duration_ms: u64) -> Trajectory {
    let mut t = Trajectory::new(input);
    t.tools = tools.iter().map(|s| s.to_string()).collect();
    t.duration_ms = duration_ms;
    t
}
