// src/retrieval/hybrid.rs — Hybrid lexical + vector retrieval

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use super::fusion::{fuse, RankedLeg, RRF_K};
use super::lexical::LexicalIndex;
use crate::corpus::Store;
use crate::infra::errors::Result;
use crate::playbook::types::{Playbook, PlaybookStatus};
use crate::provider::{playbook_index_request, VectorIndexProvider, VectorRecord};
use crate::util::truncate_str;

/// Minimum vector similarity forwarded to the ANN provider.
const VECTOR_THRESHOLD: f64 = 0.3;

/// Per-leg fusion weights. The semantic leg carries more by default.
#[derive(Debug, Clone, Copy)]
pub struct SearchWeights {
    pub lexical: f64,
    pub vector: f64,
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self {
            lexical: 0.4,
            vector: 0.6,
        }
    }
}

/// A materialized search result with its fused score.
#[derive(Debug, Clone)]
pub struct ScoredPlaybook {
    pub playbook: Playbook,
    pub score: f64,
}

/// Ranks candidate playbooks against a free-text query by fusing the
/// in-process lexical index with the external vector provider.
pub struct HybridSearcher {
    index: Mutex<LexicalIndex>,
    vector: Arc<dyn VectorIndexProvider>,
    store: Arc<Store>,
}

impl HybridSearcher {
    pub fn new(store: Arc<Store>, vector: Arc<dyn VectorIndexProvider>) -> Self {
        Self {
            index: Mutex::new(LexicalIndex::new()),
            vector,
            store,
        }
    }

    /// Index a playbook in both legs.
    pub async fn index_playbook(&self, playbook: &Playbook) -> Result<()> {
        self.index().index_playbook(playbook);
        self.vector.index(playbook_index_request(playbook)?).await
    }

    /// Remove a playbook from both legs.
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.index().remove(id);
        self.vector.remove(id).await
    }

    /// Rebuild the in-process lexical index from the authoritative corpus.
    /// Deprecated playbooks are left out entirely.
    pub fn rebuild_from_corpus(&self) -> Result<usize> {
        let playbooks = self.store.list_playbooks()?;
        let mut index = self.index();
        index.clear();
        let mut count = 0;
        for p in &playbooks {
            if p.status != PlaybookStatus::Deprecated {
                index.index_playbook(p);
                count += 1;
            }
        }
        Ok(count)
    }

    /// Fused search. Both legs fetch `limit * 2` candidates; a vector-leg
    /// failure degrades to lexical-only results rather than erroring.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        weights: Option<SearchWeights>,
    ) -> Result<Vec<ScoredPlaybook>> {
        let w = weights.unwrap_or_default();
        let fetch = limit * 2;

        // Lexical leg first; the index lock is dropped before the provider
        // call suspends.
        let lexical_ids: Vec<String> = {
            self.index()
                .search(query, fetch)
                .into_iter()
                .map(|(id, _)| id)
                .collect()
        };

        let vector_ids: Vec<String> = match self
            .vector
            .find_relevant(query, fetch, VECTOR_THRESHOLD)
            .await
        {
            Ok(hits) => hits
                .iter()
                .filter_map(|hit| VectorRecord::parse(hit).into_playbook())
                .map(|p| p.id)
                .collect(),
            Err(e) => {
                warn!(
                    error = %e,
                    query = truncate_str(query, 80),
                    "vector leg failed; degrading to lexical-only results"
                );
                Vec::new()
            }
        };

        let fused = fuse(
            &[
                RankedLeg::new(w.lexical, lexical_ids),
                RankedLeg::new(w.vector, vector_ids),
            ],
            RRF_K,
        );

        let mut results = Vec::with_capacity(limit);
        for (id, score) in fused {
            if results.len() >= limit {
                break;
            }
            // Ids can come back from a stale leg; missing rows are skipped.
            if let Some(playbook) = self.store.get_playbook(&id)? {
                if playbook.status != PlaybookStatus::Deprecated {
                    results.push(ScoredPlaybook { playbook, score });
                }
            }
        }
        Ok(results)
    }

    fn index(&self) -> MutexGuard<'_, LexicalIndex> {
        self.index.lock().expect("lexical index poisoned")
    }
}
