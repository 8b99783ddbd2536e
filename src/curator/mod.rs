// src/curator/mod.rs — Corpus curation: merge near-duplicates, archive stale

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::corpus::Store;
use crate::infra::errors::Result;
use crate::playbook::metrics::merge_metrics;
use crate::playbook::types::{Playbook, PlaybookStatus};
use crate::provider::{VectorIndexProvider, VectorRecord};
use crate::retrieval::HybridSearcher;

/// Vector similarity at which a neighbor pair becomes a duplicate candidate.
const DUPLICATE_SIMILARITY: f64 = 0.9;

/// Neighbors fetched per playbook during duplicate detection.
const NEIGHBOR_LIMIT: usize = 5;

/// Names closer than this edit distance indicate the same strategy.
const MERGE_NAME_DISTANCE: usize = 3;

/// Archive candidates: unused longer than this and underperforming.
const ARCHIVE_STALE_DAYS: i64 = 90;
const ARCHIVE_SUCCESS_FLOOR: f64 = 0.5;

/// Outcome of one maintenance run. Always returned, even when individual
/// merges or archives failed along the way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub merged: usize,
    pub archived: usize,
}

/// Keeps the corpus small and high-quality: merges near-duplicates and
/// archives stale, low-performing playbooks. Archiving never deletes; the
/// only deletion path is the merge loser after its metrics are folded in.
pub struct Curator {
    store: Arc<Store>,
    vector: Arc<dyn VectorIndexProvider>,
    searcher: Arc<HybridSearcher>,
}

impl Curator {
    pub fn new(
        store: Arc<Store>,
        vector: Arc<dyn VectorIndexProvider>,
        searcher: Arc<HybridSearcher>,
    ) -> Self {
        Self {
            store,
            vector,
            searcher,
        }
    }

    /// Find duplicates, merge qualifying pairs, then archive stale
    /// playbooks. Each item is isolated: one failure is logged and the run
    /// continues.
    pub async fn maintain(&self) -> Result<MaintenanceReport> {
        let merged = self.merge_duplicates().await?;
        let archived = self.archive_stale().await?;
        info!(merged, archived, "knowledge base maintenance complete");
        Ok(MaintenanceReport { merged, archived })
    }

    async fn merge_duplicates(&self) -> Result<usize> {
        let active = self.store.list_by_status(PlaybookStatus::Active)?;
        let mut processed: HashSet<String> = HashSet::new();
        let mut merged = 0;

        for playbook in &active {
            if processed.contains(&playbook.id) {
                continue;
            }
            processed.insert(playbook.id.clone());

            let query = format!("{} {}", playbook.name, playbook.description);
            let hits = match self
                .vector
                .find_relevant(&query, NEIGHBOR_LIMIT, DUPLICATE_SIMILARITY)
                .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(playbook = %playbook.id, error = %e, "neighbor lookup failed; skipping");
                    continue;
                }
            };

            for hit in &hits {
                if hit.score < DUPLICATE_SIMILARITY {
                    continue;
                }
                let Some(candidate) = VectorRecord::parse(hit).into_playbook() else {
                    continue;
                };
                if candidate.id == playbook.id || processed.contains(&candidate.id) {
                    continue;
                }
                processed.insert(candidate.id.clone());

                match self.merge_pair(&playbook.id, &candidate.id).await {
                    Ok(true) => merged += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(
                            keeper = %playbook.id,
                            loser = %candidate.id,
                            error = %e,
                            "merge failed; continuing with remaining pairs"
                        );
                    }
                }
            }
        }
        Ok(merged)
    }

    /// Merge two duplicate candidates if they qualify. Both sides are
    /// re-read from the store first; vector metadata can be stale.
    async fn merge_pair(&self, id_a: &str, id_b: &str) -> Result<bool> {
        let (Some(a), Some(b)) = (self.store.get_playbook(id_a)?, self.store.get_playbook(id_b)?)
        else {
            return Ok(false);
        };
        if !should_merge(&a, &b) {
            return Ok(false);
        }

        // The keeper is the one with the higher current success rate.
        let (mut keeper, loser) = if a.metrics.success_rate >= b.metrics.success_rate {
            (a, b)
        } else {
            (b, a)
        };

        keeper.metrics = merge_metrics(&keeper.metrics, &loser.metrics);
        for source in &loser.source_learning_ids {
            if !keeper.source_learning_ids.contains(source) {
                keeper.source_learning_ids.push(source.clone());
            }
        }
        keeper.updated_at = Utc::now();

        // Keeper updated before the loser disappears; a failure in between
        // leaves both records present rather than losing data.
        self.store.update_playbook(&keeper)?;
        self.searcher.index_playbook(&keeper).await?;
        self.store.delete_playbook(&loser.id)?;
        if let Err(e) = self.searcher.remove(&loser.id).await {
            warn!(loser = %loser.id, error = %e, "loser deindex failed; index will heal on rebuild");
        }

        info!(keeper = %keeper.id, loser = %loser.id, "merged duplicate playbooks");
        Ok(true)
    }

    async fn archive_stale(&self) -> Result<usize> {
        let active = self.store.list_by_status(PlaybookStatus::Active)?;
        let now = Utc::now();
        let mut archived = 0;

        for playbook in &active {
            if !is_archive_candidate(playbook, now) {
                continue;
            }
            match self
                .store
                .set_status(&playbook.id, PlaybookStatus::Archived, now)
            {
                Ok(()) => {
                    info!(playbook = %playbook.id, name = %playbook.name, "archived stale playbook");
                    archived += 1;
                }
                Err(e) => {
                    warn!(playbook = %playbook.id, error = %e, "archive failed; continuing");
                }
            }
        }
        Ok(archived)
    }
}

/// Merge when the names are nearly identical or the stakeholder sets match
/// exactly; otherwise the pair stays separate.
fn should_merge(a: &Playbook, b: &Playbook) -> bool {
    if strsim::levenshtein(&a.name, &b.name) < MERGE_NAME_DISTANCE {
        return true;
    }
    let stakeholders_a: HashSet<&str> = a.stakeholders.iter().map(String::as_str).collect();
    let stakeholders_b: HashSet<&str> = b.stakeholders.iter().map(String::as_str).collect();
    stakeholders_a == stakeholders_b
}

/// Stale and underperforming: unused for more than 90 days with a success
/// rate below 0.5. A playbook that was never used ages from its creation.
fn is_archive_candidate(playbook: &Playbook, now: DateTime<Utc>) -> bool {
    let reference = playbook.metrics.last_used.unwrap_or(playbook.created_at);
    let days_since_used = (now - reference).num_days();
    days_since_used > ARCHIVE_STALE_DAYS && playbook.metrics.success_rate < ARCHIVE_SUCCESS_FLOOR
}
