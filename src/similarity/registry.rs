// src/similarity/registry.rs — Pairwise tag similarity and co-occurrence

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::corpus::Store;
use crate::infra::cache::{ExpiringCache, DEFAULT_TTL};
use crate::infra::errors::{EngineError, Result};
use crate::playbook::types::{canonical_pair, SimilarityRecord};
use crate::util::jaccard;

/// Maximum boost the co-occurrence counter can add to a keyword similarity.
const COOCCURRENCE_BOOST_CAP: f64 = 0.2;

/// Maintains the symmetric, persisted matrix of tag-pair similarity and
/// co-occurrence, with short-TTL read caching.
///
/// Every pair is canonicalized (`tag1 < tag2`) before it touches the store
/// or a cache, so an unordered pair maps to exactly one row and one cache
/// entry. Caches are populated only after a successful persistence write.
pub struct SimilarityRegistry {
    store: Arc<Store>,
    pair_cache: Mutex<ExpiringCache<(String, String), f64>>,
    /// Keyed by (tag, threshold bits) — `f64` is not hashable directly.
    list_cache: Mutex<ExpiringCache<(String, u64), Vec<SimilarityRecord>>>,
}

impl SimilarityRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_ttl(store, DEFAULT_TTL)
    }

    pub fn with_ttl(store: Arc<Store>, ttl: Duration) -> Self {
        Self {
            store,
            pair_cache: Mutex::new(ExpiringCache::new(ttl)),
            list_cache: Mutex::new(ExpiringCache::new(ttl)),
        }
    }

    /// Similarity between two distinct vocabulary tags, in [0, 1].
    ///
    /// Served from cache when fresh, then from the persisted record; computed
    /// (and persisted) on first touch. Unknown tags are a `NotFound`; a
    /// self-pair is a `Validation` error.
    pub fn similarity(&self, tag_a: &str, tag_b: &str) -> Result<f64> {
        if tag_a == tag_b {
            return Err(EngineError::Validation(format!(
                "self-pair similarity requested for '{tag_a}'"
            )));
        }
        let pair = canonical_pair(tag_a, tag_b);

        if let Some(&score) = self.pair_cache().get(&pair) {
            return Ok(score);
        }

        let entry_a = self
            .store
            .get_tag(tag_a)?
            .ok_or_else(|| EngineError::not_found("tag", tag_a))?;
        let entry_b = self
            .store
            .get_tag(tag_b)?
            .ok_or_else(|| EngineError::not_found("tag", tag_b))?;

        if let Some(record) = self.store.get_similarity(&pair.0, &pair.1)? {
            self.pair_cache().insert(pair, record.score);
            return Ok(record.score);
        }

        let score = compute_similarity(&entry_a.keywords, &entry_b.keywords, 0);
        self.store.upsert_similarity(&SimilarityRecord {
            tag1: pair.0.clone(),
            tag2: pair.1.clone(),
            score,
            co_occurrence: 0,
            updated_at: Utc::now(),
        })?;
        self.pair_cache().insert(pair, score);

        debug!(tag_a, tag_b, score, "computed tag similarity");
        Ok(score)
    }

    /// All pairs involving `tag` with score >= threshold, best first.
    pub fn similar_tags(&self, tag: &str, threshold: f64) -> Result<Vec<SimilarityRecord>> {
        let key = (tag.to_string(), threshold.to_bits());
        if let Some(records) = self.list_cache().get(&key) {
            return Ok(records.clone());
        }

        let records = self.store.similar_records(tag, threshold)?;
        self.list_cache().insert(key, records.clone());
        Ok(records)
    }

    /// Record one co-occurrence of two tags. A self-pair is a no-op. The
    /// pair's initial similarity is computed and persisted on its first
    /// appearance.
    pub fn record_co_occurrence(&self, tag_a: &str, tag_b: &str) -> Result<()> {
        if tag_a == tag_b {
            return Ok(());
        }
        let pair = canonical_pair(tag_a, tag_b);

        match self.store.get_similarity(&pair.0, &pair.1)? {
            Some(existing) => {
                self.store.upsert_similarity(&SimilarityRecord {
                    co_occurrence: existing.co_occurrence + 1,
                    updated_at: Utc::now(),
                    ..existing
                })?;
                self.invalidate(&pair.0, &pair.1);
            }
            None => {
                let entry_a = self
                    .store
                    .get_tag(tag_a)?
                    .ok_or_else(|| EngineError::not_found("tag", tag_a))?;
                let entry_b = self
                    .store
                    .get_tag(tag_b)?
                    .ok_or_else(|| EngineError::not_found("tag", tag_b))?;

                let score = compute_similarity(&entry_a.keywords, &entry_b.keywords, 1);
                self.store.upsert_similarity(&SimilarityRecord {
                    tag1: pair.0.clone(),
                    tag2: pair.1.clone(),
                    score,
                    co_occurrence: 1,
                    updated_at: Utc::now(),
                })?;
                self.invalidate(&pair.0, &pair.1);
            }
        }
        Ok(())
    }

    /// Explicitly set a pair's similarity. The score must be within [0, 1]
    /// and the tags distinct; violations are rejected, not clamped.
    pub fn set_similarity(&self, tag_a: &str, tag_b: &str, score: f64) -> Result<()> {
        if tag_a == tag_b {
            return Err(EngineError::Validation(format!(
                "cannot set similarity of '{tag_a}' to itself"
            )));
        }
        if !(0.0..=1.0).contains(&score) {
            return Err(EngineError::Validation(format!(
                "similarity score {score} outside [0, 1]"
            )));
        }
        let pair = canonical_pair(tag_a, tag_b);

        let co_occurrence = self
            .store
            .get_similarity(&pair.0, &pair.1)?
            .map(|r| r.co_occurrence)
            .unwrap_or(0);

        self.store.upsert_similarity(&SimilarityRecord {
            tag1: pair.0.clone(),
            tag2: pair.1.clone(),
            score,
            co_occurrence,
            updated_at: Utc::now(),
        })?;
        self.invalidate(&pair.0, &pair.1);
        Ok(())
    }

    /// Recompute similarity for every unordered pair across the vocabulary
    /// in one atomic batch, preserving accumulated co-occurrence counters.
    /// O(n^2) pair comparisons; the vocabulary stays in the low thousands.
    pub fn rebuild_matrix(&self) -> Result<usize> {
        let tags = self.store.all_tags()?;

        let co_occurrences: HashMap<(String, String), u64> = self
            .store
            .all_similarities()?
            .into_iter()
            .map(|r| ((r.tag1, r.tag2), r.co_occurrence))
            .collect();

        let now = Utc::now();
        let mut records = Vec::new();
        for (i, a) in tags.iter().enumerate() {
            for b in &tags[i + 1..] {
                let pair = canonical_pair(&a.name, &b.name);
                let cooc = co_occurrences.get(&pair).copied().unwrap_or(0);
                records.push(SimilarityRecord {
                    score: compute_similarity(&a.keywords, &b.keywords, cooc),
                    tag1: pair.0,
                    tag2: pair.1,
                    co_occurrence: cooc,
                    updated_at: now,
                });
            }
        }

        self.store.replace_similarities(&records)?;
        self.pair_cache().clear();
        self.list_cache().clear();

        debug!(pairs = records.len(), "rebuilt similarity matrix");
        Ok(records.len())
    }

    /// Drop the pair's cache entry and any cached lists touching either tag.
    fn invalidate(&self, tag1: &str, tag2: &str) {
        self.pair_cache()
            .remove(&(tag1.to_string(), tag2.to_string()));
        self.list_cache()
            .invalidate_where(|(tag, _)| tag == tag1 || tag == tag2);
    }

    fn pair_cache(&self) -> std::sync::MutexGuard<'_, ExpiringCache<(String, String), f64>> {
        self.pair_cache.lock().expect("similarity cache poisoned")
    }

    fn list_cache(
        &self,
    ) -> std::sync::MutexGuard<'_, ExpiringCache<(String, u64), Vec<SimilarityRecord>>> {
        self.list_cache.lock().expect("similarity cache poisoned")
    }
}

/// Keyword-set Jaccard similarity, boosted by co-occurrence and clamped.
fn compute_similarity(keywords_a: &[String], keywords_b: &[String], co_occurrence: u64) -> f64 {
    let base = jaccard(keywords_a, keywords_b);
    let boost = if co_occurrence > 0 {
        (((co_occurrence + 1) as f64).ln() * 0.05).min(COOCCURRENCE_BOOST_CAP)
    } else {
        0.0
    };
    (base + boost).clamp(0.0, 1.0)
}
