// src/manager/mod.rs — Inbound contract for the orchestrator

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::corpus::Store;
use crate::curator::{Curator, MaintenanceReport};
use crate::extraction::{BatchExtractor, ExtractionOptions};
use crate::infra::errors::{EngineError, Result};
use crate::matching::signals::{extract_type_signals, strong_signals};
use crate::matching::{MatchConfig, MatchContext, MatchScorer, PlaybookMatch};
use crate::playbook::metrics::{self, ExecutionObservation};
use crate::playbook::types::{Playbook, PlaybookMetrics, PlaybookStatus, TagVocabularyEntry};
use crate::provider::{CompletionProvider, Message, VectorIndexProvider};
use crate::retrieval::HybridSearcher;
use crate::similarity::SimilarityRegistry;
use crate::util::{extract_json_block, tokenize};

/// A recommended execution order over matched playbooks.
#[derive(Debug, Clone)]
pub struct SequenceRecommendation {
    /// Playbook ids in recommended execution order.
    pub sequence: Vec<String>,
    pub rationale: String,
    pub estimated_success_rate: f64,
}

/// Top-level orchestration facade: builds a search query, retrieves
/// candidates, scores them, and exposes the maintenance and extraction
/// entry points. All components are explicitly constructed and injected —
/// one manager per process (or per test), no global state.
pub struct PlaybookManager {
    store: Arc<Store>,
    registry: Arc<SimilarityRegistry>,
    searcher: Arc<HybridSearcher>,
    scorer: MatchScorer,
    extractor: BatchExtractor,
    curator: Curator,
    completion: Arc<dyn CompletionProvider>,
}

impl PlaybookManager {
    pub fn new(
        store: Arc<Store>,
        vector: Arc<dyn VectorIndexProvider>,
        completion: Arc<dyn CompletionProvider>,
    ) -> Self {
        let registry = Arc::new(SimilarityRegistry::new(store.clone()));
        let searcher = Arc::new(HybridSearcher::new(store.clone(), vector.clone()));
        let scorer = MatchScorer::new(registry.clone());
        let extractor = BatchExtractor::new(completion.clone(), store.clone());
        let curator = Curator::new(store.clone(), vector, searcher.clone());
        Self {
            store,
            registry,
            searcher,
            scorer,
            extractor,
            curator,
            completion,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<SimilarityRegistry> {
        &self.registry
    }

    pub fn searcher(&self) -> &Arc<HybridSearcher> {
        &self.searcher
    }

    /// Bootstrap the tag vocabulary (deployment seeding and tests).
    pub fn seed_vocabulary(&self, entries: &[TagVocabularyEntry]) -> Result<()> {
        for entry in entries {
            self.store.upsert_tag(entry)?;
        }
        Ok(())
    }

    /// Match playbooks against a query context.
    ///
    /// With dynamic types enabled, strong type signals narrow the candidate
    /// set and drive tag-based scoring; without a strong signal the standard
    /// hybrid path runs instead — graceful degradation, never an error.
    pub async fn match_playbooks(
        &self,
        ctx: &MatchContext,
        config: Option<MatchConfig>,
    ) -> Result<Vec<PlaybookMatch>> {
        let config = config.unwrap_or_default();
        let now = Utc::now();

        let mut matches = if config.use_dynamic_types {
            let vocabulary = self.store.all_tags()?;
            let signals = extract_type_signals(&ctx.query, &vocabulary);
            let strong = strong_signals(&signals);
            if strong.is_empty() {
                debug!("no strong type signal; using standard hybrid matching");
                self.standard_matches(ctx, &config, now).await?
            } else {
                let candidates = self.candidates_for_tags(&strong)?;
                if candidates.is_empty() {
                    self.standard_matches(ctx, &config, now).await?
                } else {
                    debug!(
                        signals = strong.len(),
                        candidates = candidates.len(),
                        "dynamic type matching"
                    );
                    candidates
                        .iter()
                        .map(|p| self.scorer.score_dynamic(p, &signals, ctx, &config, now))
                        .collect()
                }
            }
        } else {
            self.standard_matches(ctx, &config, now).await?
        };

        matches.retain(|m| m.score >= config.min_match_score);
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(config.max_recommendations);
        Ok(matches)
    }

    async fn standard_matches(
        &self,
        ctx: &MatchContext,
        config: &MatchConfig,
        now: chrono::DateTime<Utc>,
    ) -> Result<Vec<PlaybookMatch>> {
        let results = self
            .searcher
            .search(&ctx.search_text(), config.max_recommendations * 2, None)
            .await?;
        Ok(results
            .iter()
            .map(|scored| self.scorer.score(&scored.playbook, ctx, now))
            .collect())
    }

    /// Candidates carrying any of the strong signal tags. Deprecated
    /// playbooks are excluded before scoring ever runs.
    fn candidates_for_tags(&self, strong: &[(String, f64)]) -> Result<Vec<Playbook>> {
        let names: HashSet<&str> = strong.iter().map(|(name, _)| name.as_str()).collect();
        Ok(self
            .store
            .list_playbooks()?
            .into_iter()
            .filter(|p| p.status != PlaybookStatus::Deprecated)
            .filter(|p| p.type_tags.iter().any(|t| names.contains(t.name.as_str())))
            .collect())
    }

    /// Playbooks similar to an existing one, ranked. The source playbook is
    /// excluded from its own results.
    pub async fn find_similar_playbooks(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<PlaybookMatch>> {
        let playbook = self
            .store
            .get_playbook(id)?
            .ok_or_else(|| EngineError::not_found("playbook", id))?;

        let ctx = MatchContext::new(playbook.match_text());
        let now = Utc::now();
        let results = self.searcher.search(&ctx.query, limit + 1, None).await?;

        let mut matches: Vec<PlaybookMatch> = results
            .iter()
            .filter(|scored| scored.playbook.id != id)
            .map(|scored| self.scorer.score(&scored.playbook, &ctx, now))
            .collect();
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(limit);
        Ok(matches)
    }

    /// Recommend an execution order over the matching playbooks.
    ///
    /// The LLM ranks and explains; a malformed response falls back to match
    /// order with the average success rate as the estimate.
    pub async fn recommend_sequence(
        &self,
        ctx: &MatchContext,
        target_outcome: &str,
    ) -> Result<SequenceRecommendation> {
        let matches = self.match_playbooks(ctx, None).await?;
        if matches.is_empty() {
            return Ok(SequenceRecommendation {
                sequence: Vec::new(),
                rationale: "no matching playbooks for this context".to_string(),
                estimated_success_rate: 0.0,
            });
        }

        let listing: String = matches
            .iter()
            .map(|m| {
                format!(
                    "- id: {} | {} | success {:.0}% | {}\n",
                    m.playbook.id,
                    m.playbook.name,
                    m.playbook.metrics.success_rate * 100.0,
                    m.playbook.description,
                )
            })
            .collect();
        let prompt = format!(
            "Target outcome: {target_outcome}\n\nCandidate playbooks:\n{listing}\n\
             Order them for execution. Reply with JSON:\n\
             {{\"sequence\": [\"id\", ...], \"rationale\": \"...\", \
             \"estimated_success_rate\": 0.0}}"
        );

        let known: HashSet<&str> = matches.iter().map(|m| m.playbook.id.as_str()).collect();
        match self
            .completion
            .complete(&[Message::user(prompt)])
            .await
            .ok()
            .and_then(|response| extract_json_block(&response))
            .and_then(|value| serde_json::from_value::<SequenceDraft>(value).ok())
        {
            Some(draft) => {
                let sequence: Vec<String> = draft
                    .sequence
                    .into_iter()
                    .filter(|id| known.contains(id.as_str()))
                    .collect();
                if sequence.is_empty() {
                    Ok(default_sequence(&matches))
                } else {
                    Ok(SequenceRecommendation {
                        sequence,
                        rationale: draft.rationale,
                        estimated_success_rate: draft.estimated_success_rate.clamp(0.0, 1.0),
                    })
                }
            }
            None => {
                warn!("sequence ranking response unusable; falling back to match order");
                Ok(default_sequence(&matches))
            }
        }
    }

    /// Run curation: merge near-duplicates, archive stale playbooks.
    pub async fn maintain_knowledge_base(&self) -> Result<MaintenanceReport> {
        self.curator.maintain().await
    }

    /// Mine new playbooks from historical traces and register each one.
    pub async fn batch_extract_playbooks(
        &self,
        traces: &[crate::playbook::types::Trajectory],
        options: Option<ExtractionOptions>,
    ) -> Result<Vec<Playbook>> {
        let options = options.unwrap_or_default();
        let playbooks = self.extractor.batch_extract(traces, &options).await?;
        for playbook in &playbooks {
            // The extractor persisted the record; finish indexing and
            // vocabulary bookkeeping here.
            if let Err(e) = self.index_and_bookkeep(playbook).await {
                warn!(playbook = %playbook.id, error = %e, "post-extraction indexing incomplete");
            }
        }
        info!(extracted = playbooks.len(), "batch extraction complete");
        Ok(playbooks)
    }

    /// Distill a single learning into a playbook and register it.
    pub async fn extract_from_learning(
        &self,
        learning_id: &str,
        content: &str,
    ) -> Result<Option<Playbook>> {
        let Some(playbook) = self.extractor.extract_from_learning(learning_id, content).await?
        else {
            return Ok(None);
        };
        if let Err(e) = self.index_and_bookkeep(&playbook).await {
            warn!(playbook = %playbook.id, error = %e, "post-extraction indexing incomplete");
        }
        Ok(Some(playbook))
    }

    /// Add an authored playbook to the corpus, both indexes, and the
    /// vocabulary.
    pub async fn register_playbook(&self, playbook: &Playbook) -> Result<()> {
        self.store.insert_playbook(playbook)?;
        self.index_and_bookkeep(playbook).await
    }

    async fn index_and_bookkeep(&self, playbook: &Playbook) -> Result<()> {
        if let Err(e) = self.searcher.index_playbook(playbook).await {
            if e.is_degradable() {
                warn!(playbook = %playbook.id, error = %e, "vector indexing failed; lexical only");
            } else {
                return Err(e);
            }
        }

        for tag in &playbook.type_tags {
            self.ensure_tag(&tag.name, tag.confidence)?;
            self.store.increment_tag_playbook_count(&tag.name)?;
        }
        for (i, a) in playbook.type_tags.iter().enumerate() {
            for b in &playbook.type_tags[i + 1..] {
                self.registry.record_co_occurrence(&a.name, &b.name)?;
            }
        }
        Ok(())
    }

    /// Auto-discover a vocabulary entry for a tag the corpus hasn't seen.
    fn ensure_tag(&self, name: &str, confidence: f64) -> Result<()> {
        if self.store.get_tag(name)?.is_some() {
            return Ok(());
        }
        let mut entry = TagVocabularyEntry::new(name, tokenize(&name.replace('_', " ")), confidence);
        entry.auto_discovered = true;
        self.store.upsert_tag(&entry)
    }

    /// Fold one observed execution into a playbook's metrics (EMA success
    /// rate) and persist both the observation and the new aggregate.
    pub fn record_execution(
        &self,
        id: &str,
        obs: &ExecutionObservation,
    ) -> Result<PlaybookMetrics> {
        let playbook = self
            .store
            .get_playbook(id)?
            .ok_or_else(|| EngineError::not_found("playbook", id))?;

        let now = Utc::now();
        let updated = metrics::record_execution(&playbook.metrics, obs, now);
        self.store.insert_execution(id, obs, now)?;
        self.store.update_metrics(id, &updated, now)?;
        Ok(updated)
    }
}

fn default_sequence(matches: &[PlaybookMatch]) -> SequenceRecommendation {
    let estimated = matches
        .iter()
        .map(|m| m.playbook.metrics.success_rate)
        .sum::<f64>()
        / matches.len() as f64;
    SequenceRecommendation {
        sequence: matches.iter().map(|m| m.playbook.id.clone()).collect(),
        rationale: "ordered by match score".to_string(),
        estimated_success_rate: estimated,
    }
}

#[derive(Debug, Deserialize)]
struct SequenceDraft {
    #[serde(default)]
    sequence: Vec<String>,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    estimated_success_rate: f64,
}
