// src/matching/scorer.rs — Multi-dimensional match scoring

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::types::{MatchConfig, MatchContext, PlaybookMatch, TagMatchKind, TagScore};
use crate::infra::errors::EngineError;
use crate::playbook::types::Playbook;
use crate::similarity::SimilarityRegistry;
use crate::util::text_similarity;

// Standard-mode weights. They sum to 1.0 on both the normal and the
// risk-tagged path; the archive penalty applies after.
const W_TEXT: f64 = 0.30;
const W_SUCCESS: f64 = 0.25;
const W_USAGE: f64 = 0.15;
const W_RECENCY: f64 = 0.15;
const W_CONTEXT: f64 = 0.15;
const W_CONTEXT_RISK: f64 = 0.40;

// Dynamic-mode weights.
const W_SIMILAR_TAG: f64 = 0.8;
const W_COOCCURRENCE: f64 = 0.6;
const W_USAGE_DYNAMIC: f64 = 0.1;
const W_RECENCY_DYNAMIC: f64 = 0.1;

/// Signal strength a query tag needs before it can match exactly or expand
/// through the similarity registry.
const EXACT_SIGNAL_GATE: f64 = 0.7;

const ARCHIVE_PENALTY: f64 = 0.7;

/// Produces a normalized [0, 1] match score plus a human-readable
/// justification for one playbook against one query context.
pub struct MatchScorer {
    registry: Arc<SimilarityRegistry>,
}

impl MatchScorer {
    pub fn new(registry: Arc<SimilarityRegistry>) -> Self {
        Self { registry }
    }

    /// Standard-mode scoring.
    ///
    /// Risk-tagged playbooks (failure-derived / risk-avoidance) are not
    /// scored on success rate — they exist precisely because they record
    /// failures — and get the raised context weight instead.
    pub fn score(&self, playbook: &Playbook, ctx: &MatchContext, now: DateTime<Utc>) -> PlaybookMatch {
        let mut reasons = Vec::new();

        let text = text_similarity(&ctx.query, &playbook.match_text());
        let mut score = text * W_TEXT;
        if text >= 0.3 {
            reasons.push("strong textual overlap with the request".to_string());
        }

        let context = context_match(playbook, ctx);
        if playbook.is_risk_tagged() {
            score += context * W_CONTEXT_RISK;
            reasons.push(
                "risk regulation: scored on context fit; this playbook records failure experience"
                    .to_string(),
            );
        } else {
            score += playbook.metrics.success_rate * W_SUCCESS;
            score += context * W_CONTEXT;
            if playbook.metrics.success_rate >= 0.8 && playbook.metrics.usage_count > 0 {
                reasons.push(format!(
                    "proven track record ({:.0}% success over {} uses)",
                    playbook.metrics.success_rate * 100.0,
                    playbook.metrics.usage_count
                ));
            }
        }

        score += usage_factor(playbook) * W_USAGE;
        score += recency_factor(playbook, now) * W_RECENCY;

        let score = apply_archive_penalty(playbook, score, &mut reasons);

        PlaybookMatch {
            score: score.clamp(0.0, 1.0),
            reasons,
            applicable_steps: applicable_steps(playbook, ctx),
            tag_scores: Vec::new(),
            playbook: playbook.clone(),
        }
    }

    /// Dynamic-mode scoring against extracted type signals.
    ///
    /// Exact tag hits contribute `strength * confidence`; tags without a
    /// direct hit may still earn credit through the similarity registry; a
    /// single co-occurrence term aggregates pairwise similarity across the
    /// playbook's own tags.
    pub fn score_dynamic(
        &self,
        playbook: &Playbook,
        signals: &HashMap<String, f64>,
        ctx: &MatchContext,
        config: &MatchConfig,
        now: DateTime<Utc>,
    ) -> PlaybookMatch {
        let mut reasons = Vec::new();
        let mut tag_scores = Vec::new();
        let mut score = 0.0;

        for tag in &playbook.type_tags {
            let strength = signals.get(&tag.name).copied().unwrap_or(0.0);
            if strength > EXACT_SIGNAL_GATE {
                let contribution = strength * tag.confidence;
                score += contribution;
                reasons.push(format!("matches type signal '{}'", tag.name));
                tag_scores.push(TagScore {
                    tag: tag.name.clone(),
                    score: contribution,
                    kind: TagMatchKind::Exact,
                });
            } else if config.use_similarity_matching {
                if let Some((contribution, via)) =
                    self.best_similar_contribution(&tag.name, tag.confidence, signals, config)
                {
                    score += contribution;
                    reasons.push(format!("'{}' is similar to signal '{}'", tag.name, via));
                    tag_scores.push(TagScore {
                        tag: tag.name.clone(),
                        score: contribution,
                        kind: TagMatchKind::Similar,
                    });
                }
            }
        }

        if playbook.type_tags.len() >= 2 && !signals.is_empty() {
            if let Some(contribution) =
                self.cooccurrence_contribution(playbook, signals, &mut tag_scores)
            {
                score += contribution;
            }
        }

        score += usage_factor(playbook) * W_USAGE_DYNAMIC;
        score += recency_factor(playbook, now) * W_RECENCY_DYNAMIC;

        let score = apply_archive_penalty(playbook, score, &mut reasons);

        PlaybookMatch {
            score: score.clamp(0.0, 1.0),
            reasons,
            applicable_steps: applicable_steps(playbook, ctx),
            tag_scores,
            playbook: playbook.clone(),
        }
    }

    /// Best credit a playbook tag can earn from a strong query signal
    /// through pair similarity. Unknown tags are skipped quietly; real
    /// registry failures are logged and skipped (partial result over a
    /// fabricated score).
    fn best_similar_contribution(
        &self,
        tag_name: &str,
        confidence: f64,
        signals: &HashMap<String, f64>,
        config: &MatchConfig,
    ) -> Option<(f64, String)> {
        let mut best: Option<(f64, String)> = None;
        for (query_tag, &strength) in signals {
            if strength <= EXACT_SIGNAL_GATE || query_tag == tag_name {
                continue;
            }
            let similarity = match self.registry.similarity(query_tag, tag_name) {
                Ok(s) => s,
                Err(EngineError::NotFound { .. }) => continue,
                Err(e) => {
                    warn!(error = %e, tag = tag_name, "similarity lookup failed; skipping tag");
                    continue;
                }
            };
            if similarity < config.similarity_threshold {
                continue;
            }
            let contribution = strength * confidence * similarity * W_SIMILAR_TAG;
            if best.as_ref().map_or(true, |(b, _)| contribution > *b) {
                best = Some((contribution, query_tag.clone()));
            }
        }
        best
    }

    /// Aggregate co-occurrence term over all tag pairs on the playbook:
    /// average pair similarity times average signal strength, weighted.
    fn cooccurrence_contribution(
        &self,
        playbook: &Playbook,
        signals: &HashMap<String, f64>,
        tag_scores: &mut Vec<TagScore>,
    ) -> Option<f64> {
        let mut similarities = Vec::new();
        for (i, a) in playbook.type_tags.iter().enumerate() {
            for b in &playbook.type_tags[i + 1..] {
                let similarity = match self.registry.similarity(&a.name, &b.name) {
                    Ok(s) => s,
                    Err(EngineError::NotFound { .. }) => continue,
                    Err(e) => {
                        warn!(error = %e, "pair similarity lookup failed; skipping pair");
                        continue;
                    }
                };
                tag_scores.push(TagScore {
                    tag: format!("{}+{}", a.name, b.name),
                    score: similarity,
                    kind: TagMatchKind::CoOccurrence,
                });
                similarities.push(similarity);
            }
        }
        if similarities.is_empty() {
            return None;
        }

        let avg_similarity = similarities.iter().sum::<f64>() / similarities.len() as f64;
        let avg_signal = signals.values().sum::<f64>() / signals.len() as f64;
        Some(avg_similarity * avg_signal * W_COOCCURRENCE)
    }
}

fn usage_factor(playbook: &Playbook) -> f64 {
    (playbook.metrics.usage_count as f64 / 100.0).min(1.0)
}

fn recency_factor(playbook: &Playbook, now: DateTime<Utc>) -> f64 {
    match playbook.metrics.last_used {
        Some(last_used) => {
            let days = (now - last_used).num_days().max(0) as f64;
            (1.0 - days / 365.0).max(0.0)
        }
        None => 0.0,
    }
}

/// Weighted presence checks, capped at 1: step-count constraint satisfied
/// (+0.3), every required resource available (+0.4), a past-success tag
/// pattern present (+0.3).
fn context_match(playbook: &Playbook, ctx: &MatchContext) -> f64 {
    let mut score: f64 = 0.0;

    let steps_ok = ctx
        .max_steps
        .map_or(true, |max| playbook.actions.len() <= max);
    if steps_ok {
        score += 0.3;
    }

    let available: HashSet<&str> = ctx.available_resources.iter().map(String::as_str).collect();
    if playbook
        .required_resources()
        .iter()
        .all(|r| available.contains(r))
    {
        score += 0.4;
    }

    if ctx
        .successful_tags
        .iter()
        .any(|t| playbook.tags.contains(t))
    {
        score += 0.3;
    }

    score.min(1.0)
}

/// 0-based indices of actions whose resource lists the caller can satisfy.
/// Actions without resource requirements are always applicable.
fn applicable_steps(playbook: &Playbook, ctx: &MatchContext) -> Vec<usize> {
    let available: HashSet<&str> = ctx.available_resources.iter().map(String::as_str).collect();
    playbook
        .actions
        .iter()
        .enumerate()
        .filter(|(_, action)| {
            action.resources.is_empty()
                || action.resources.iter().all(|r| available.contains(r.as_str()))
        })
        .map(|(i, _)| i)
        .collect()
}

/// Archived playbooks stay retrievable as a permanent knowledge asset but
/// are deprioritized. Pure function of the inputs, so re-scoring the same
/// playbook never compounds the penalty.
fn apply_archive_penalty(playbook: &Playbook, score: f64, reasons: &mut Vec<String>) -> f64 {
    if playbook.status == crate::playbook::types::PlaybookStatus::Archived {
        reasons.push("archived playbook: deprioritized but retained as a knowledge asset".into());
        score * ARCHIVE_PENALTY
    } else {
        score
    }
}
