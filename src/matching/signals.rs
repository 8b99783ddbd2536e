// src/matching/signals.rs — Type-signal extraction

use std::collections::HashMap;

use crate::playbook::types::TagVocabularyEntry;
use crate::util::tokenize;

/// Signals above this strength qualify for candidate narrowing.
pub const STRONG_SIGNAL_THRESHOLD: f64 = 0.5;

/// Maximum number of strong signals used to narrow retrieval.
pub const MAX_STRONG_SIGNALS: usize = 5;

/// Derive a per-tag signal strength in [0, 1] from keyword overlap between
/// the query and each vocabulary tag.
///
/// An exact (substring) keyword hit counts 1, a fuzzy token overlap counts
/// 0.5; the sum is normalized by the tag's keyword count and boosted by tag
/// confidence and corpus adoption. A tag with no keyword hit contributes no
/// signal at all, so boosts alone can never manufacture one.
pub fn extract_type_signals(
    query: &str,
    vocabulary: &[TagVocabularyEntry],
) -> HashMap<String, f64> {
    let query_lower = query.to_lowercase();
    let tokens = tokenize(query);

    let mut signals = HashMap::new();
    for entry in vocabulary {
        if entry.keywords.is_empty() {
            continue;
        }

        let mut matched = 0.0;
        for keyword in &entry.keywords {
            let keyword = keyword.to_lowercase();
            if query_lower.contains(&keyword) {
                matched += 1.0;
            } else if fuzzy_match(&tokens, &keyword) {
                matched += 0.5;
            }
        }
        if matched == 0.0 {
            continue;
        }

        let base = matched / entry.keywords.len() as f64;
        let adoption = (entry.playbook_count as f64 / 100.0).min(0.3);
        let strength = (base + entry.confidence * 0.2 + adoption).clamp(0.0, 1.0);
        if strength > 0.0 {
            signals.insert(entry.name.clone(), strength);
        }
    }
    signals
}

/// Partial overlap between a query token and a keyword, both at least two
/// characters: either contains the other.
fn fuzzy_match(tokens: &[String], keyword: &str) -> bool {
    if keyword.chars().count() < 2 {
        return false;
    }
    tokens
        .iter()
        .any(|t| t.chars().count() >= 2 && (t.contains(keyword) || keyword.contains(t.as_str())))
}

/// The top strong signals, strongest first, capped at `MAX_STRONG_SIGNALS`.
/// Empty when nothing clears the threshold — callers fall back to the
/// standard hybrid path.
pub fn strong_signals(signals: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut strong: Vec<(String, f64)> = signals
        .iter()
        .filter(|(_, &s)| s > STRONG_SIGNAL_THRESHOLD)
        .map(|(name, &s)| (name.clone(), s))
        .collect();
    strong.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    strong.truncate(MAX_STRONG_SIGNALS);
    strong
}
