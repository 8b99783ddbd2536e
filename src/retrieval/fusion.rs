// src/retrieval/fusion.rs — Weighted Reciprocal Rank Fusion
//
// Combines ranked lists from heterogeneous retrieval legs without score
// normalization: each item at 0-based rank r in a leg with weight w
// contributes w / (k + r + 1) to its fused score.

use std::collections::HashMap;

/// Smoothing constant; higher k flattens the influence of top ranks.
pub const RRF_K: f64 = 60.0;

/// One ranked list entering fusion: ids in rank order plus the leg's weight.
#[derive(Debug, Clone)]
pub struct RankedLeg {
    pub weight: f64,
    pub ids: Vec<String>,
}

impl RankedLeg {
    pub fn new(weight: f64, ids: Vec<String>) -> Self {
        Self { weight, ids }
    }
}

/// Fuse the legs into a single ranking, best first. An id missing from a leg
/// simply contributes nothing from it.
pub fn fuse(legs: &[RankedLeg], k: f64) -> Vec<(String, f64)> {
    let mut scores: HashMap<String, f64> = HashMap::new();

    for leg in legs {
        for (rank, id) in leg.ids.iter().enumerate() {
            *scores.entry(id.clone()).or_default() += leg.weight / (k + rank as f64 + 1.0);
        }
    }

    let mut fused: Vec<(String, f64)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_agreement_wins() {
        let fused = fuse(
            &[
                RankedLeg::new(0.5, ids(&["a", "b", "c"])),
                RankedLeg::new(0.5, ids(&["a", "c", "b"])),
            ],
            RRF_K,
        );
        assert_eq!(fused[0].0, "a");
    }

    #[test]
    fn test_monotonicity_both_legs() {
        // x outranks y on both legs -> fused(x) >= fused(y)
        let fused = fuse(
            &[
                RankedLeg::new(0.4, ids(&["x", "y"])),
                RankedLeg::new(0.6, ids(&["x", "y"])),
            ],
            RRF_K,
        );
        let score = |id: &str| fused.iter().find(|(i, _)| i == id).unwrap().1;
        assert!(score("x") >= score("y"));
    }

    #[test]
    fn test_single_leg_membership_still_scores() {
        let fused = fuse(
            &[
                RankedLeg::new(0.4, ids(&["only-lexical"])),
                RankedLeg::new(0.6, ids(&[])),
            ],
            RRF_K,
        );
        assert_eq!(fused.len(), 1);
        let expected = 0.4 / (RRF_K + 1.0);
        assert!((fused[0].1 - expected).abs() < 1e-12);
    }

    #[test]
    fn test_contributions_sum_across_legs() {
        let fused = fuse(
            &[
                RankedLeg::new(0.4, ids(&["a"])),
                RankedLeg::new(0.6, ids(&["a"])),
            ],
            RRF_K,
        );
        let expected = (0.4 + 0.6) / (RRF_K + 1.0);
        assert!((fused[0].1 - expected).abs() < 1e-12);
    }

    #[test]
    fn test_weight_breaks_ties() {
        // Same rank in opposite legs; the heavier leg's top item wins.
        let fused = fuse(
            &[
                RankedLeg::new(0.4, ids(&["lex", "vec"])),
                RankedLeg::new(0.6, ids(&["vec", "lex"])),
            ],
            RRF_K,
        );
        assert_eq!(fused[0].0, "vec");
    }

    #[test]
    fn test_empty_input() {
        assert!(fuse(&[], RRF_K).is_empty());
    }
}
