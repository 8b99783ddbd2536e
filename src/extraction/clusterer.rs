// src/extraction/clusterer.rs — Greedy trajectory clustering

use std::collections::HashMap;

use crate::playbook::types::Trajectory;
use crate::util::jaccard;

/// Base confidence at the minimum cluster size.
const BASE_CONFIDENCE: f64 = 0.6;

/// Confidence gained per member beyond the minimum (10+ members ≈ 1.0).
const CONFIDENCE_STEP: f64 = 0.057;

/// An ephemeral grouping of execution traces that share a keyword profile.
/// Created and discarded within a single batch-extraction run.
#[derive(Debug, Clone)]
pub struct TrajectoryCluster {
    pub id: String,
    pub members: Vec<Trajectory>,
    /// The 5 most frequent keywords across members.
    pub keywords: Vec<String>,
    /// Tools used by at least half the members.
    pub common_tools: Vec<String>,
    pub representative_input: String,
    pub confidence: f64,
}

/// Single-pass greedy clustering over successful traces.
///
/// Each unprocessed trace seeds a cluster; every other unprocessed trace
/// whose keyword-Jaccard similarity with the seed reaches `min_similarity`
/// joins it. Joined traces are consumed either way; only clusters with at
/// least `min_cluster_size` members are kept.
pub fn cluster_trajectories(
    traces: &[Trajectory],
    min_similarity: f64,
    min_cluster_size: usize,
) -> Vec<TrajectoryCluster> {
    let successful: Vec<&Trajectory> = traces.iter().filter(|t| t.success).collect();
    let keywords: Vec<Vec<String>> = successful.iter().map(|t| t.keywords()).collect();

    let mut processed = vec![false; successful.len()];
    let mut clusters = Vec::new();

    for i in 0..successful.len() {
        if processed[i] {
            continue;
        }
        processed[i] = true;
        let mut members = vec![successful[i].clone()];

        for j in (i + 1)..successful.len() {
            if processed[j] {
                continue;
            }
            if jaccard(&keywords[i], &keywords[j]) >= min_similarity {
                members.push(successful[j].clone());
                processed[j] = true;
            }
        }

        if members.len() >= min_cluster_size {
            clusters.push(build_cluster(members));
        }
    }

    clusters
}

fn build_cluster(members: Vec<Trajectory>) -> TrajectoryCluster {
    let size = members.len();
    let confidence =
        (BASE_CONFIDENCE + (size as f64 - 3.0).max(0.0) * CONFIDENCE_STEP).min(1.0);

    // Tools used by >= 50% of members.
    let mut tool_counts: HashMap<&str, usize> = HashMap::new();
    for member in &members {
        for tool in &member.tools {
            *tool_counts.entry(tool.as_str()).or_default() += 1;
        }
    }
    let mut common_tools: Vec<String> = tool_counts
        .iter()
        .filter(|(_, &count)| count * 2 >= size)
        .map(|(tool, _)| tool.to_string())
        .collect();
    common_tools.sort();

    // Top-5 keywords by frequency, ties broken alphabetically for
    // deterministic output.
    let mut keyword_counts: HashMap<String, usize> = HashMap::new();
    for member in &members {
        for keyword in member.keywords() {
            *keyword_counts.entry(keyword).or_default() += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = keyword_counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let keywords: Vec<String> = ranked.into_iter().take(5).map(|(k, _)| k).collect();

    TrajectoryCluster {
        id: uuid::Uuid::new_v4().to_string(),
        representative_input: members[0].input.clone(),
        confidence,
        keywords,
        common_tools,
        members,
    }
}
