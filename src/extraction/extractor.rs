// src/extraction/extractor.rs — Playbook extraction from trajectory clusters

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use super::clusterer::{cluster_trajectories, TrajectoryCluster};
use crate::corpus::Store;
use crate::infra::errors::{EngineError, Result};
use crate::playbook::types::{Playbook, PlaybookAction, Trajectory};
use crate::provider::{CompletionProvider, Message};
use crate::util::{extract_json_block, truncate_str};

/// Tag stamped on every playbook produced by a batch run.
pub const BATCH_EXTRACTED_TAG: &str = "batch-extracted";

/// Seed success rate for a playbook mined from successful traces.
const SEED_SUCCESS_RATE: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    /// Keyword-Jaccard threshold for joining a cluster.
    pub min_similarity: f64,
    /// Minimum members for a cluster to be mined.
    pub min_cluster_size: usize,
    /// Example traces included in the extraction prompt.
    pub max_examples: usize,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            min_similarity: 0.7,
            min_cluster_size: 3,
            max_examples: 5,
        }
    }
}

/// Mines repeated successful execution traces into new draft playbooks.
pub struct BatchExtractor {
    completion: Arc<dyn CompletionProvider>,
    store: Arc<Store>,
    /// Learning ids currently being extracted; prevents two concurrent
    /// extractions of the same source.
    in_flight: Mutex<HashSet<String>>,
}

impl BatchExtractor {
    pub fn new(completion: Arc<dyn CompletionProvider>, store: Arc<Store>) -> Self {
        Self {
            completion,
            store,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Cluster the traces and extract one playbook draft per cluster.
    ///
    /// A cluster whose draft fails to parse is skipped with a warning; it
    /// never fails the batch.
    pub async fn batch_extract(
        &self,
        traces: &[Trajectory],
        options: &ExtractionOptions,
    ) -> Result<Vec<Playbook>> {
        let clusters =
            cluster_trajectories(traces, options.min_similarity, options.min_cluster_size);
        info!(
            traces = traces.len(),
            clusters = clusters.len(),
            "clustered trajectories for extraction"
        );

        let mut playbooks = Vec::new();
        for cluster in &clusters {
            match self.extract_cluster(cluster, options).await {
                Ok(playbook) => playbooks.push(playbook),
                Err(e) if e.is_degradable() => {
                    warn!(cluster = %cluster.id, error = %e, "skipping cluster");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(playbooks)
    }

    async fn extract_cluster(
        &self,
        cluster: &TrajectoryCluster,
        options: &ExtractionOptions,
    ) -> Result<Playbook> {
        let prompt = build_cluster_prompt(cluster, options.max_examples);
        let response = self
            .completion
            .complete(&[
                Message::system(
                    "You distill repeated task executions into reusable playbooks. \
                     Reply with a single JSON object.",
                ),
                Message::user(prompt),
            ])
            .await?;

        let draft = parse_draft(&response)?;
        let playbook = draft.into_playbook(cluster);
        self.store.insert_playbook(&playbook)?;
        info!(playbook = %playbook.id, name = %playbook.name, "extracted playbook from cluster");
        Ok(playbook)
    }

    /// Distill a single free-text learning into a playbook. Returns `None`
    /// when the same learning is already being extracted or the draft is
    /// unusable.
    pub async fn extract_from_learning(
        &self,
        learning_id: &str,
        content: &str,
    ) -> Result<Option<Playbook>> {
        if !self.try_begin(learning_id) {
            info!(learning = learning_id, "extraction already in flight; skipping");
            return Ok(None);
        }
        let result = self.extract_learning_inner(learning_id, content).await;
        self.finish(learning_id);

        match result {
            Ok(playbook) => Ok(Some(playbook)),
            Err(e) if e.is_degradable() => {
                warn!(learning = learning_id, error = %e, "learning extraction skipped");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn extract_learning_inner(&self, learning_id: &str, content: &str) -> Result<Playbook> {
        let response = self
            .completion
            .complete(&[
                Message::system(
                    "You distill a learning into a reusable playbook. \
                     Reply with a single JSON object.",
                ),
                Message::user(format!(
                    "Learning:\n{content}\n\n{}",
                    draft_format_instructions()
                )),
            ])
            .await?;

        let draft = parse_draft(&response)?;
        let mut playbook = draft.into_standalone_playbook();
        playbook.source_learning_ids = vec![learning_id.to_string()];
        self.store.insert_playbook(&playbook)?;
        Ok(playbook)
    }

    fn try_begin(&self, learning_id: &str) -> bool {
        self.in_flight
            .lock()
            .expect("extraction guard poisoned")
            .insert(learning_id.to_string())
    }

    fn finish(&self, learning_id: &str) {
        self.in_flight
            .lock()
            .expect("extraction guard poisoned")
            .remove(learning_id);
    }
}

fn build_cluster_prompt(cluster: &TrajectoryCluster, max_examples: usize) -> String {
    let mut prompt = String::from("These task executions succeeded with the same approach:\n\n");
    for (i, member) in cluster.members.iter().take(max_examples).enumerate() {
        prompt.push_str(&format!(
            "Example {}: {}\n  tools: [{}]\n  steps: {}\n",
            i + 1,
            truncate_str(&member.input, 200),
            member.tools.join(", "),
            member.steps.len(),
        ));
    }
    prompt.push_str(&format!(
        "\nShared tools: [{}]\nShared keywords: [{}]\n\n{}",
        cluster.common_tools.join(", "),
        cluster.keywords.join(", "),
        draft_format_instructions(),
    ));
    prompt
}

fn draft_format_instructions() -> &'static str {
    "Produce a reusable playbook as JSON:\n\
     {\"name\": \"...\", \"description\": \"...\", \"type\": \"problem-solving\", \
     \"domain\": \"...\", \"scenario\": \"...\", \
     \"actions\": [{\"step\": 1, \"description\": \"...\", \
     \"expected_outcome\": \"...\", \"resources\": []}]}"
}

fn parse_draft(response: &str) -> Result<PlaybookDraft> {
    let value = extract_json_block(response).ok_or_else(|| {
        EngineError::Parse("no JSON object in extraction response".to_string())
    })?;
    serde_json::from_value(value)
        .map_err(|e| EngineError::Parse(format!("draft does not match playbook shape: {e}")))
}

/// Lenient shape for LLM-produced drafts; everything but the name may be
/// missing.
#[derive(Debug, Deserialize)]
struct PlaybookDraft {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "type")]
    playbook_type: String,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    scenario: String,
    #[serde(default)]
    actions: Vec<DraftAction>,
}

#[derive(Debug, Deserialize)]
struct DraftAction {
    #[serde(default)]
    step: u32,
    description: String,
    #[serde(default)]
    expected_outcome: String,
    #[serde(default)]
    resources: Vec<String>,
}

impl PlaybookDraft {
    /// Enrich the draft with cluster-derived provenance and seed metrics.
    fn into_playbook(self, cluster: &TrajectoryCluster) -> Playbook {
        let mut playbook = self.into_standalone_playbook();

        playbook.tags = std::iter::once(BATCH_EXTRACTED_TAG.to_string())
            .chain(cluster.keywords.iter().cloned())
            .collect();
        playbook.source_learning_ids = cluster.members.iter().map(|m| m.id.clone()).collect();

        let total_ms: u64 = cluster.members.iter().map(|m| m.duration_ms).sum();
        playbook.metrics.avg_execution_time_ms = total_ms as f64 / cluster.members.len() as f64;

        playbook
    }

    fn into_standalone_playbook(self) -> Playbook {
        let now = Utc::now();
        let mut playbook = Playbook::new(self.name, self.description);
        if !self.playbook_type.is_empty() {
            playbook.playbook_type = self.playbook_type;
        }
        playbook.domain = self.domain;
        playbook.scenario = self.scenario;
        playbook.actions = self
            .actions
            .into_iter()
            .enumerate()
            .map(|(i, a)| PlaybookAction {
                step: if a.step > 0 { a.step } else { i as u32 + 1 },
                description: a.description,
                expected_outcome: a.expected_outcome,
                resources: a.resources,
            })
            .collect();
        playbook.metrics.success_rate = SEED_SUCCESS_RATE;
        playbook.created_at = now;
        playbook.updated_at = now;
        playbook
    }
}
