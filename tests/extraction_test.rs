// tests/extraction_test.rs — Integration test: batch playbook extraction

mod common;

use std::sync::Arc;

use common::{setup, trajectory, CannedCompletion, DownCompletion, EchoVector};
use stratagem::extraction::{ExtractionOptions, BATCH_EXTRACTED_TAG};
use stratagem::manager::PlaybookManager;
use stratagem::matching::{MatchConfig, MatchContext};

const DRAFT: &str = r#"Distilled playbook:
{"name": "Slow query triage",
 "description": "Find and fix slow queries behind checkout latency",
 "type": "problem-solving",
 "domain": "database",
 "scenario": "latency spike",
 "actions": [
   {"step": 1, "description": "Pull the slow query log", "expected_outcome": "offending queries identified"},
   {"step": 2, "description": "Add the missing index", "expected_outcome": "p95 recovers", "resources": ["database"]}
 ]}"#;

fn repeated_traces(n: usize) -> Vec<stratagem::playbook::types::Trajectory> {
    (0..n)
        .map(|_| {
            trajectory(
                "investigate slow database queries in checkout",
                &["sql", "profiler"],
                90_000,
            )
        })
        .collect()
}

#[tokio::test]
async fn batch_extraction_registers_searchable_playbooks() {
    let store = setup();
    let manager = PlaybookManager::new(
        store.clone(),
        Arc::new(EchoVector::default()),
        CannedCompletion::new(DRAFT),
    );

    let extracted = manager
        .batch_extract_playbooks(&repeated_traces(4), None)
        .await
        .unwrap();
    assert_eq!(extracted.len(), 1);

    let p = &extracted[0];
    assert_eq!(p.name, "Slow query triage");
    assert!(p.tags.contains(&BATCH_EXTRACTED_TAG.to_string()));
    assert_eq!(p.metrics.success_rate, 0.8);
    assert_eq!(p.metrics.avg_execution_time_ms, 90_000.0);
    assert_eq!(p.source_learning_ids.len(), 4);
    assert_eq!(p.actions.len(), 2);

    // Extracted playbooks are immediately retrievable.
    let ctx = MatchContext::new("slow database queries in checkout");
    let matches = manager
        .match_playbooks(
            &ctx,
            Some(MatchConfig {
                min_match_score: 0.0,
                ..MatchConfig::default()
            }),
        )
        .await
        .unwrap();
    assert!(matches.iter().any(|m| m.playbook.id == p.id));
}

#[tokio::test]
async fn too_few_repeats_extract_nothing() {
    let store = setup();
    let manager = PlaybookManager::new(
        store.clone(),
        Arc::new(EchoVector::default()),
        CannedCompletion::new(DRAFT),
    );

    let extracted = manager
        .batch_extract_playbooks(&repeated_traces(2), None)
        .await
        .unwrap();
    assert!(extracted.is_empty());
    assert_eq!(store.count_playbooks().unwrap(), 0);
}

#[tokio::test]
async fn dissimilar_traces_stay_unclustered() {
    let store = setup();
    let manager = PlaybookManager::new(
        store,
        Arc::new(EchoVector::default()),
        CannedCompletion::new(DRAFT),
    );

    let traces = vec![
        trajectory("investigate slow database queries", &["sql"], 1_000),
        trajectory("rotate expiring tls certificates", &["openssl"], 1_000),
        trajectory("summarize weekly customer feedback", &["sheets"], 1_000),
    ];
    let extracted = manager.batch_extract_playbooks(&traces, None).await.unwrap();
    assert!(extracted.is_empty());
}

#[tokio::test]
async fn malformed_draft_skips_cluster_without_failing() {
    let store = setup();
    let manager = PlaybookManager::new(
        store.clone(),
        Arc::new(EchoVector::default()),
        CannedCompletion::new("The model rambled and produced no JSON at all."),
    );

    let extracted = manager
        .batch_extract_playbooks(&repeated_traces(3), None)
        .await
        .unwrap();
    assert!(extracted.is_empty());
    assert_eq!(store.count_playbooks().unwrap(), 0);
}

#[tokio::test]
async fn completion_outage_yields_empty_batch() {
    let store = setup();
    let manager = PlaybookManager::new(
        store.clone(),
        Arc::new(EchoVector::default()),
        Arc::new(DownCompletion),
    );

    // Provider errors are degradable per cluster: batch returns empty.
    let extracted = manager
        .batch_extract_playbooks(&repeated_traces(3), None)
        .await
        .unwrap();
    assert!(extracted.is_empty());
}

#[tokio::test]
async fn custom_cluster_options_apply() {
    let store = setup();
    let manager = PlaybookManager::new(
        store,
        Arc::new(EchoVector::default()),
        CannedCompletion::new(DRAFT),
    );

    // With a minimum size of 2, two repeats are enough.
    let options = ExtractionOptions {
        min_cluster_size: 2,
        ..ExtractionOptions::default()
    };
    let extracted = manager
        .batch_extract_playbooks(&repeated_traces(2), Some(options))
        .await
        .unwrap();
    assert_eq!(extracted.len(), 1);
}

#[tokio::test]
async fn single_learning_extraction_registers_provenance() {
    let store = setup();
    let manager = PlaybookManager::new(
        store,
        Arc::new(EchoVector::default()),
        CannedCompletion::new(DRAFT),
    );

    let playbook = manager
        .extract_from_learning("learn-7", "Adding the missing index fixed checkout latency")
        .await
        .unwrap()
        .expect("draft parses");
    assert_eq!(playbook.source_learning_ids, vec!["learn-7".to_string()]);
}
