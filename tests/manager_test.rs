// tests/manager_test.rs — Integration test: manager surface

mod common;

use std::sync::Arc;

use common::{playbook, setup, vocab_entry, CannedCompletion, DownCompletion, EchoVector};
use pretty_assertions::assert_eq;
use stratagem::corpus;
use stratagem::infra::errors::EngineError;
use stratagem::manager::PlaybookManager;
use stratagem::matching::MatchContext;
use stratagem::playbook::metrics::ExecutionObservation;
use stratagem::playbook::types::TypeTag;

fn manager_with(store: Arc<corpus::Store>, response: &str) -> PlaybookManager {
    PlaybookManager::new(
        store,
        Arc::new(EchoVector::default()),
        CannedCompletion::new(response),
    )
}

#[tokio::test]
async fn record_execution_applies_ema() {
    let store = setup();
    let manager = manager_with(store.clone(), "{}");

    let mut p = playbook("pb-1", "Canary deployment", "Gradual rollout");
    p.metrics.success_rate = 0.5;
    manager.register_playbook(&p).await.unwrap();

    let updated = manager
        .record_execution("pb-1", &ExecutionObservation::success())
        .unwrap();
    // 0.2 * 1 + 0.8 * 0.5
    assert!((updated.success_rate - 0.6).abs() < 1e-9);
    assert_eq!(updated.usage_count, 1);
    assert!(updated.last_used.is_some());

    // Persisted, and the execution row recorded.
    let reloaded = store.get_playbook("pb-1").unwrap().unwrap();
    assert!((reloaded.metrics.success_rate - 0.6).abs() < 1e-9);
    assert_eq!(store.count_executions("pb-1").unwrap(), 1);
}

#[tokio::test]
async fn record_execution_unknown_playbook() {
    let store = setup();
    let manager = manager_with(store, "{}");
    assert!(matches!(
        manager.record_execution("missing", &ExecutionObservation::failure()),
        Err(EngineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn find_similar_excludes_the_source() {
    let store = setup();
    let manager = manager_with(store, "{}");

    for (id, name, desc) in [
        ("pb-1", "Canary deployment", "Gradual rollout behind a canary"),
        ("pb-2", "Blue-green deployment", "Parallel environment rollout"),
        ("pb-3", "Incident response", "Triage production incidents"),
    ] {
        manager
            .register_playbook(&playbook(id, name, desc))
            .await
            .unwrap();
    }

    let similar = manager.find_similar_playbooks("pb-1", 5).await.unwrap();
    assert!(!similar.is_empty());
    assert!(similar.iter().all(|m| m.playbook.id != "pb-1"));
    // The other deployment playbook ranks first.
    assert_eq!(similar[0].playbook.id, "pb-2");
}

#[tokio::test]
async fn find_similar_unknown_id_is_not_found() {
    let store = setup();
    let manager = manager_with(store, "{}");
    assert!(matches!(
        manager.find_similar_playbooks("nope", 5).await,
        Err(EngineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn recommend_sequence_uses_llm_ordering() {
    let store = setup();

    // The LLM reverses the natural score order.
    let response = r#"{"sequence": ["pb-2", "pb-1"],
        "rationale": "prepare the environment before shifting traffic",
        "estimated_success_rate": 0.75}"#;
    let manager = manager_with(store, response);

    for (id, name, desc) in [
        ("pb-1", "Traffic shifting", "Shift production traffic gradually"),
        ("pb-2", "Environment preparation", "Prepare the production environment"),
    ] {
        let mut p = playbook(id, name, desc);
        p.metrics.success_rate = 0.8;
        manager.register_playbook(&p).await.unwrap();
    }

    let ctx = MatchContext::new("shift production traffic to the prepared environment");
    let rec = manager
        .recommend_sequence(&ctx, "zero-downtime rollout")
        .await
        .unwrap();

    assert_eq!(rec.sequence, vec!["pb-2".to_string(), "pb-1".to_string()]);
    assert!(rec.rationale.contains("prepare"));
    assert!((rec.estimated_success_rate - 0.75).abs() < 1e-9);
}

#[tokio::test]
async fn recommend_sequence_falls_back_on_garbage() {
    let store = setup();
    let manager = manager_with(store, "I have no idea, sorry — no JSON here.");

    let mut p = playbook("pb-1", "Traffic shifting", "Shift production traffic gradually");
    p.metrics.success_rate = 0.6;
    manager.register_playbook(&p).await.unwrap();

    let ctx = MatchContext::new("shift production traffic gradually");
    let rec = manager
        .recommend_sequence(&ctx, "zero-downtime rollout")
        .await
        .unwrap();

    assert_eq!(rec.sequence, vec!["pb-1".to_string()]);
    assert!((rec.estimated_success_rate - 0.6).abs() < 1e-9);
}

#[tokio::test]
async fn recommend_sequence_survives_completion_outage() {
    let store = setup();
    let manager = PlaybookManager::new(
        store,
        Arc::new(EchoVector::default()),
        Arc::new(DownCompletion),
    );

    let mut p = playbook("pb-1", "Traffic shifting", "Shift production traffic gradually");
    p.metrics.success_rate = 0.6;
    manager.register_playbook(&p).await.unwrap();

    let ctx = MatchContext::new("shift production traffic gradually");
    let rec = manager
        .recommend_sequence(&ctx, "rollout")
        .await
        .unwrap();
    assert_eq!(rec.sequence.len(), 1);
}

#[tokio::test]
async fn recommend_sequence_empty_corpus() {
    let store = setup();
    let manager = manager_with(store, "{}");
    let ctx = MatchContext::new("anything at all");
    let rec = manager.recommend_sequence(&ctx, "outcome").await.unwrap();
    assert!(rec.sequence.is_empty());
    assert_eq!(rec.estimated_success_rate, 0.0);
}

#[tokio::test]
async fn registering_tagged_playbooks_records_co_occurrence() {
    let store = setup();
    let manager = manager_with(store.clone(), "{}");
    manager
        .seed_vocabulary(&[
            vocab_entry("rapid_iteration", &["fast", "iterate"], 0.9, 0),
            vocab_entry("data_driven", &["metrics", "analysis"], 0.9, 0),
        ])
        .unwrap();

    let mut p = playbook("pb-1", "Metric-led iteration", "Iterate on metrics weekly");
    p.type_tags = vec![
        TypeTag {
            name: "rapid_iteration".into(),
            confidence: 0.9,
        },
        TypeTag {
            name: "data_driven".into(),
            confidence: 0.8,
        },
    ];
    manager.register_playbook(&p).await.unwrap();

    // Tag pair co-occurrence landed in the similarity matrix.
    let record = store
        .get_similarity("data_driven", "rapid_iteration")
        .unwrap()
        .expect("co-occurrence row created");
    assert_eq!(record.co_occurrence, 1);

    // Adoption counters moved.
    assert_eq!(store.get_tag("rapid_iteration").unwrap().unwrap().playbook_count, 1);
    assert_eq!(store.get_tag("data_driven").unwrap().unwrap().playbook_count, 1);
}

#[tokio::test]
async fn unknown_type_tags_are_auto_discovered() {
    let store = setup();
    let manager = manager_with(store.clone(), "{}");

    let mut p = playbook("pb-1", "Growth loops", "Compound growth experiments");
    p.type_tags = vec![TypeTag {
        name: "growth_loops".into(),
        confidence: 0.7,
    }];
    manager.register_playbook(&p).await.unwrap();

    let entry = store.get_tag("growth_loops").unwrap().unwrap();
    assert!(entry.auto_discovered);
    assert_eq!(entry.keywords, vec!["growth".to_string(), "loops".to_string()]);
}

#[test]
fn corpus_opens_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("playbooks.db");

    let store = corpus::open(&path).unwrap();
    store
        .insert_playbook(&playbook("pb-1", "Persisted", "Survives reopen"))
        .unwrap();
    drop(store);

    let reopened = corpus::open(&path).unwrap();
    let p = reopened.get_playbook("pb-1").unwrap().unwrap();
    assert_eq!(p.name, "Persisted");
}
