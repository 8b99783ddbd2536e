// tests/retrieval_test.rs — Integration test: hybrid search

mod common;

use std::sync::Arc;

use common::{playbook, setup, DownVector, EchoVector};
use stratagem::playbook::types::PlaybookStatus;
use stratagem::retrieval::{HybridSearcher, SearchWeights};

async fn seeded_searcher(vector: Arc<EchoVector>) -> HybridSearcher {
    let store = setup();
    let searcher = HybridSearcher::new(store.clone(), vector);
    for (id, name, desc) in [
        (
            "pb-migrate",
            "Database migration",
            "Migrate database schemas safely with rollback",
        ),
        (
            "pb-canary",
            "Canary deployment",
            "Deploy services gradually behind a canary release",
        ),
        (
            "pb-incident",
            "Incident response",
            "Triage and resolve production incidents quickly",
        ),
    ] {
        let p = playbook(id, name, desc);
        store.insert_playbook(&p).unwrap();
        searcher.index_playbook(&p).await.unwrap();
    }
    searcher
}

#[tokio::test]
async fn hybrid_search_ranks_both_legs() {
    let searcher = seeded_searcher(Arc::new(EchoVector::default())).await;
    let results = searcher
        .search("canary deployment rollout", 5, None)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].playbook.id, "pb-canary");
}

#[tokio::test]
async fn vector_outage_degrades_to_lexical() {
    let store = setup();
    let searcher = HybridSearcher::new(store.clone(), Arc::new(DownVector));
    for (id, name, desc) in [
        ("pb-1", "Database migration", "Migrate schemas with rollback"),
        ("pb-2", "Canary deployment", "Gradual rollout"),
        ("pb-3", "Incident response", "Triage incidents"),
        ("pb-4", "Cache warmup", "Pre-warm caches"),
        ("pb-5", "Load shedding", "Shed load under pressure"),
    ] {
        store.insert_playbook(&playbook(id, name, desc)).unwrap();
    }
    searcher.rebuild_from_corpus().unwrap();

    // Five lexical-only results, no error.
    let results = searcher
        .search(
            "migration rollout incidents caches load",
            5,
            None,
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 5);
}

#[tokio::test]
async fn custom_weights_shift_the_ranking() {
    let searcher = seeded_searcher(Arc::new(EchoVector::default())).await;
    let lexical_heavy = SearchWeights {
        lexical: 1.0,
        vector: 0.0,
    };
    let results = searcher
        .search("incident triage", 5, Some(lexical_heavy))
        .await
        .unwrap();
    assert_eq!(results[0].playbook.id, "pb-incident");
}

#[tokio::test]
async fn removed_playbooks_stop_matching() {
    let searcher = seeded_searcher(Arc::new(EchoVector::default())).await;
    searcher.remove("pb-canary").await.unwrap();
    let results = searcher.search("canary", 5, None).await.unwrap();
    assert!(results.iter().all(|r| r.playbook.id != "pb-canary"));
}

#[tokio::test]
async fn rebuild_skips_deprecated() {
    let store = setup();
    let mut active = playbook("pb-a", "Canary deployment", "Gradual rollout");
    let mut deprecated = playbook("pb-b", "Canary rollout", "Old variant");
    deprecated.status = PlaybookStatus::Deprecated;
    active.status = PlaybookStatus::Active;
    store.insert_playbook(&active).unwrap();
    store.insert_playbook(&deprecated).unwrap();

    let searcher = HybridSearcher::new(store, Arc::new(DownVector));
    let indexed = searcher.rebuild_from_corpus().unwrap();
    assert_eq!(indexed, 1);

    let results = searcher.search("canary", 5, None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].playbook.id, "pb-a");
}

#[tokio::test]
async fn archived_playbooks_remain_retrievable() {
    let store = setup();
    let mut archived = playbook("pb-old", "Canary deployment", "Gradual rollout");
    archived.status = PlaybookStatus::Archived;
    store.insert_playbook(&archived).unwrap();

    let searcher = HybridSearcher::new(store, Arc::new(DownVector));
    searcher.rebuild_from_corpus().unwrap();

    let results = searcher.search("canary", 5, None).await.unwrap();
    assert_eq!(results.len(), 1, "archived playbooks stay searchable");
}
