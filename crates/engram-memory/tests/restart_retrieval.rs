//! Restart-safety integration tests
//!
//! A new manager pointed at the same vector collection must rebuild items
//! from payloads on read: the in-process maps are caches, the payload is
//! the durable truth.

use engram_memory::{
    HashEmbedder, MemoryConfig, MemoryManager, MemoryType, MemoryVectorStore, RetrievalSource,
    RetrieveOptions, StoreOptions, VectorStore,
};
use std::sync::Arc;

async fn manager_over(store: Arc<dyn VectorStore>) -> MemoryManager {
    MemoryManager::builder(MemoryConfig::default())
        .vector_store(store)
        .embedder(Arc::new(HashEmbedder::new(256)))
        .build()
        .await
        .expect("manager builds")
}

#[tokio::test]
async fn semantic_memory_survives_process_restart() {
    let store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());

    // First process: write a fact
    let mut first = manager_over(Arc::clone(&store)).await;
    let id = first
        .store(
            "Paris is the capital of France",
            "u1",
            StoreOptions {
                memory_type: Some(MemoryType::Semantic),
                importance: Some(0.8),
                ..Default::default()
            },
        )
        .await
        .expect("store succeeds");
    drop(first);

    // Second process: same collection, empty in-process maps
    let mut second = manager_over(store).await;
    let results = second
        .retrieve(
            "capital of France",
            RetrieveOptions {
                user_id: Some("u1".to_string()),
                memory_types: Some(vec![MemoryType::Semantic]),
                ..Default::default()
            },
        )
        .await;

    assert!(!results.is_empty(), "restart retrieval found nothing");
    let hit = &results[0];
    assert_eq!(hit.item.id, id, "id must be preserved across restart");
    assert_eq!(hit.item.content, "Paris is the capital of France");
    assert_eq!(hit.item.user_id, "u1");
    assert_eq!(hit.item.memory_type, MemoryType::Semantic);
    assert!((hit.item.importance - 0.8).abs() < 1e-6);
    assert_eq!(hit.source, RetrievalSource::Vector);
}

#[tokio::test]
async fn episodic_memory_survives_process_restart_with_metadata() {
    let store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());

    let mut first = manager_over(Arc::clone(&store)).await;
    let mut options = StoreOptions {
        memory_type: Some(MemoryType::Episodic),
        importance: Some(0.7),
        session_id: Some("trip".to_string()),
        ..Default::default()
    };
    options
        .metadata
        .insert("mood".to_string(), serde_json::json!("great"));
    let id = first
        .store("hiked the coastal trail at dawn", "u1", options)
        .await
        .expect("store succeeds");
    drop(first);

    let mut second = manager_over(store).await;
    let results = second
        .retrieve(
            "coastal trail",
            RetrieveOptions {
                memory_types: Some(vec![MemoryType::Episodic]),
                ..Default::default()
            },
        )
        .await;

    assert_eq!(results.len(), 1);
    let item = &results[0].item;
    assert_eq!(item.id, id);
    // Unknown payload keys are re-homed under metadata
    assert_eq!(item.metadata["mood"], "great");
    assert_eq!(item.metadata["session_id"], "trip");
}

#[tokio::test]
async fn user_filter_is_enforced_across_restart() {
    let store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());

    let mut first = manager_over(Arc::clone(&store)).await;
    first
        .store(
            "Berlin is the capital of Germany",
            "u1",
            StoreOptions {
                memory_type: Some(MemoryType::Semantic),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    drop(first);

    let mut second = manager_over(store).await;
    let results = second
        .retrieve(
            "capital of Germany",
            RetrieveOptions {
                user_id: Some("someone_else".to_string()),
                memory_types: Some(vec![MemoryType::Semantic]),
                ..Default::default()
            },
        )
        .await;

    assert!(results.is_empty(), "other users' memories must not leak");
}
