//! Graph traversal integration tests
//!
//! Concept hierarchy: DL --SUBSET_OF--> ML --SUBSET_OF--> AI.
//! Bounded undirected traversal from DL must surface ML at distance 1 and
//! AI at distance 2, in that order, with the edge-type path attached.

use engram_memory::{Entity, GraphStore, MemoryGraphStore, Relation};

async fn concept_graph() -> MemoryGraphStore {
    let store = MemoryGraphStore::new();
    store
        .upsert_entity(&Entity::new("ml", "ML", "Concept"))
        .await
        .unwrap();
    store
        .upsert_entity(&Entity::new("ai", "AI", "Concept"))
        .await
        .unwrap();
    store
        .upsert_relation(&Relation::new("ml", "ai", "SUBSET_OF"))
        .await
        .unwrap();
    store
        .upsert_entity(&Entity::new("dl", "DL", "Concept"))
        .await
        .unwrap();
    store
        .upsert_relation(&Relation::new("dl", "ml", "SUBSET_OF"))
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn traversal_orders_by_distance_with_paths() {
    let store = concept_graph().await;

    let related = store.related_entities("dl", 2, 10).await.unwrap();
    assert_eq!(related.len(), 2);

    assert_eq!(related[0].entity.entity_id, "ml");
    assert_eq!(related[0].distance, 1);
    assert_eq!(related[0].relationship_path, vec!["SUBSET_OF"]);

    assert_eq!(related[1].entity.entity_id, "ai");
    assert_eq!(related[1].distance, 2);
    assert_eq!(
        related[1].relationship_path,
        vec!["SUBSET_OF", "SUBSET_OF"]
    );
}

#[tokio::test]
async fn traversal_excludes_start_node() {
    let store = concept_graph().await;
    let related = store.related_entities("ml", 2, 10).await.unwrap();

    assert!(related.iter().all(|r| r.entity.entity_id != "ml"));
    // ml touches both neighbors at distance 1
    assert_eq!(related.len(), 2);
    assert!(related.iter().all(|r| r.distance == 1));
}

#[tokio::test]
async fn repeated_relation_add_is_idempotent_on_readback() {
    let store = concept_graph().await;

    // Property 4: repeated addition does not create duplicate edges
    store
        .upsert_relation(&Relation::new("dl", "ml", "SUBSET_OF").with_property("confidence", 0.9))
        .await
        .unwrap();
    store
        .upsert_relation(&Relation::new("dl", "ml", "SUBSET_OF").with_property("source", "survey"))
        .await
        .unwrap();

    let related = store.related_entities("dl", 1, 10).await.unwrap();
    assert_eq!(related.len(), 1, "duplicate edges must not appear");
}

#[tokio::test]
async fn repeated_entity_add_merges_properties() {
    let store = MemoryGraphStore::new();

    // Property 8: addEntity twice is indistinguishable from once, modulo merge
    store
        .upsert_entity(&Entity::new("rust", "Rust", "Language").with_property("kind", "systems"))
        .await
        .unwrap();
    store
        .upsert_entity(&Entity::new("rust", "Rust", "Language").with_property("year", 2015))
        .await
        .unwrap();

    assert_eq!(store.entity_count().await.unwrap(), 1);
    let entity = store.get_entity("rust").await.unwrap().unwrap();
    assert_eq!(entity.properties["kind"], "systems");
    assert_eq!(entity.properties["year"], 2015);
}

#[tokio::test]
async fn search_entities_by_name_and_type() {
    let store = concept_graph().await;
    store
        .upsert_entity(&Entity::new("mlib", "MLlib", "Library"))
        .await
        .unwrap();

    let all = store.search_entities("ml", None, 10).await.unwrap();
    assert_eq!(all.len(), 2);

    let libraries = store
        .search_entities("ml", Some(&["Library".to_string()]), 10)
        .await
        .unwrap();
    assert_eq!(libraries.len(), 1);
    assert_eq!(libraries[0].entity_id, "mlib");
}
