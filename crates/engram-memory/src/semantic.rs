//! Semantic memory tier
//!
//! TigerStyle: Concept index for keyword fallback, vector index for ANN,
//! graph pass-through for entities and relations.
//!
//! Stores facts and concepts. The concept index maps words of length >= 3
//! to memory ids; it backs keyword retrieval when the vector path is
//! unavailable. Updates re-embed iff the content changed; importance-only
//! changes touch just the in-memory record.

use crate::embedder::Embedder;
use crate::episodic::ForgetPolicy;
use crate::error::{MemoryError, MemoryResult};
use crate::graph::{Entity, GraphStore, RelatedEntity, Relation};
use crate::types::{
    clamp_importance, MemoryItem, MemoryStats, MemoryType, RetrievalSource, RetrieveFilters,
    ScoredMemory,
};
use crate::vector::{Distance, Filter, VectorPoint, VectorStore};
use chrono::Utc;
use serde_json::{json, Map};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Minimum word length for the concept index
pub const CONCEPT_WORD_LENGTH_MIN: usize = 3;

/// Semantic memory store
pub struct SemanticMemory {
    capacity: usize,
    collection: String,
    distance: Distance,
    items: HashMap<String, MemoryItem>,
    /// word → ids of items containing it
    concept_index: HashMap<String, HashSet<String>>,
    vector: Option<Arc<dyn VectorStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    graph: Option<Arc<dyn GraphStore>>,
}

impl SemanticMemory {
    /// Create an in-memory-only semantic tier
    pub fn new(capacity: usize, collection: impl Into<String>) -> Self {
        assert!(capacity > 0, "semantic capacity must be positive");
        Self {
            capacity,
            collection: collection.into(),
            distance: Distance::Cosine,
            items: HashMap::new(),
            concept_index: HashMap::new(),
            vector: None,
            embedder: None,
            graph: None,
        }
    }

    /// Override the collection distance metric
    pub fn with_distance(mut self, distance: Distance) -> Self {
        self.distance = distance;
        self
    }

    /// Attach vector storage
    pub fn with_vector(mut self, store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        self.vector = Some(store);
        self.embedder = Some(embedder);
        self
    }

    /// Attach a graph store
    pub fn with_graph(mut self, graph: Arc<dyn GraphStore>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Ensure the collection and its payload indexes exist
    pub async fn init(&self) -> MemoryResult<()> {
        let (Some(store), Some(embedder)) = (&self.vector, &self.embedder) else {
            return Ok(());
        };
        store
            .ensure_collection(&self.collection, embedder.dimension(), self.distance)
            .await?;
        for field in ["memory_type", "category", "user_id", "memory_id", "timestamp"] {
            store
                .create_payload_index(
                    &self.collection,
                    field,
                    crate::vector::PayloadIndexKind::Keyword,
                )
                .await?;
        }
        Ok(())
    }

    /// Words eligible for the concept index
    fn index_words(content: &str) -> impl Iterator<Item = String> + '_ {
        content
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| word.len() >= CONCEPT_WORD_LENGTH_MIN)
            .map(str::to_string)
            .collect::<HashSet<_>>()
            .into_iter()
    }

    fn index_content(&mut self, id: &str, content: &str) {
        for word in Self::index_words(content) {
            self.concept_index
                .entry(word)
                .or_default()
                .insert(id.to_string());
        }
    }

    fn unindex_content(&mut self, id: &str, content: &str) {
        for word in Self::index_words(content) {
            if let Some(ids) = self.concept_index.get_mut(&word) {
                ids.remove(id);
                if ids.is_empty() {
                    self.concept_index.remove(&word);
                }
            }
        }
    }

    async fn write_vector(&self, item: &MemoryItem) {
        let (Some(store), Some(embedder)) = (&self.vector, &self.embedder) else {
            return;
        };
        let vector = match embedder.embed(&item.content).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "Embedding failed; fact kept in memory only");
                return;
            }
        };

        let mut payload = Map::new();
        payload.insert("memory_id".to_string(), json!(item.id));
        payload.insert("user_id".to_string(), json!(item.user_id));
        payload.insert("memory_type".to_string(), json!(item.memory_type.as_str()));
        payload.insert("content".to_string(), json!(item.content));
        payload.insert("importance".to_string(), json!(item.importance));
        payload.insert("timestamp".to_string(), json!(item.timestamp.to_rfc3339()));
        for (key, value) in &item.metadata {
            payload.entry(key.clone()).or_insert(value.clone());
        }

        let point = VectorPoint {
            id: item.id.clone(),
            vector,
            payload,
        };
        if let Err(e) = store.upsert(&self.collection, vec![point]).await {
            warn!(error = %e, "Vector write failed; fact kept in memory only");
        }
    }

    /// Add a fact/concept
    pub async fn add(&mut self, mut item: MemoryItem) -> String {
        item.memory_type = MemoryType::Semantic;

        if self.items.len() >= self.capacity {
            let doomed = self
                .items
                .values()
                .min_by(|a, b| {
                    a.importance
                        .total_cmp(&b.importance)
                        .then(a.timestamp.cmp(&b.timestamp))
                })
                .map(|i| i.id.clone());
            if let Some(id) = doomed {
                debug!(id = %id, "Semantic tier full, evicting lowest importance");
                self.remove(&id).await;
            }
        }

        let id = item.id.clone();
        self.index_content(&id, &item.content);
        self.write_vector(&item).await;
        self.items.insert(id.clone(), item);
        id
    }

    /// Hybrid retrieval pinned to `memory_type = "semantic"`
    pub async fn retrieve(
        &mut self,
        query: &str,
        filters: &RetrieveFilters,
        limit: usize,
    ) -> Vec<ScoredMemory> {
        let mut results: Vec<ScoredMemory> = Vec::new();

        if let Some(hits) = self.vector_search(query, filters, limit * 2).await {
            for hit in hits {
                if results.len() >= limit {
                    break;
                }
                let memory_id = hit
                    .payload
                    .get("memory_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&hit.id)
                    .to_string();

                let item = match self.items.get_mut(&memory_id) {
                    Some(item) => {
                        item.record_access();
                        item.clone()
                    }
                    None => {
                        // Restart path: rebuild from the durable payload
                        let rebuilt = crate::types::item_from_payload(
                            &hit.id,
                            &hit.payload,
                            MemoryType::Semantic,
                        );
                        self.index_content(&rebuilt.id, &rebuilt.content);
                        self.items.insert(rebuilt.id.clone(), rebuilt.clone());
                        rebuilt
                    }
                };

                if let Some(min) = filters.min_importance {
                    if item.importance < min {
                        continue;
                    }
                }
                results.push(ScoredMemory::new(item, hit.score, RetrievalSource::Vector));
            }
        }

        if results.len() < limit {
            for (id, matched) in self.concept_matches(query) {
                if results.len() >= limit {
                    break;
                }
                if results.iter().any(|r| r.item.id == id) {
                    continue;
                }
                let Some(item) = self.items.get_mut(&id) else {
                    continue;
                };
                let keep = filters
                    .user_id
                    .as_deref()
                    .map(|user| item.user_id == user)
                    .unwrap_or(true)
                    && filters
                        .min_importance
                        .map(|min| item.importance >= min)
                        .unwrap_or(true);
                if !keep {
                    continue;
                }
                item.record_access();
                let score = matched as f32;
                results.push(ScoredMemory::new(
                    item.clone(),
                    score,
                    RetrievalSource::Keyword,
                ));
            }
        }

        results.sort_by(|a, b| b.item.timestamp.cmp(&a.item.timestamp));
        results.truncate(limit);
        results
    }

    /// Candidate ids from the concept index, ordered by matched word count
    fn concept_matches(&self, query: &str) -> Vec<(String, usize)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for word in Self::index_words(query) {
            if let Some(ids) = self.concept_index.get(&word) {
                for id in ids {
                    *counts.entry(id.clone()).or_insert(0) += 1;
                }
            }
        }
        let mut ordered: Vec<(String, usize)> = counts.into_iter().collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1));
        ordered
    }

    async fn vector_search(
        &self,
        query: &str,
        filters: &RetrieveFilters,
        limit: usize,
    ) -> Option<Vec<crate::vector::SearchHit>> {
        let (store, embedder) = (self.vector.as_ref()?, self.embedder.as_ref()?);

        let vector = match embedder.embed(query).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "Query embedding failed; falling back to concept index");
                return None;
            }
        };

        let mut filter = Filter::new().must_match("memory_type", MemoryType::Semantic.as_str());
        if let Some(user) = &filters.user_id {
            filter = filter.must_match("user_id", user.as_str());
        }

        match store
            .search(
                &self.collection,
                &vector,
                limit,
                Some(crate::vector::SIMILARITY_MIN_DEFAULT),
                Some(&filter),
            )
            .await
        {
            Ok(hits) => Some(hits),
            Err(e) => {
                warn!(error = %e, "Vector search failed; falling back to concept index");
                None
            }
        }
    }

    /// Fetch an item by id, recording the access
    pub fn get(&mut self, id: &str) -> Option<&MemoryItem> {
        let item = self.items.get_mut(id)?;
        item.record_access();
        Some(&*item)
    }

    /// Update a fact
    ///
    /// Content changes rewrite both the concept index and the stored vector;
    /// importance-only changes touch just the in-memory record.
    pub async fn update(
        &mut self,
        id: &str,
        content: Option<String>,
        importance: Option<f32>,
    ) -> bool {
        let Some(current) = self.items.get(id) else {
            return false;
        };
        let old_content = current.content.clone();

        let content_changed = matches!(&content, Some(new) if *new != old_content);
        {
            let item = self.items.get_mut(id).expect("checked above");
            if let Some(content) = content {
                item.content = content;
            }
            if let Some(importance) = importance {
                item.importance = clamp_importance(importance);
            }
        }

        if content_changed {
            self.unindex_content(id, &old_content);
            let snapshot = self.items.get(id).expect("checked above").clone();
            self.index_content(id, &snapshot.content);
            self.write_vector(&snapshot).await;
        }
        true
    }

    /// Remove a fact everywhere
    pub async fn remove(&mut self, id: &str) -> bool {
        let Some(item) = self.items.remove(id) else {
            return false;
        };
        let content = item.content;
        self.unindex_content(id, &content);
        if let Some(store) = &self.vector {
            if let Err(e) = store.delete_by_ids(&self.collection, &[id.to_string()]).await {
                warn!(error = %e, "Failed to delete fact from vector store");
            }
        }
        true
    }

    /// Apply a forgetting policy, returning the number of items dropped
    pub async fn forget(&mut self, policy: ForgetPolicy) -> usize {
        let doomed: Vec<String> = match policy {
            ForgetPolicy::ImportanceBased(threshold) => self
                .items
                .values()
                .filter(|item| item.importance < threshold)
                .map(|item| item.id.clone())
                .collect(),
            ForgetPolicy::TimeBased(max_age_days) => {
                let cutoff = Utc::now() - chrono::Duration::days(max_age_days);
                self.items
                    .values()
                    .filter(|item| item.timestamp < cutoff)
                    .map(|item| item.id.clone())
                    .collect()
            }
            ForgetPolicy::CapacityBased(target) => {
                if self.items.len() <= target {
                    Vec::new()
                } else {
                    let mut ordered: Vec<&MemoryItem> = self.items.values().collect();
                    ordered.sort_by(|a, b| {
                        a.importance
                            .total_cmp(&b.importance)
                            .then(a.timestamp.cmp(&b.timestamp))
                    });
                    ordered
                        .iter()
                        .take(self.items.len() - target)
                        .map(|item| item.id.clone())
                        .collect()
                }
            }
        };

        for id in &doomed {
            self.remove(id).await;
        }
        doomed.len()
    }

    /// Drop all facts, the concept index and the vector collection contents
    ///
    /// Graph entities are left in place; they have their own lifecycle.
    pub async fn clear(&mut self) {
        self.items.clear();
        self.concept_index.clear();
        if let Some(store) = &self.vector {
            if let Err(e) = store.clear(&self.collection).await {
                warn!(error = %e, "Failed to clear semantic vector collection");
            }
        }
    }

    /// All items
    pub fn get_all(&self) -> Vec<&MemoryItem> {
        self.items.values().collect()
    }

    /// Whether the concept index is empty
    pub fn concept_index_is_empty(&self) -> bool {
        self.concept_index.is_empty()
    }

    /// Tier statistics
    pub fn stats(&self) -> MemoryStats {
        let avg_importance = if self.items.is_empty() {
            0.0
        } else {
            self.items.values().map(|i| i.importance).sum::<f32>() / self.items.len() as f32
        };
        MemoryStats {
            count: self.items.len(),
            total_count: self.items.len(),
            avg_importance,
            oldest: self.items.values().map(|i| i.timestamp).min(),
            newest: self.items.values().map(|i| i.timestamp).max(),
        }
    }

    // =========================================================================
    // Graph pass-through
    // =========================================================================

    /// Upsert an entity; graph failures degrade to a logged no-op
    pub async fn add_entity(&self, entity: &Entity) -> bool {
        let Some(graph) = &self.graph else {
            warn!("No graph store attached; entity not recorded");
            return false;
        };
        match graph.upsert_entity(entity).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, entity = %entity.entity_id, "Entity upsert failed");
                false
            }
        }
    }

    /// Upsert a typed relation; graph failures degrade to a logged no-op
    pub async fn add_relation(&self, relation: &Relation) -> bool {
        let Some(graph) = &self.graph else {
            warn!("No graph store attached; relation not recorded");
            return false;
        };
        match graph.upsert_relation(relation).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    error = %e,
                    from = %relation.from_entity,
                    to = %relation.to_entity,
                    "Relation upsert failed"
                );
                false
            }
        }
    }

    /// Bounded undirected traversal; graph failures yield empty results
    pub async fn find_related_entities(
        &self,
        entity_id: &str,
        max_depth: usize,
        limit: usize,
    ) -> Vec<RelatedEntity> {
        let Some(graph) = &self.graph else {
            return Vec::new();
        };
        match graph.related_entities(entity_id, max_depth, limit).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, entity = %entity_id, "Graph traversal failed");
                Vec::new()
            }
        }
    }

    /// Name search; graph failures yield empty results
    pub async fn search_entities(
        &self,
        name_pattern: &str,
        entity_types: Option<&[String]>,
        limit: usize,
    ) -> Vec<Entity> {
        let Some(graph) = &self.graph else {
            return Vec::new();
        };
        match graph.search_entities(name_pattern, entity_types, limit).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, pattern = %name_pattern, "Entity search failed");
                Vec::new()
            }
        }
    }

    /// Close the graph driver
    pub async fn close(&self) -> MemoryResult<()> {
        if let Some(graph) = &self.graph {
            graph
                .close()
                .await
                .map_err(|e| MemoryError::graph_store(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use crate::graph::MemoryGraphStore;
    use crate::vector::MemoryVectorStore;

    fn fact(content: &str, importance: f32) -> MemoryItem {
        MemoryItem::new(content, MemoryType::Semantic, "u1").with_importance(importance)
    }

    async fn full_stack() -> (SemanticMemory, Arc<dyn VectorStore>) {
        let store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(128));
        let graph: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());
        let memory = SemanticMemory::new(100, "semantic_test")
            .with_vector(Arc::clone(&store), embedder)
            .with_graph(graph);
        memory.init().await.unwrap();
        (memory, store)
    }

    #[tokio::test]
    async fn test_concept_index_words() {
        let words: HashSet<String> =
            SemanticMemory::index_words("Paris is the capital of France").collect();
        assert!(words.contains("paris"));
        assert!(words.contains("capital"));
        assert!(words.contains("france"));
        // words shorter than 3 chars are skipped
        assert!(!words.contains("is"));
        assert!(!words.contains("of"));
    }

    #[tokio::test]
    async fn test_keyword_retrieval_via_concept_index() {
        let mut memory = SemanticMemory::new(10, "t");
        memory.add(fact("Paris is the capital of France", 0.8)).await;
        memory.add(fact("Rust prevents data races", 0.7)).await;

        let results = memory
            .retrieve("capital France", &RetrieveFilters::default(), 5)
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, RetrievalSource::Keyword);
        assert!(results[0].item.content.contains("Paris"));
    }

    #[tokio::test]
    async fn test_vector_retrieval() {
        let (mut memory, _) = full_stack().await;
        memory.add(fact("Paris is the capital of France", 0.8)).await;
        memory.add(fact("Rust prevents data races", 0.7)).await;

        let results = memory
            .retrieve("capital of France", &RetrieveFilters::default(), 1)
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, RetrievalSource::Vector);
        assert!(results[0].item.content.contains("Paris"));
    }

    #[tokio::test]
    async fn test_update_content_rewrites_indexes() {
        let (mut memory, _) = full_stack().await;
        let id = memory.add(fact("old topic words", 0.5)).await;

        memory
            .update(&id, Some("entirely new subject".to_string()), None)
            .await;

        let stale = memory
            .retrieve("topic", &RetrieveFilters::default(), 5)
            .await;
        assert!(stale.is_empty());

        let fresh = memory
            .retrieve("subject", &RetrieveFilters::default(), 5)
            .await;
        assert_eq!(fresh.len(), 1);
    }

    #[tokio::test]
    async fn test_importance_only_update_is_in_memory() {
        let mut memory = SemanticMemory::new(10, "t");
        let id = memory.add(fact("stable content", 0.4)).await;

        assert!(memory.update(&id, None, Some(0.9)).await);
        assert!((memory.get(&id).unwrap().importance - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_clear_empties_maps_index_and_vectors() {
        let (mut memory, store) = full_stack().await;
        memory.add(fact("fact one about storage", 0.5)).await;
        memory.add(fact("fact two about retrieval", 0.5)).await;

        memory.clear().await;

        assert!(memory.get_all().is_empty());
        assert!(memory.concept_index_is_empty());
        assert_eq!(store.info("semantic_test").await.unwrap().points_count, 0);
    }

    #[tokio::test]
    async fn test_eviction_on_capacity() {
        let mut memory = SemanticMemory::new(2, "t");
        memory.add(fact("low value fact", 0.1)).await;
        memory.add(fact("mid value fact", 0.5)).await;
        memory.add(fact("high value fact", 0.9)).await;

        let all = memory.get_all();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|i| i.importance > 0.2));
    }

    #[tokio::test]
    async fn test_graph_passthrough() {
        let (memory, _) = full_stack().await;
        assert!(memory.add_entity(&Entity::new("ml", "ML", "Concept")).await);
        assert!(memory.add_entity(&Entity::new("ai", "AI", "Concept")).await);
        assert!(
            memory
                .add_relation(&Relation::new("ml", "ai", "SUBSET_OF"))
                .await
        );

        let related = memory.find_related_entities("ml", 2, 10).await;
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].entity.entity_id, "ai");

        let found = memory.search_entities("a", None, 10).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entity_id, "ai");
    }

    #[tokio::test]
    async fn test_graph_absent_degrades() {
        let memory = SemanticMemory::new(10, "t");
        assert!(!memory.add_entity(&Entity::new("x", "X", "T")).await);
        assert!(memory.find_related_entities("x", 2, 10).await.is_empty());
        assert!(memory.search_entities("x", None, 10).await.is_empty());
    }
}
