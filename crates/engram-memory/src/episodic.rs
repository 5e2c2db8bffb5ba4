//! Episodic memory tier
//!
//! TigerStyle: Write-through vector index, in-process maps as caches.
//!
//! Items group under a session id and carry free-form context. The vector
//! payload holds the full restart-safe projection of each item, so a fresh
//! process can rebuild items from payloads on read. The session timeline is
//! append-only within a process.
//!
//! Retrieval is hybrid: ANN search first, keyword fill second, final order
//! by timestamp descending.

use crate::embedder::Embedder;
use crate::error::MemoryResult;
use crate::types::{
    clamp_importance, MemoryItem, MemoryStats, MemoryType, RetrievalSource, RetrieveFilters,
    ScoredMemory,
};
use crate::vector::{Distance, Filter, VectorPoint, VectorStore};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default session id for ungrouped episodes
pub const SESSION_ID_DEFAULT: &str = "default_session";

/// Forgetting policy for long-term tiers
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ForgetPolicy {
    /// Drop items with importance below the threshold
    ImportanceBased(f32),
    /// Drop items older than the given number of days
    TimeBased(i64),
    /// Evict lowest-importance items until at most `target` remain
    CapacityBased(usize),
}

/// Episodic memory store
pub struct EpisodicMemory {
    capacity: usize,
    collection: String,
    distance: Distance,
    items: HashMap<String, MemoryItem>,
    /// Episode ids in insertion order; append-only within a process
    timeline: Vec<String>,
    /// session id → episode ids in insertion order
    sessions: HashMap<String, Vec<String>>,
    vector: Option<Arc<dyn VectorStore>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl EpisodicMemory {
    /// Create an in-memory-only episodic tier
    pub fn new(capacity: usize, collection: impl Into<String>) -> Self {
        assert!(capacity > 0, "episodic capacity must be positive");
        Self {
            capacity,
            collection: collection.into(),
            distance: Distance::Cosine,
            items: HashMap::new(),
            timeline: Vec::new(),
            sessions: HashMap::new(),
            vector: None,
            embedder: None,
        }
    }

    /// Attach vector storage
    pub fn with_vector(mut self, store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        self.vector = Some(store);
        self.embedder = Some(embedder);
        self
    }

    /// Override the collection distance metric
    pub fn with_distance(mut self, distance: Distance) -> Self {
        self.distance = distance;
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
        for field in ["memory_type", "user_id", "memory_id", "session_id", "timestamp"] {
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

    /// The restart-safe payload projection of an item
    fn payload_for(item: &MemoryItem) -> Map<String, Value> {
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
        payload
    }

    fn index_item(&mut self, item: MemoryItem) {
        let session = item
            .metadata
            .get("session_id")
            .and_then(|v| v.as_str())
            .unwrap_or(SESSION_ID_DEFAULT)
            .to_string();
        self.timeline.push(item.id.clone());
        self.sessions.entry(session).or_default().push(item.id.clone());
        self.items.insert(item.id.clone(), item);
    }

    fn unindex_item(&mut self, id: &str) {
        self.items.remove(id);
        self.timeline.retain(|existing| existing != id);
        for ids in self.sessions.values_mut() {
            ids.retain(|existing| existing != id);
        }
    }

    /// Lowest-importance item id, ties broken by oldest timestamp
    fn eviction_candidate(&self) -> Option<String> {
        self.items
            .values()
            .min_by(|a, b| {
                a.importance
                    .total_cmp(&b.importance)
                    .then(a.timestamp.cmp(&b.timestamp))
            })
            .map(|item| item.id.clone())
    }

    /// Add an episode
    ///
    /// `session_id` defaults to the shared session; `context` is free-form.
    /// The vector write is write-through; its failure degrades to in-memory
    /// only.
    pub async fn add(
        &mut self,
        mut item: MemoryItem,
        session_id: Option<&str>,
        context: Option<&str>,
    ) -> String {
        item.memory_type = MemoryType::Episodic;
        let session = session_id.unwrap_or(SESSION_ID_DEFAULT);
        item.metadata
            .insert("session_id".to_string(), json!(session));
        if let Some(context) = context {
            item.metadata.insert("context".to_string(), json!(context));
        }

        if self.items.len() >= self.capacity {
            if let Some(evicted) = self.eviction_candidate() {
                debug!(id = %evicted, "Episodic tier full, evicting lowest importance");
                self.unindex_item(&evicted);
                if let Some(store) = &self.vector {
                    if let Err(e) = store.delete_by_ids(&self.collection, &[evicted]).await {
                        warn!(error = %e, "Failed to delete evicted episode from vector store");
                    }
                }
            }
        }

        let id = item.id.clone();
        self.write_vector(&item).await;
        self.index_item(item);
        id
    }

    async fn write_vector(&self, item: &MemoryItem) {
        let (Some(store), Some(embedder)) = (&self.vector, &self.embedder) else {
            return;
        };
        let vector = match embedder.embed(&item.content).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "Embedding failed; episode kept in memory only");
                return;
            }
        };
        let point = VectorPoint {
            id: item.id.clone(),
            vector,
            payload: Self::payload_for(item),
        };
        if let Err(e) = store.upsert(&self.collection, vec![point]).await {
            warn!(error = %e, "Vector write failed; episode kept in memory only");
        }
    }

    /// Hybrid retrieval: vector hits first, keyword fill second
    ///
    /// Vector hits are hydrated from the in-memory map when present,
    /// otherwise rebuilt from the payload and re-inserted. Final order is
    /// timestamp descending.
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
                            MemoryType::Episodic,
                        );
                        self.index_item(rebuilt.clone());
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
            let needle = query.to_lowercase();
            let mut keyword_hits: Vec<&MemoryItem> = self
                .items
                .values()
                .filter(|item| results.iter().all(|r| r.item.id != item.id))
                .filter(|item| needle.is_empty() || item.content.to_lowercase().contains(&needle))
                .filter(|item| {
                    filters
                        .user_id
                        .as_deref()
                        .map(|user| item.user_id == user)
                        .unwrap_or(true)
                })
                .filter(|item| {
                    filters
                        .session_id
                        .as_deref()
                        .map(|session| {
                            item.metadata.get("session_id").and_then(|v| v.as_str())
                                == Some(session)
                        })
                        .unwrap_or(true)
                })
                .filter(|item| {
                    filters
                        .min_importance
                        .map(|min| item.importance >= min)
                        .unwrap_or(true)
                })
                .collect();
            keyword_hits.sort_by(|a, b| b.importance.total_cmp(&a.importance));
            keyword_hits.truncate(limit - results.len());

            for item in keyword_hits {
                results.push(ScoredMemory::new(
                    item.clone(),
                    item.importance,
                    RetrievalSource::Keyword,
                ));
            }
        }

        results.sort_by(|a, b| b.item.timestamp.cmp(&a.item.timestamp));
        results.truncate(limit);
        results
    }

    /// ANN search; `None` means the vector path is unavailable and the
    /// caller should fall back to keyword retrieval.
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
                warn!(error = %e, "Query embedding failed; falling back to keyword retrieval");
                return None;
            }
        };

        let mut filter = Filter::new().must_match("memory_type", MemoryType::Episodic.as_str());
        if let Some(user) = &filters.user_id {
            filter = filter.must_match("user_id", user.as_str());
        }
        if let Some(session) = &filters.session_id {
            filter = filter.must_match("session_id", session.as_str());
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
                warn!(error = %e, "Vector search failed; falling back to keyword retrieval");
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

    /// Episodes of one session, in insertion order
    pub fn session_items(&self, session_id: &str) -> Vec<&MemoryItem> {
        self.sessions
            .get(session_id)
            .map(|ids| ids.iter().filter_map(|id| self.items.get(id)).collect())
            .unwrap_or_default()
    }

    /// Episodes created inside a time window, oldest first
    pub fn search_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Vec<&MemoryItem> {
        let mut hits: Vec<&MemoryItem> = self
            .items
            .values()
            .filter(|item| item.timestamp >= start && item.timestamp <= end)
            .collect();
        hits.sort_by_key(|item| item.timestamp);
        hits.truncate(limit);
        hits
    }

    /// Update an episode; content changes are re-embedded
    pub async fn update(
        &mut self,
        id: &str,
        content: Option<String>,
        importance: Option<f32>,
    ) -> bool {
        let Some(item) = self.items.get_mut(id) else {
            return false;
        };

        let content_changed = match content {
            Some(content) if content != item.content => {
                item.content = content;
                true
            }
            _ => false,
        };
        if let Some(importance) = importance {
            item.importance = clamp_importance(importance);
        }

        if content_changed {
            let snapshot = item.clone();
            self.write_vector(&snapshot).await;
        }
        true
    }

    /// Remove an episode everywhere
    pub async fn remove(&mut self, id: &str) -> bool {
        if !self.items.contains_key(id) {
            return false;
        }
        self.unindex_item(id);
        if let Some(store) = &self.vector {
            if let Err(e) = store.delete_by_ids(&self.collection, &[id.to_string()]).await {
                warn!(error = %e, "Failed to delete episode from vector store");
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
                let cutoff = Utc::now() - Duration::days(max_age_days);
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
            self.unindex_item(id);
        }
        if !doomed.is_empty() {
            if let Some(store) = &self.vector {
                if let Err(e) = store.delete_by_ids(&self.collection, &doomed).await {
                    warn!(error = %e, "Failed to delete forgotten episodes from vector store");
                }
            }
        }
        doomed.len()
    }

    /// Drop everything, including the vector collection contents
    pub async fn clear(&mut self) {
        self.items.clear();
        self.timeline.clear();
        self.sessions.clear();
        if let Some(store) = &self.vector {
            if let Err(e) = store.clear(&self.collection).await {
                warn!(error = %e, "Failed to clear episodic vector collection");
            }
        }
    }

    /// All items (no TTL in this tier)
    pub fn get_all(&self) -> Vec<&MemoryItem> {
        self.items.values().collect()
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
}
