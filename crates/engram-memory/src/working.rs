//! Working memory tier
//!
//! TigerStyle: Bounded in-process map with explicit TTL semantics.
//!
//! Add is O(1); overflow evicts the oldest item by timestamp. Expired items
//! are hidden from reads and `get_all` but kept in the underlying map until
//! eviction, so stats can distinguish live `count` from raw `total_count`.
//! No external storage.

use crate::types::{
    clamp_importance, MemoryItem, MemoryStats, RetrievalSource, RetrieveFilters, ScoredMemory,
};
use chrono::{Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Working memory store
#[derive(Debug)]
pub struct WorkingMemory {
    capacity: usize,
    ttl_minutes: i64,
    items: HashMap<String, MemoryItem>,
}

impl WorkingMemory {
    /// Create a working memory with the given bounds
    pub fn new(capacity: usize, ttl_minutes: i64) -> Self {
        assert!(capacity > 0, "working memory capacity must be positive");
        Self {
            capacity,
            ttl_minutes,
            items: HashMap::new(),
        }
    }

    fn is_expired(&self, item: &MemoryItem) -> bool {
        if self.ttl_minutes <= 0 {
            return false;
        }
        Utc::now() - item.timestamp > Duration::minutes(self.ttl_minutes)
    }

    /// Add an item, evicting the oldest when the cap is exceeded
    pub fn add(&mut self, item: MemoryItem) -> String {
        if self.items.len() >= self.capacity {
            // Oldest by timestamp loses its slot
            let oldest = self
                .items
                .values()
                .min_by_key(|i| i.timestamp)
                .map(|i| i.id.clone());
            if let Some(id) = oldest {
                debug!(id = %id, "Working memory full, evicting oldest");
                self.items.remove(&id);
            }
        }

        let id = item.id.clone();
        self.items.insert(id.clone(), item);
        id
    }

    /// Fetch a live item by id, recording the access
    pub fn get(&mut self, id: &str) -> Option<&MemoryItem> {
        if self.items.get(id).map(|i| self.is_expired(i))? {
            return None;
        }
        let item = self.items.get_mut(id)?;
        item.record_access();
        Some(&*item)
    }

    /// Case-insensitive substring retrieval over live items
    ///
    /// Filtered by `user_id` and `min_importance`, sorted by importance
    /// descending, truncated to `limit`.
    pub fn retrieve(
        &mut self,
        query: &str,
        filters: &RetrieveFilters,
        limit: usize,
    ) -> Vec<ScoredMemory> {
        let needle = query.to_lowercase();
        let ttl_minutes = self.ttl_minutes;
        let now = Utc::now();
        let expired = |item: &MemoryItem| {
            ttl_minutes > 0 && now - item.timestamp > Duration::minutes(ttl_minutes)
        };

        let mut matches: Vec<&mut MemoryItem> = self
            .items
            .values_mut()
            .filter(|item| !expired(item))
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
                    .min_importance
                    .map(|min| item.importance >= min)
                    .unwrap_or(true)
            })
            .collect();

        matches.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        matches.truncate(limit);

        matches
            .into_iter()
            .map(|item| {
                item.record_access();
                ScoredMemory::new(item.clone(), item.importance, RetrievalSource::Keyword)
            })
            .collect()
    }

    /// Update content and/or importance in place
    ///
    /// The timestamp is immutable; only mutation through this method is
    /// supported.
    pub fn update(
        &mut self,
        id: &str,
        content: Option<String>,
        importance: Option<f32>,
        metadata: Option<Vec<(String, Value)>>,
    ) -> bool {
        let Some(item) = self.items.get_mut(id) else {
            return false;
        };
        if let Some(content) = content {
            item.content = content;
        }
        if let Some(importance) = importance {
            item.importance = clamp_importance(importance);
        }
        if let Some(entries) = metadata {
            for (key, value) in entries {
                item.metadata.insert(key, value);
            }
        }
        true
    }

    /// Remove an item by id
    pub fn remove(&mut self, id: &str) -> bool {
        self.items.remove(id).is_some()
    }

    /// Drop all items
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// All live items
    pub fn get_all(&self) -> Vec<&MemoryItem> {
        self.items
            .values()
            .filter(|item| !self.is_expired(item))
            .collect()
    }

    /// Tier statistics: live `count` vs raw `total_count`
    pub fn stats(&self) -> MemoryStats {
        let live: Vec<&MemoryItem> = self.get_all();
        let avg_importance = if live.is_empty() {
            0.0
        } else {
            live.iter().map(|i| i.importance).sum::<f32>() / live.len() as f32
        };

        MemoryStats {
            count: live.len(),
            total_count: self.items.len(),
            avg_importance,
            oldest: live.iter().map(|i| i.timestamp).min(),
            newest: live.iter().map(|i| i.timestamp).max(),
        }
    }
}
