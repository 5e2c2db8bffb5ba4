//! Memory primitives: item, retrieval results, stats, configuration
//!
//! TigerStyle: Explicit types with clear invariants. `importance` is always
//! clamped to [0, 1]; `timestamp` is immutable after creation.

use crate::vector::Distance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Default working-memory capacity (items)
pub const WORKING_CAPACITY_DEFAULT: usize = 100;

/// Default working-memory TTL in minutes
pub const WORKING_TTL_MINUTES_DEFAULT: i64 = 60;

/// Default long-term tier capacity (items)
pub const LONG_TERM_CAPACITY_DEFAULT: usize = 1000;

/// Default embedding dimension
pub const EMBEDDING_DIM_DEFAULT: usize = 1536;

/// Default retrieval fan-out
pub const RAG_TOP_K_DEFAULT: usize = 5;

/// Default minimum relevance for retrieved memories
pub const RAG_MIN_SCORE_DEFAULT: f32 = 0.2;

/// Default threshold for persisting a conversation turn
pub const CONVERSATION_IMPORTANCE_THRESHOLD_DEFAULT: f32 = 0.5;

/// Memory tier tag
///
/// Tiers differ in capacity, I/O cost and retrieval semantics; dispatch is
/// by tag, not inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// Short-lived, capacity-bounded, in-process
    Working,
    /// Per-event, timestamped, session-scoped, vector-indexed
    Episodic,
    /// Concept/knowledge tier with vector and graph indices
    Semantic,
}

impl MemoryType {
    /// Wire name of the tier
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Working => "working",
            MemoryType::Episodic => "episodic",
            MemoryType::Semantic => "semantic",
        }
    }

    /// Parse a wire name
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "working" => Some(MemoryType::Working),
            "episodic" => Some(MemoryType::Episodic),
            "semantic" => Some(MemoryType::Semantic),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single memory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Unique id within a tier (UUID v4)
    pub id: String,
    /// Text content
    pub content: String,
    /// Owning tier
    pub memory_type: MemoryType,
    /// Owning user
    pub user_id: String,
    /// Creation time; immutable after creation
    pub timestamp: DateTime<Utc>,
    /// Importance in [0, 1]
    pub importance: f32,
    /// Open metadata mapping
    pub metadata: Map<String, Value>,
    /// Last read time
    pub last_accessed: DateTime<Utc>,
    /// Number of reads
    pub access_count: u64,
}

impl MemoryItem {
    /// Create a new item with a fresh UUID and the current timestamp
    pub fn new(
        content: impl Into<String>,
        memory_type: MemoryType,
        user_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            memory_type,
            user_id: user_id.into(),
            timestamp: now,
            importance: 0.5,
            metadata: Map::new(),
            last_accessed: now,
            access_count: 0,
        }
    }

    /// Set the importance, clamped to [0, 1]
    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = clamp_importance(importance);
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace the importance, clamped to [0, 1]
    pub fn set_importance(&mut self, importance: f32) {
        self.importance = clamp_importance(importance);
    }

    /// Record a read
    pub fn record_access(&mut self) {
        self.last_accessed = Utc::now();
        self.access_count = self.access_count.saturating_add(1);
    }
}

/// Clamp an importance score into [0, 1]
pub fn clamp_importance(importance: f32) -> f32 {
    importance.clamp(0.0, 1.0)
}

/// Rebuild a memory item from a vector-store payload
///
/// The payload is the canonical restart-safe projection. Known keys map back
/// to fields; unknown keys are re-homed under `metadata`, keeping the store
/// forward-compatible with new optional fields.
pub fn item_from_payload(
    point_id: &str,
    payload: &Map<String, Value>,
    default_type: MemoryType,
) -> MemoryItem {
    let id = payload
        .get("memory_id")
        .and_then(|v| v.as_str())
        .unwrap_or(point_id)
        .to_string();
    let content = payload
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let user_id = payload
        .get("user_id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let memory_type = payload
        .get("memory_type")
        .and_then(|v| v.as_str())
        .and_then(MemoryType::parse)
        .unwrap_or(default_type);
    let importance = payload
        .get("importance")
        .and_then(|v| v.as_f64())
        .map(|v| clamp_importance(v as f32))
        .unwrap_or(0.5);
    let timestamp = payload
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let mut metadata = Map::new();
    for (key, value) in payload {
        if !matches!(
            key.as_str(),
            "memory_id" | "user_id" | "memory_type" | "content" | "importance" | "timestamp"
        ) {
            metadata.insert(key.clone(), value.clone());
        }
    }

    MemoryItem {
        id,
        content,
        memory_type,
        user_id,
        timestamp,
        importance,
        metadata,
        last_accessed: Utc::now(),
        access_count: 0,
    }
}

/// Where a retrieval hit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    /// ANN search over the vector index
    Vector,
    /// Substring / concept-index match
    Keyword,
}

impl RetrievalSource {
    /// Wire name of the source
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalSource::Vector => "vector",
            RetrievalSource::Keyword => "keyword",
        }
    }
}

/// A retrieved memory with its relevance score and provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemory {
    /// The memory item
    pub item: MemoryItem,
    /// Relevance score (similarity for vector hits)
    pub score: f32,
    /// How the hit was found
    pub source: RetrievalSource,
}

impl ScoredMemory {
    /// Create a scored result
    pub fn new(item: MemoryItem, score: f32, source: RetrievalSource) -> Self {
        Self {
            item,
            score,
            source,
        }
    }
}

/// Per-tier statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Live (non-expired) item count
    pub count: usize,
    /// Raw item count including expired-but-unevicted entries
    pub total_count: usize,
    /// Mean importance over live items
    pub avg_importance: f32,
    /// Oldest live item timestamp
    pub oldest: Option<DateTime<Utc>>,
    /// Newest live item timestamp
    pub newest: Option<DateTime<Utc>>,
}

/// Filters applied during retrieval
#[derive(Debug, Clone, Default)]
pub struct RetrieveFilters {
    /// Restrict to one user
    pub user_id: Option<String>,
    /// Restrict to one session (episodic only)
    pub session_id: Option<String>,
    /// Drop results below this importance
    pub min_importance: Option<f32>,
}

/// Tier configuration shared by the memory manager
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Working-memory item cap
    pub working_capacity: usize,
    /// Working-memory TTL in minutes (0 disables expiry)
    pub working_ttl_minutes: i64,
    /// Episodic tier item cap
    pub episodic_capacity: usize,
    /// Semantic tier item cap
    pub semantic_capacity: usize,
    /// Embedding dimension for the vector collections
    pub embedding_dim: usize,
    /// Distance metric for the vector collections
    pub distance: Distance,
    /// Episodic vector collection name
    pub episodic_collection: String,
    /// Semantic vector collection name
    pub semantic_collection: String,
    /// Retrieval fan-out
    pub rag_top_k: usize,
    /// Minimum relevance for retrieved memories
    pub rag_min_score: f32,
    /// Threshold for persisting a conversation turn
    pub conversation_importance_threshold: f32,
    /// Default session id for episodic grouping
    pub session_id: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            working_capacity: WORKING_CAPACITY_DEFAULT,
            working_ttl_minutes: WORKING_TTL_MINUTES_DEFAULT,
            episodic_capacity: LONG_TERM_CAPACITY_DEFAULT,
            semantic_capacity: LONG_TERM_CAPACITY_DEFAULT,
            embedding_dim: EMBEDDING_DIM_DEFAULT,
            distance: Distance::Cosine,
            episodic_collection: "episodic_memory".to_string(),
            semantic_collection: "semantic_memory".to_string(),
            rag_top_k: RAG_TOP_K_DEFAULT,
            rag_min_score: RAG_MIN_SCORE_DEFAULT,
            conversation_importance_threshold: CONVERSATION_IMPORTANCE_THRESHOLD_DEFAULT,
            session_id: "default_session".to_string(),
        }
    }
}

impl MemoryConfig {
    /// Load overrides from the environment on top of the defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dim) = env_parse::<usize>("EMBED_DIMENSIONS") {
            config.embedding_dim = dim;
        }
        // QDRANT_VECTOR_SIZE wins over EMBED_DIMENSIONS when both are set
        if let Some(dim) = env_parse::<usize>("QDRANT_VECTOR_SIZE") {
            config.embedding_dim = dim;
        }
        if let Some(distance) = std::env::var("QDRANT_DISTANCE")
            .ok()
            .and_then(|raw| Distance::parse(&raw))
        {
            config.distance = distance;
        }
        if let Ok(collection) = std::env::var("QDRANT_COLLECTION") {
            // The configured name prefixes the per-tier collections.
            config.episodic_collection = format!("{}_episodic", collection);
            config.semantic_collection = format!("{}_semantic", collection);
        }
        config
    }

    /// Override the session id
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|raw| raw.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_round_trip() {
        for tier in [MemoryType::Working, MemoryType::Episodic, MemoryType::Semantic] {
            assert_eq!(MemoryType::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(MemoryType::parse("perceptual"), None);
    }

    #[test]
    fn test_importance_clamped() {
        let item = MemoryItem::new("x", MemoryType::Working, "u1").with_importance(1.7);
        assert_eq!(item.importance, 1.0);

        let mut item = MemoryItem::new("x", MemoryType::Working, "u1");
        item.set_importance(-0.3);
        assert_eq!(item.importance, 0.0);
    }

    #[test]
    fn test_item_ids_unique() {
        let a = MemoryItem::new("x", MemoryType::Working, "u1");
        let b = MemoryItem::new("x", MemoryType::Working, "u1");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_record_access() {
        let mut item = MemoryItem::new("x", MemoryType::Working, "u1");
        item.record_access();
        item.record_access();
        assert_eq!(item.access_count, 2);
    }

    #[test]
    fn test_config_defaults() {
        let config = MemoryConfig::default();
        assert_eq!(config.session_id, "default_session");
        assert_eq!(config.episodic_collection, "episodic_memory");
        assert!(config.rag_top_k > 0);
    }
}
