//! Layered memory for Engram agents
//!
//! TigerStyle: Three-tier memory with explicit boundaries and a durable
//! vector projection.
//!
//! # Memory tiers
//!
//! 1. **Working** — short-lived, capacity-bounded, in-process; expires by
//!    TTL and evicts oldest-first on overflow.
//! 2. **Episodic** — per-event and session-scoped; write-through to a
//!    vector collection whose payload is the canonical restart-safe
//!    projection of each item.
//! 3. **Semantic** — facts and concepts; concept index for keyword
//!    fallback, vector index for ANN, graph index for entities and typed
//!    relations.
//!
//! The [`manager::MemoryManager`] fronts all three: auto-classification,
//! importance scoring, cross-tier retrieval, consolidation and forgetting.
//!
//! # Design principles
//!
//! - In-process maps are caches; the vector payload is the durable truth
//! - Store failures degrade (keyword fallback, logged no-ops), they never
//!   abort a turn
//! - Tier dispatch is by tag, not inheritance

pub mod embedder;
pub mod episodic;
pub mod error;
pub mod graph;
pub mod manager;
pub mod semantic;
pub mod types;
pub mod vector;
pub mod working;

pub use embedder::{embedder_from_env, CachedEmbedder, EmbedConfig, Embedder, HashEmbedder, HttpEmbedder};
pub use episodic::{EpisodicMemory, ForgetPolicy, SESSION_ID_DEFAULT};
pub use error::{MemoryError, MemoryResult};
pub use graph::{Entity, GraphStore, MemoryGraphStore, RelatedEntity, Relation};
pub use manager::{MemoryManager, MemoryManagerBuilder, RetrieveOptions, StoreOptions};
pub use semantic::SemanticMemory;
pub use types::{
    item_from_payload, MemoryConfig, MemoryItem, MemoryStats, MemoryType, RetrievalSource,
    RetrieveFilters, ScoredMemory,
};
pub use vector::{
    AnyOfFilter, CollectionInfo, Distance, Filter, MemoryVectorStore, PayloadIndexKind,
    QdrantConfig, QdrantStore, SearchHit, VectorPoint, VectorStore,
};
pub use working::WorkingMemory;

#[cfg(feature = "neo4j")]
pub use graph::neo4j::{Neo4jConfig, Neo4jStore};
