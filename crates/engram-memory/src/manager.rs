//! Memory manager
//!
//! TigerStyle: One façade owning every tier, routing by memory type.
//!
//! The manager classifies incoming content, scores its importance, fans
//! retrieval out across the enabled tiers, consolidates important items
//! into longer-lived tiers, and cascades shutdown to the graph driver.
//! Per-tier failures during retrieval are logged and never abort the call.

use crate::embedder::Embedder;
use crate::episodic::{EpisodicMemory, ForgetPolicy};
use crate::error::{MemoryError, MemoryResult};
use crate::graph::{Entity, GraphStore, RelatedEntity, Relation};
use crate::semantic::SemanticMemory;
use crate::types::{
    clamp_importance, MemoryConfig, MemoryItem, MemoryStats, MemoryType, RetrieveFilters,
    ScoredMemory,
};
use crate::vector::VectorStore;
use crate::working::WorkingMemory;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Temporal / narrative words that suggest an episodic record
const EPISODIC_TRIGGERS: &[&str] = &[
    "yesterday",
    "today",
    "tomorrow",
    "last week",
    "remember when",
    "happened",
    "went to",
    "met with",
    "昨天",
    "今天",
    "明天",
    "发生",
];

/// Definitional words that suggest a semantic record
const SEMANTIC_TRIGGERS: &[&str] = &[
    "definition",
    "concept",
    "rule",
    "principle",
    "means",
    "is defined as",
    "is a",
    "定义",
    "概念",
    "规则",
    "原理",
];

/// Words that bump the importance heuristic
const IMPORTANCE_KEYWORDS: &[&str] = &[
    "important",
    "remember",
    "critical",
    "must",
    "always",
    "never forget",
    "key",
    "重要",
    "记住",
    "关键",
    "必须",
];

/// Options for storing a memory
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Explicit tier; `None` auto-classifies from content
    pub memory_type: Option<MemoryType>,
    /// Explicit importance; `None` applies the heuristic
    pub importance: Option<f32>,
    /// Episodic session override
    pub session_id: Option<String>,
    /// Free-form metadata
    pub metadata: Map<String, Value>,
}

/// Options for cross-tier retrieval
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    /// Restrict to one user
    pub user_id: Option<String>,
    /// Restrict to specific tiers; `None` means every enabled tier
    pub memory_types: Option<Vec<MemoryType>>,
    /// Total result cap
    pub limit: usize,
    /// Drop results below this importance
    pub min_importance: Option<f32>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            user_id: None,
            memory_types: None,
            limit: crate::types::RAG_TOP_K_DEFAULT,
            min_importance: None,
        }
    }
}

/// Builder for [`MemoryManager`]
pub struct MemoryManagerBuilder {
    config: MemoryConfig,
    vector: Option<Arc<dyn VectorStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    graph: Option<Arc<dyn GraphStore>>,
    enable_working: bool,
    enable_episodic: bool,
    enable_semantic: bool,
}

impl MemoryManagerBuilder {
    /// Start from a config
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            vector: None,
            embedder: None,
            graph: None,
            enable_working: true,
            enable_episodic: true,
            enable_semantic: true,
        }
    }

    /// Attach vector storage shared by the long-term tiers
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector = Some(store);
        self
    }

    /// Attach the embedder
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Attach the graph store used by the semantic tier
    pub fn graph_store(mut self, graph: Arc<dyn GraphStore>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Choose which tiers are enabled
    pub fn tiers(mut self, working: bool, episodic: bool, semantic: bool) -> Self {
        self.enable_working = working;
        self.enable_episodic = episodic;
        self.enable_semantic = semantic;
        self
    }

    /// Build the manager and initialize storage collections
    pub async fn build(self) -> MemoryResult<MemoryManager> {
        assert!(
            self.enable_working || self.enable_episodic || self.enable_semantic,
            "at least one memory tier must be enabled"
        );

        let mut episodic = EpisodicMemory::new(
            self.config.episodic_capacity,
            self.config.episodic_collection.clone(),
        );
        let mut semantic = SemanticMemory::new(
            self.config.semantic_capacity,
            self.config.semantic_collection.clone(),
        );

        episodic = episodic.with_distance(self.config.distance);
        semantic = semantic.with_distance(self.config.distance);
        if let (Some(store), Some(embedder)) = (&self.vector, &self.embedder) {
            episodic = episodic.with_vector(Arc::clone(store), Arc::clone(embedder));
            semantic = semantic.with_vector(Arc::clone(store), Arc::clone(embedder));
        }
        if let Some(graph) = &self.graph {
            semantic = semantic.with_graph(Arc::clone(graph));
        }

        if self.enable_episodic {
            episodic.init().await?;
        }
        if self.enable_semantic {
            semantic.init().await?;
        }

        info!(
            working = self.enable_working,
            episodic = self.enable_episodic,
            semantic = self.enable_semantic,
            "Memory manager initialized"
        );

        Ok(MemoryManager {
            working: WorkingMemory::new(
                self.config.working_capacity,
                self.config.working_ttl_minutes,
            ),
            episodic,
            semantic,
            enable_working: self.enable_working,
            enable_episodic: self.enable_episodic,
            enable_semantic: self.enable_semantic,
            config: self.config,
        })
    }
}

/// Façade over the memory tiers
pub struct MemoryManager {
    config: MemoryConfig,
    working: WorkingMemory,
    episodic: EpisodicMemory,
    semantic: SemanticMemory,
    enable_working: bool,
    enable_episodic: bool,
    enable_semantic: bool,
}

impl MemoryManager {
    /// Builder entry point
    pub fn builder(config: MemoryConfig) -> MemoryManagerBuilder {
        MemoryManagerBuilder::new(config)
    }

    /// The active configuration
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Pick a tier for unclassified content
    ///
    /// Episodic triggers beat semantic triggers; unmatched content defaults
    /// to working.
    pub fn classify(content: &str) -> MemoryType {
        let lower = content.to_lowercase();
        if EPISODIC_TRIGGERS.iter().any(|t| lower.contains(t)) {
            return MemoryType::Episodic;
        }
        if SEMANTIC_TRIGGERS.iter().any(|t| lower.contains(t)) {
            return MemoryType::Semantic;
        }
        MemoryType::Working
    }

    /// Whether the content carries one of the importance keywords
    pub fn has_importance_keyword(content: &str) -> bool {
        let lower = content.to_lowercase();
        IMPORTANCE_KEYWORDS.iter().any(|k| lower.contains(k))
    }

    /// Importance heuristic
    ///
    /// Base 0.5; +0.1 for long content; +0.2 for an importance keyword;
    /// metadata priority high +0.3 / low -0.2; clamped to [0, 1].
    pub fn score_importance(content: &str, metadata: &Map<String, Value>) -> f32 {
        let mut score = 0.5;
        if content.chars().count() > 100 {
            score += 0.1;
        }
        let lower = content.to_lowercase();
        if IMPORTANCE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            score += 0.2;
        }
        match metadata.get("priority").and_then(|v| v.as_str()) {
            Some("high") => score += 0.3,
            Some("low") => score -= 0.2,
            _ => {}
        }
        clamp_importance(score)
    }

    fn enabled_tiers(&self) -> Vec<MemoryType> {
        let mut tiers = Vec::new();
        if self.enable_working {
            tiers.push(MemoryType::Working);
        }
        if self.enable_episodic {
            tiers.push(MemoryType::Episodic);
        }
        if self.enable_semantic {
            tiers.push(MemoryType::Semantic);
        }
        tiers
    }

    fn require_enabled(&self, tier: MemoryType) -> MemoryResult<()> {
        let enabled = match tier {
            MemoryType::Working => self.enable_working,
            MemoryType::Episodic => self.enable_episodic,
            MemoryType::Semantic => self.enable_semantic,
        };
        if enabled {
            Ok(())
        } else {
            Err(MemoryError::TierDisabled {
                tier: tier.as_str().to_string(),
            })
        }
    }

    /// Store content, classifying and scoring it when the caller did not
    pub async fn store(
        &mut self,
        content: impl Into<String>,
        user_id: impl Into<String>,
        options: StoreOptions,
    ) -> MemoryResult<String> {
        let content = content.into();
        let user_id = user_id.into();

        let memory_type = options
            .memory_type
            .or_else(|| {
                options
                    .metadata
                    .get("type")
                    .and_then(|v| v.as_str())
                    .and_then(MemoryType::parse)
            })
            .unwrap_or_else(|| Self::classify(&content));
        self.require_enabled(memory_type)?;

        let importance = options
            .importance
            .map(clamp_importance)
            .unwrap_or_else(|| Self::score_importance(&content, &options.metadata));

        let mut item = MemoryItem::new(content, memory_type, user_id).with_importance(importance);
        item.metadata = options.metadata;

        debug!(
            id = %item.id,
            tier = %memory_type,
            importance = importance,
            "Storing memory"
        );

        let id = match memory_type {
            MemoryType::Working => self.working.add(item),
            MemoryType::Episodic => {
                let session = options
                    .session_id
                    .clone()
                    .unwrap_or_else(|| self.config.session_id.clone());
                self.episodic.add(item, Some(&session), None).await
            }
            MemoryType::Semantic => self.semantic.add(item).await,
        };
        Ok(id)
    }

    /// Cross-tier retrieval
    ///
    /// Fans out with `ceil(limit / tiers)` per tier, unions the results,
    /// sorts by importance descending and truncates to `limit`. A failing
    /// tier is logged and skipped.
    pub async fn retrieve(&mut self, query: &str, options: RetrieveOptions) -> Vec<ScoredMemory> {
        let tiers: Vec<MemoryType> = match &options.memory_types {
            Some(requested) => requested
                .iter()
                .copied()
                .filter(|tier| self.require_enabled(*tier).is_ok())
                .collect(),
            None => self.enabled_tiers(),
        };
        if tiers.is_empty() || options.limit == 0 {
            return Vec::new();
        }

        let per_tier_limit = options.limit.div_ceil(tiers.len());
        let filters = RetrieveFilters {
            user_id: options.user_id.clone(),
            session_id: None,
            min_importance: options.min_importance,
        };

        let mut results: Vec<ScoredMemory> = Vec::new();
        for tier in tiers {
            let tier_results = match tier {
                MemoryType::Working => self.working.retrieve(query, &filters, per_tier_limit),
                MemoryType::Episodic => {
                    self.episodic.retrieve(query, &filters, per_tier_limit).await
                }
                MemoryType::Semantic => {
                    self.semantic.retrieve(query, &filters, per_tier_limit).await
                }
            };
            results.extend(tier_results);
        }

        results.sort_by(|a, b| b.item.importance.total_cmp(&a.item.importance));
        results.truncate(options.limit);
        results
    }

    /// Fetch one item from a specific tier
    pub fn get(&mut self, id: &str, tier: MemoryType) -> Option<MemoryItem> {
        match tier {
            MemoryType::Working => self.working.get(id).cloned(),
            MemoryType::Episodic => self.episodic.get(id).cloned(),
            MemoryType::Semantic => self.semantic.get(id).cloned(),
        }
    }

    /// Remove one item from a specific tier
    pub async fn remove(&mut self, id: &str, tier: MemoryType) -> bool {
        match tier {
            MemoryType::Working => self.working.remove(id),
            MemoryType::Episodic => self.episodic.remove(id).await,
            MemoryType::Semantic => self.semantic.remove(id).await,
        }
    }

    /// Promote items of `from` with importance >= `threshold` into `to`
    ///
    /// Each promoted item becomes a new record (fresh id) with the same
    /// content and user, importance scaled by 1.1 capped at 1.0, and
    /// `metadata.consolidatedFrom` recording the source tier. Returns the
    /// number of items moved.
    pub async fn consolidate(
        &mut self,
        from: MemoryType,
        to: MemoryType,
        threshold: f32,
    ) -> MemoryResult<usize> {
        assert!(from != to, "consolidation requires distinct tiers");
        self.require_enabled(from)?;
        self.require_enabled(to)?;

        let candidates: Vec<MemoryItem> = match from {
            MemoryType::Working => self.working.get_all().into_iter().cloned().collect(),
            MemoryType::Episodic => self.episodic.get_all().into_iter().cloned().collect(),
            MemoryType::Semantic => self.semantic.get_all().into_iter().cloned().collect(),
        };

        let mut moved = 0usize;
        for source in candidates {
            if source.importance < threshold {
                continue;
            }

            self.remove(&source.id, from).await;

            let mut promoted = MemoryItem::new(source.content, to, source.user_id)
                .with_importance(clamp_importance(source.importance * 1.1));
            promoted.metadata = source.metadata;
            promoted
                .metadata
                .insert("consolidatedFrom".to_string(), from.as_str().into());

            match to {
                MemoryType::Working => {
                    self.working.add(promoted);
                }
                MemoryType::Episodic => {
                    let session = self.config.session_id.clone();
                    self.episodic.add(promoted, Some(&session), None).await;
                }
                MemoryType::Semantic => {
                    self.semantic.add(promoted).await;
                }
            }
            moved += 1;
        }

        if moved > 0 {
            info!(from = %from, to = %to, moved, "Consolidation complete");
        }
        Ok(moved)
    }

    /// Apply a forgetting policy to a long-term tier
    ///
    /// Working memory expires by TTL; a policy applied to it is a no-op.
    pub async fn forget(&mut self, tier: MemoryType, policy: ForgetPolicy) -> MemoryResult<usize> {
        self.require_enabled(tier)?;
        let dropped = match tier {
            MemoryType::Working => {
                warn!("Working memory expires by TTL; forget policy ignored");
                0
            }
            MemoryType::Episodic => self.episodic.forget(policy).await,
            MemoryType::Semantic => self.semantic.forget(policy).await,
        };
        Ok(dropped)
    }

    /// Clear one tier
    pub async fn clear(&mut self, tier: MemoryType) {
        match tier {
            MemoryType::Working => self.working.clear(),
            MemoryType::Episodic => self.episodic.clear().await,
            MemoryType::Semantic => self.semantic.clear().await,
        }
    }

    /// Statistics for every enabled tier
    pub fn stats(&self) -> HashMap<MemoryType, MemoryStats> {
        let mut stats = HashMap::new();
        if self.enable_working {
            stats.insert(MemoryType::Working, self.working.stats());
        }
        if self.enable_episodic {
            stats.insert(MemoryType::Episodic, self.episodic.stats());
        }
        if self.enable_semantic {
            stats.insert(MemoryType::Semantic, self.semantic.stats());
        }
        stats
    }

    /// Direct access to the episodic tier
    pub fn episodic(&mut self) -> &mut EpisodicMemory {
        &mut self.episodic
    }

    /// Direct access to the semantic tier
    pub fn semantic(&mut self) -> &mut SemanticMemory {
        &mut self.semantic
    }

    // =========================================================================
    // Graph pass-through (semantic tier)
    // =========================================================================

    /// Upsert an entity
    pub async fn add_entity(&self, entity: &Entity) -> bool {
        self.semantic.add_entity(entity).await
    }

    /// Upsert a relation
    pub async fn add_relation(&self, relation: &Relation) -> bool {
        self.semantic.add_relation(relation).await
    }

    /// Bounded undirected traversal
    pub async fn find_related_entities(
        &self,
        entity_id: &str,
        max_depth: usize,
        limit: usize,
    ) -> Vec<RelatedEntity> {
        self.semantic
            .find_related_entities(entity_id, max_depth, limit)
            .await
    }

    /// Entity name search
    pub async fn search_entities(
        &self,
        name_pattern: &str,
        entity_types: Option<&[String]>,
        limit: usize,
    ) -> Vec<Entity> {
        self.semantic
            .search_entities(name_pattern, entity_types, limit)
            .await
    }

    /// Release external resources (graph driver)
    pub async fn close(&mut self) {
        if let Err(e) = self.semantic.close().await {
            warn!(error = %e, "Failed to close graph driver");
        }
        info!("Memory manager closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use crate::graph::MemoryGraphStore;
    use crate::vector::MemoryVectorStore;
    use serde_json::json;

    async fn manager() -> MemoryManager {
        MemoryManager::builder(MemoryConfig::default())
            .vector_store(Arc::new(MemoryVectorStore::new()))
            .embedder(Arc::new(HashEmbedder::new(128)))
            .graph_store(Arc::new(MemoryGraphStore::new()))
            .build()
            .await
            .unwrap()
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            MemoryManager::classify("yesterday we went hiking"),
            MemoryType::Episodic
        );
        assert_eq!(
            MemoryManager::classify("the definition of entropy is disorder"),
            MemoryType::Semantic
        );
        assert_eq!(
            MemoryManager::classify("buy milk"),
            MemoryType::Working
        );
    }

    #[test]
    fn test_importance_heuristic() {
        let empty = Map::new();
        assert!((MemoryManager::score_importance("plain note", &empty) - 0.5).abs() < 1e-6);

        let long = "x ".repeat(60);
        assert!((MemoryManager::score_importance(&long, &empty) - 0.6).abs() < 1e-6);

        assert!(
            (MemoryManager::score_importance("this is important", &empty) - 0.7).abs() < 1e-6
        );

        let mut high = Map::new();
        high.insert("priority".to_string(), json!("high"));
        assert!((MemoryManager::score_importance("note", &high) - 0.8).abs() < 1e-6);

        let mut low = Map::new();
        low.insert("priority".to_string(), json!("low"));
        assert!((MemoryManager::score_importance("note", &low) - 0.3).abs() < 1e-6);

        // Clamped at 1.0
        let mut loud = Map::new();
        loud.insert("priority".to_string(), json!("high"));
        let long_important = format!("{} remember this", "y ".repeat(80));
        assert!(MemoryManager::score_importance(&long_important, &loud) <= 1.0);
    }

    #[tokio::test]
    async fn test_store_routes_by_classification() {
        let mut manager = manager().await;

        manager
            .store("yesterday the deploy broke", "u1", StoreOptions::default())
            .await
            .unwrap();
        manager
            .store("a monad is a concept in category theory", "u1", StoreOptions::default())
            .await
            .unwrap();
        manager
            .store("scratch note", "u1", StoreOptions::default())
            .await
            .unwrap();

        let stats = manager.stats();
        assert_eq!(stats[&MemoryType::Episodic].count, 1);
        assert_eq!(stats[&MemoryType::Semantic].count, 1);
        assert_eq!(stats[&MemoryType::Working].count, 1);
    }

    #[tokio::test]
    async fn test_store_honors_metadata_type() {
        let mut manager = manager().await;
        let mut metadata = Map::new();
        metadata.insert("type".to_string(), json!("semantic"));

        manager
            .store(
                "plain text routed explicitly",
                "u1",
                StoreOptions {
                    metadata,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(manager.stats()[&MemoryType::Semantic].count, 1);
    }

    #[tokio::test]
    async fn test_store_importance_always_clamped() {
        let mut manager = manager().await;
        let id = manager
            .store(
                "over the top",
                "u1",
                StoreOptions {
                    memory_type: Some(MemoryType::Working),
                    importance: Some(42.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let item = manager.get(&id, MemoryType::Working).unwrap();
        assert_eq!(item.importance, 1.0);
    }

    #[tokio::test]
    async fn test_cross_tier_retrieve_unions_and_sorts() {
        let mut manager = manager().await;
        manager
            .store(
                "project kickoff was yesterday",
                "u1",
                StoreOptions {
                    importance: Some(0.9),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        manager
            .store(
                "project roadmap scratch note",
                "u1",
                StoreOptions {
                    memory_type: Some(MemoryType::Working),
                    importance: Some(0.4),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let results = manager
            .retrieve(
                "project",
                RetrieveOptions {
                    user_id: Some("u1".to_string()),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(results.len(), 2);
        // Sorted by importance descending
        assert!(results[0].item.importance >= results[1].item.importance);
    }

    #[tokio::test]
    async fn test_retrieve_disabled_tier_errors_on_store() {
        let mut manager = MemoryManager::builder(MemoryConfig::default())
            .tiers(true, false, false)
            .build()
            .await
            .unwrap();

        let result = manager
            .store(
                "anything",
                "u1",
                StoreOptions {
                    memory_type: Some(MemoryType::Episodic),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(MemoryError::TierDisabled { .. })));
    }

    #[tokio::test]
    async fn test_consolidate_promotes_important_items() {
        let mut manager = manager().await;
        manager
            .store(
                "crucial working note",
                "u1",
                StoreOptions {
                    memory_type: Some(MemoryType::Working),
                    importance: Some(0.8),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        manager
            .store(
                "trivial working note",
                "u1",
                StoreOptions {
                    memory_type: Some(MemoryType::Working),
                    importance: Some(0.3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let moved = manager
            .consolidate(MemoryType::Working, MemoryType::Episodic, 0.7)
            .await
            .unwrap();
        assert_eq!(moved, 1);

        let stats = manager.stats();
        assert_eq!(stats[&MemoryType::Working].count, 1);
        assert_eq!(stats[&MemoryType::Episodic].count, 1);

        let promoted = manager.episodic().get_all()[0].clone();
        assert_eq!(promoted.content, "crucial working note");
        assert!((promoted.importance - 0.88).abs() < 1e-5);
        assert_eq!(promoted.metadata["consolidatedFrom"], "working");
    }

    #[tokio::test]
    async fn test_consolidate_caps_importance() {
        let mut manager = manager().await;
        manager
            .store(
                "maximum importance note",
                "u1",
                StoreOptions {
                    memory_type: Some(MemoryType::Working),
                    importance: Some(0.99),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        manager
            .consolidate(MemoryType::Working, MemoryType::Semantic, 0.5)
            .await
            .unwrap();

        let promoted = manager.semantic().get_all()[0].clone();
        assert_eq!(promoted.importance, 1.0);
    }

    #[tokio::test]
    async fn test_forget_delegates() {
        let mut manager = manager().await;
        manager
            .store(
                "weak episodic trace happened",
                "u1",
                StoreOptions {
                    importance: Some(0.1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let dropped = manager
            .forget(MemoryType::Episodic, ForgetPolicy::ImportanceBased(0.5))
            .await
            .unwrap();
        assert_eq!(dropped, 1);
    }

    #[tokio::test]
    async fn test_graph_passthrough_and_close() {
        let mut manager = manager().await;
        assert!(manager.add_entity(&Entity::new("ml", "ML", "Concept")).await);
        assert!(manager.add_entity(&Entity::new("ai", "AI", "Concept")).await);
        assert!(
            manager
                .add_relation(&Relation::new("ml", "ai", "SUBSET_OF"))
                .await
        );

        let related = manager.find_related_entities("ml", 2, 10).await;
        assert_eq!(related.len(), 1);

        let found = manager.search_entities("ml", None, 10).await;
        assert_eq!(found.len(), 1);

        manager.close().await;
    }
}
