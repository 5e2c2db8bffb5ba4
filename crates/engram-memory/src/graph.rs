//! Graph store adapter
//!
//! TigerStyle: Idempotent upserts, bounded traversal, explicit lifecycle.
//!
//! Entities are nodes; relations are directed typed edges, unique per
//! `(from, to, type)` with property-merge on repeated upserts. Traversal is
//! undirected breadth-first, bounded by depth, and excludes the start node.
//!
//! [`MemoryGraphStore`] is the embedded petgraph-backed implementation; the
//! `neo4j` feature adds [`neo4j::Neo4jStore`] over an external server.

use crate::error::{MemoryError, MemoryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;
use tracing::debug;

#[cfg(feature = "neo4j")]
pub mod neo4j;

/// Default traversal depth bound
pub const TRAVERSAL_DEPTH_MAX_DEFAULT: usize = 2;

/// A graph entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique entity id
    pub entity_id: String,
    /// Display name; `(name, entity_type)` is expected but not enforced unique
    pub name: String,
    /// Entity type tag (e.g. "Concept", "Person")
    pub entity_type: String,
    /// Open property mapping
    pub properties: Map<String, Value>,
    /// Mention count, bumped on repeated upserts
    pub frequency: u64,
    /// First upsert time
    pub created_at: DateTime<Utc>,
    /// Last upsert time
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Create an entity
    pub fn new(
        entity_id: impl Into<String>,
        name: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id: entity_id.into(),
            name: name.into(),
            entity_type: entity_type.into(),
            properties: Map::new(),
            frequency: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A directed typed relation between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Source entity id
    pub from_entity: String,
    /// Target entity id
    pub to_entity: String,
    /// Relation type (e.g. "SUBSET_OF")
    pub relation_type: String,
    /// Open property mapping
    pub properties: Map<String, Value>,
}

impl Relation {
    /// Create a relation
    pub fn new(
        from_entity: impl Into<String>,
        to_entity: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            from_entity: from_entity.into(),
            to_entity: to_entity.into(),
            relation_type: relation_type.into(),
            properties: Map::new(),
        }
    }

    /// Attach a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A traversal result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedEntity {
    /// The reached entity
    pub entity: Entity,
    /// Hop count from the start node
    pub distance: usize,
    /// Ordered relation types along the discovered path
    pub relationship_path: Vec<String>,
}

/// Graph store contract
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Insert or update an entity; repeated calls merge properties
    async fn upsert_entity(&self, entity: &Entity) -> MemoryResult<()>;

    /// Insert or update a relation; `(from, to, type)` is unique and
    /// repeated calls merge properties
    async fn upsert_relation(&self, relation: &Relation) -> MemoryResult<()>;

    /// Fetch an entity by id
    async fn get_entity(&self, entity_id: &str) -> MemoryResult<Option<Entity>>;

    /// Undirected bounded traversal excluding the start node, ordered by
    /// distance
    async fn related_entities(
        &self,
        entity_id: &str,
        max_depth: usize,
        limit: usize,
    ) -> MemoryResult<Vec<RelatedEntity>>;

    /// Case-insensitive substring search over entity names
    async fn search_entities(
        &self,
        name_pattern: &str,
        entity_types: Option<&[String]>,
        limit: usize,
    ) -> MemoryResult<Vec<Entity>>;

    /// Remove an entity and its relations
    async fn remove_entity(&self, entity_id: &str) -> MemoryResult<bool>;

    /// Number of stored entities
    async fn entity_count(&self) -> MemoryResult<usize>;

    /// Drop all entities and relations
    async fn clear(&self) -> MemoryResult<()>;

    /// Release the backing driver
    async fn close(&self) -> MemoryResult<()>;
}

// =============================================================================
// Embedded petgraph implementation
// =============================================================================

#[derive(Debug, Clone)]
struct EdgeData {
    relation_type: String,
    properties: Map<String, Value>,
}

struct GraphInner {
    /// Nodes carry entity ids; edges carry typed relation data
    graph: DiGraph<String, EdgeData>,
    /// entity id → node index, for O(1) lookups
    node_index: HashMap<String, NodeIndex>,
    /// entity id → entity record
    entities: HashMap<String, Entity>,
}

/// In-process graph store backed by petgraph
pub struct MemoryGraphStore {
    inner: RwLock<GraphInner>,
}

impl MemoryGraphStore {
    /// Create an empty graph store
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(GraphInner {
                graph: DiGraph::new(),
                node_index: HashMap::new(),
                entities: HashMap::new(),
            }),
        }
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphInner {
    fn ensure_node(&mut self, entity_id: &str) -> NodeIndex {
        if let Some(&index) = self.node_index.get(entity_id) {
            return index;
        }
        let index = self.graph.add_node(entity_id.to_string());
        self.node_index.insert(entity_id.to_string(), index);
        index
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn upsert_entity(&self, entity: &Entity) -> MemoryResult<()> {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        inner.ensure_node(&entity.entity_id);

        match inner.entities.get_mut(&entity.entity_id) {
            Some(existing) => {
                existing.name = entity.name.clone();
                existing.entity_type = entity.entity_type.clone();
                for (key, value) in &entity.properties {
                    existing.properties.insert(key.clone(), value.clone());
                }
                existing.frequency = existing.frequency.saturating_add(1);
                existing.updated_at = Utc::now();
            }
            None => {
                inner
                    .entities
                    .insert(entity.entity_id.clone(), entity.clone());
            }
        }
        Ok(())
    }

    async fn upsert_relation(&self, relation: &Relation) -> MemoryResult<()> {
        let mut inner = self.inner.write().expect("graph lock poisoned");

        let from = *inner
            .node_index
            .get(&relation.from_entity)
            .ok_or_else(|| MemoryError::EntityNotFound {
                id: relation.from_entity.clone(),
            })?;
        let to = *inner
            .node_index
            .get(&relation.to_entity)
            .ok_or_else(|| MemoryError::EntityNotFound {
                id: relation.to_entity.clone(),
            })?;

        // (from, to, type) is unique: merge properties on a repeated upsert
        let existing = inner
            .graph
            .edges_connecting(from, to)
            .find(|edge| edge.weight().relation_type == relation.relation_type)
            .map(|edge| edge.id());

        match existing {
            Some(edge_id) => {
                let data = inner
                    .graph
                    .edge_weight_mut(edge_id)
                    .expect("edge id resolved from live edge");
                for (key, value) in &relation.properties {
                    data.properties.insert(key.clone(), value.clone());
                }
            }
            None => {
                inner.graph.add_edge(
                    from,
                    to,
                    EdgeData {
                        relation_type: relation.relation_type.clone(),
                        properties: relation.properties.clone(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn get_entity(&self, entity_id: &str) -> MemoryResult<Option<Entity>> {
        let inner = self.inner.read().expect("graph lock poisoned");
        Ok(inner.entities.get(entity_id).cloned())
    }

    async fn related_entities(
        &self,
        entity_id: &str,
        max_depth: usize,
        limit: usize,
    ) -> MemoryResult<Vec<RelatedEntity>> {
        let inner = self.inner.read().expect("graph lock poisoned");
        let Some(&start) = inner.node_index.get(entity_id) else {
            return Ok(Vec::new());
        };

        // Undirected BFS carrying the edge-type path; results come out in
        // distance order by construction.
        let mut results = Vec::new();
        let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue: VecDeque<(NodeIndex, usize, Vec<String>)> =
            VecDeque::from([(start, 0, Vec::new())]);

        while let Some((node, depth, path)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }

            let mut neighbors: Vec<(NodeIndex, String)> = Vec::new();
            for edge in inner.graph.edges_directed(node, Direction::Outgoing) {
                neighbors.push((edge.target(), edge.weight().relation_type.clone()));
            }
            for edge in inner.graph.edges_directed(node, Direction::Incoming) {
                neighbors.push((edge.source(), edge.weight().relation_type.clone()));
            }

            for (neighbor, relation_type) in neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }
                let entity_id = &inner.graph[neighbor];
                let Some(entity) = inner.entities.get(entity_id) else {
                    continue;
                };

                let mut next_path = path.clone();
                next_path.push(relation_type);

                results.push(RelatedEntity {
                    entity: entity.clone(),
                    distance: depth + 1,
                    relationship_path: next_path.clone(),
                });
                if results.len() >= limit {
                    return Ok(results);
                }
                queue.push_back((neighbor, depth + 1, next_path));
            }
        }

        debug!(start = %entity_id, found = results.len(), "Graph traversal complete");
        Ok(results)
    }

    async fn search_entities(
        &self,
        name_pattern: &str,
        entity_types: Option<&[String]>,
        limit: usize,
    ) -> MemoryResult<Vec<Entity>> {
        let inner = self.inner.read().expect("graph lock poisoned");
        let pattern = name_pattern.to_lowercase();

        let mut matches: Vec<Entity> = inner
            .entities
            .values()
            .filter(|entity| entity.name.to_lowercase().contains(&pattern))
            .filter(|entity| {
                entity_types
                    .map(|types| types.iter().any(|t| t == &entity.entity_type))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        matches.sort_by(|a, b| a.name.cmp(&b.name));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn remove_entity(&self, entity_id: &str) -> MemoryResult<bool> {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        let Some(index) = inner.node_index.remove(entity_id) else {
            return Ok(false);
        };

        inner.entities.remove(entity_id);
        // remove_node swaps the last node into `index`; re-home its mapping
        inner.graph.remove_node(index);
        if let Some(moved_id) = inner.graph.node_weight(index).cloned() {
            inner.node_index.insert(moved_id, index);
        }
        Ok(true)
    }

    async fn entity_count(&self) -> MemoryResult<usize> {
        let inner = self.inner.read().expect("graph lock poisoned");
        Ok(inner.entities.len())
    }

    async fn clear(&self) -> MemoryResult<()> {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        inner.graph.clear();
        inner.node_index.clear();
        inner.entities.clear();
        Ok(())
    }

    async fn close(&self) -> MemoryResult<()> {
        // No external driver to release
        Ok(())
    }
}
