//! Neo4j graph backend
//!
//! TigerStyle: Session per logical operation over a long-lived driver,
//! released on `close()`.
//!
//! Relation types become Neo4j relationship types, so they are sanitized to
//! `[A-Za-z0-9_]` before being interpolated into Cypher (parameters cannot
//! name a relationship type). Open property maps travel as a JSON string in
//! the `properties` field and are merged client-side.

use super::{Entity, GraphStore, Relation, RelatedEntity};
use crate::error::{MemoryError, MemoryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, ConfigBuilder, Graph, Node};
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Neo4j connection configuration
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    /// Bolt URI (e.g. "bolt://localhost:7687")
    pub uri: String,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
    /// Database name
    pub database: String,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            username: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
        }
    }
}

impl Neo4jConfig {
    /// Load from `NEO4J_URI`, `NEO4J_USERNAME`, `NEO4J_PASSWORD` and
    /// `NEO4J_DATABASE`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            uri: std::env::var("NEO4J_URI").unwrap_or(defaults.uri),
            username: std::env::var("NEO4J_USERNAME").unwrap_or(defaults.username),
            password: std::env::var("NEO4J_PASSWORD").unwrap_or(defaults.password),
            database: std::env::var("NEO4J_DATABASE").unwrap_or(defaults.database),
        }
    }
}

/// Graph store over a Neo4j server
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Connect to the configured server and verify the session
    pub async fn connect(config: Neo4jConfig) -> MemoryResult<Self> {
        let driver_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.username)
            .password(&config.password)
            .db(config.database.as_str())
            .build()
            .map_err(|e| MemoryError::graph_store(e.to_string()))?;

        let graph = Graph::connect(driver_config)
            .await
            .map_err(|e| MemoryError::graph_store(e.to_string()))?;

        // Probe the connection so configuration failures are loud
        graph
            .run(query("RETURN 1"))
            .await
            .map_err(|e| MemoryError::graph_store(e.to_string()))?;

        info!(uri = %config.uri, database = %config.database, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Connect using the `NEO4J_*` environment keys
    pub async fn from_env() -> MemoryResult<Self> {
        Self::connect(Neo4jConfig::from_env()).await
    }

    /// Keep only characters valid in a relationship type
    fn sanitize_relation_type(relation_type: &str) -> String {
        let sanitized: String = relation_type
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        assert!(
            !sanitized.is_empty(),
            "relation type must contain at least one valid character"
        );
        sanitized
    }

    fn node_to_entity(node: &Node) -> MemoryResult<Entity> {
        let err = |e: neo4rs::DeError| MemoryError::graph_store(e.to_string());

        let properties_raw: String = node.get("properties").unwrap_or_default();
        let properties: Map<String, Value> =
            serde_json::from_str(&properties_raw).unwrap_or_default();

        let parse_time = |raw: String| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now())
        };

        Ok(Entity {
            entity_id: node.get("id").map_err(err)?,
            name: node.get("name").map_err(err)?,
            entity_type: node.get::<String>("entity_type").unwrap_or_default(),
            properties,
            frequency: node.get::<i64>("frequency").unwrap_or(1).max(0) as u64,
            created_at: parse_time(node.get::<String>("created_at").unwrap_or_default()),
            updated_at: parse_time(node.get::<String>("updated_at").unwrap_or_default()),
        })
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn upsert_entity(&self, entity: &Entity) -> MemoryResult<()> {
        // Merge properties client-side so the JSON blob accumulates
        let merged_properties = match self.get_entity(&entity.entity_id).await? {
            Some(existing) => {
                let mut merged = existing.properties;
                for (key, value) in &entity.properties {
                    merged.insert(key.clone(), value.clone());
                }
                merged
            }
            None => entity.properties.clone(),
        };

        let now = Utc::now().to_rfc3339();
        self.graph
            .run(
                query(
                    "MERGE (e:Entity {id: $id}) \
                     ON CREATE SET e.created_at = $now, e.frequency = 1 \
                     ON MATCH SET e.frequency = coalesce(e.frequency, 0) + 1 \
                     SET e.name = $name, e.entity_type = $entity_type, \
                         e.updated_at = $now, e.properties = $properties",
                )
                .param("id", entity.entity_id.as_str())
                .param("name", entity.name.as_str())
                .param("entity_type", entity.entity_type.as_str())
                .param("now", now.as_str())
                .param(
                    "properties",
                    serde_json::to_string(&merged_properties)?.as_str(),
                ),
            )
            .await
            .map_err(|e| MemoryError::graph_store(e.to_string()))
    }

    async fn upsert_relation(&self, relation: &Relation) -> MemoryResult<()> {
        let relation_type = Self::sanitize_relation_type(&relation.relation_type);
        let cypher = format!(
            "MATCH (a:Entity {{id: $from}}) \
             MATCH (b:Entity {{id: $to}}) \
             MERGE (a)-[r:{}]->(b) \
             SET r.properties = $properties",
            relation_type
        );

        self.graph
            .run(
                query(&cypher)
                    .param("from", relation.from_entity.as_str())
                    .param("to", relation.to_entity.as_str())
                    .param(
                        "properties",
                        serde_json::to_string(&relation.properties)?.as_str(),
                    ),
            )
            .await
            .map_err(|e| MemoryError::graph_store(e.to_string()))
    }

    async fn get_entity(&self, entity_id: &str) -> MemoryResult<Option<Entity>> {
        let mut rows = self
            .graph
            .execute(query("MATCH (e:Entity {id: $id}) RETURN e").param("id", entity_id))
            .await
            .map_err(|e| MemoryError::graph_store(e.to_string()))?;

        let row = rows
            .next()
            .await
            .map_err(|e| MemoryError::graph_store(e.to_string()))?;

        match row {
            Some(row) => {
                let node: Node = row
                    .get("e")
                    .map_err(|e| MemoryError::graph_store(e.to_string()))?;
                Ok(Some(Self::node_to_entity(&node)?))
            }
            None => Ok(None),
        }
    }

    async fn related_entities(
        &self,
        entity_id: &str,
        max_depth: usize,
        limit: usize,
    ) -> MemoryResult<Vec<RelatedEntity>> {
        assert!(max_depth > 0, "traversal depth must be positive");

        let cypher = format!(
            "MATCH path = (start:Entity {{id: $id}})-[*1..{}]-(other:Entity) \
             WHERE other.id <> $id \
             WITH other, path, length(path) AS distance \
             ORDER BY distance \
             WITH other, collect(path)[0] AS shortest, min(distance) AS distance \
             RETURN other, distance, [r IN relationships(shortest) | type(r)] AS rel_types \
             ORDER BY distance \
             LIMIT {}",
            max_depth, limit
        );

        let mut rows = self
            .graph
            .execute(query(&cypher).param("id", entity_id))
            .await
            .map_err(|e| MemoryError::graph_store(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| MemoryError::graph_store(e.to_string()))?
        {
            let node: Node = row
                .get("other")
                .map_err(|e| MemoryError::graph_store(e.to_string()))?;
            let distance: i64 = row
                .get("distance")
                .map_err(|e| MemoryError::graph_store(e.to_string()))?;
            let relationship_path: Vec<String> = row.get("rel_types").unwrap_or_default();

            results.push(RelatedEntity {
                entity: Self::node_to_entity(&node)?,
                distance: distance.max(0) as usize,
                relationship_path,
            });
        }
        Ok(results)
    }

    async fn search_entities(
        &self,
        name_pattern: &str,
        entity_types: Option<&[String]>,
        limit: usize,
    ) -> MemoryResult<Vec<Entity>> {
        let q = match entity_types {
            Some(types) => query(&format!(
                "MATCH (e:Entity) \
                 WHERE toLower(e.name) CONTAINS toLower($pattern) \
                   AND e.entity_type IN $types \
                 RETURN e ORDER BY e.name LIMIT {}",
                limit
            ))
            .param("pattern", name_pattern)
            .param("types", types.to_vec()),
            None => query(&format!(
                "MATCH (e:Entity) \
                 WHERE toLower(e.name) CONTAINS toLower($pattern) \
                 RETURN e ORDER BY e.name LIMIT {}",
                limit
            ))
            .param("pattern", name_pattern),
        };

        let mut rows = self
            .graph
            .execute(q)
            .await
            .map_err(|e| MemoryError::graph_store(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| MemoryError::graph_store(e.to_string()))?
        {
            let node: Node = row
                .get("e")
                .map_err(|e| MemoryError::graph_store(e.to_string()))?;
            results.push(Self::node_to_entity(&node)?);
        }
        Ok(results)
    }

    async fn remove_entity(&self, entity_id: &str) -> MemoryResult<bool> {
        let existed = self.get_entity(entity_id).await?.is_some();
        self.graph
            .run(query("MATCH (e:Entity {id: $id}) DETACH DELETE e").param("id", entity_id))
            .await
            .map_err(|e| MemoryError::graph_store(e.to_string()))?;
        Ok(existed)
    }

    async fn entity_count(&self) -> MemoryResult<usize> {
        let mut rows = self
            .graph
            .execute(query("MATCH (e:Entity) RETURN count(e) AS n"))
            .await
            .map_err(|e| MemoryError::graph_store(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| MemoryError::graph_store(e.to_string()))?
        {
            Some(row) => {
                let n: i64 = row
                    .get("n")
                    .map_err(|e| MemoryError::graph_store(e.to_string()))?;
                Ok(n.max(0) as usize)
            }
            None => Ok(0),
        }
    }

    async fn clear(&self) -> MemoryResult<()> {
        self.graph
            .run(query("MATCH (e:Entity) DETACH DELETE e"))
            .await
            .map_err(|e| MemoryError::graph_store(e.to_string()))
    }

    async fn close(&self) -> MemoryResult<()> {
        // The driver pool is dropped with the store; nothing to flush.
        warn!("Neo4j store closed; driver pool released on drop");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_relation_type() {
        assert_eq!(Neo4jStore::sanitize_relation_type("SUBSET_OF"), "SUBSET_OF");
        assert_eq!(Neo4jStore::sanitize_relation_type("works-at!"), "worksat");
    }

    #[test]
    fn test_config_defaults() {
        let config = Neo4jConfig::default();
        assert_eq!(config.uri, "bolt://localhost:7687");
        assert_eq!(config.database, "neo4j");
    }
}
