//! Vector store adapter
//!
//! TigerStyle: Explicit durable writes, equality filters, graceful reads.
//!
//! The payload carried by every point is the canonical restart-safe
//! projection of the corresponding memory item: in-process maps are caches
//! that can always be rebuilt from payloads on read.
//!
//! Two implementations: [`QdrantStore`] over the Qdrant REST API and
//! [`MemoryVectorStore`] for tests and offline runs.

use crate::error::{MemoryError, MemoryResult};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Minimum similarity for a vector hit to count as relevant
pub const SIMILARITY_MIN_DEFAULT: f32 = 0.1;

/// Distance metric for a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    /// Cosine similarity (default)
    Cosine,
    /// Dot product
    Dot,
    /// Euclidean distance
    Euclid,
}

impl Distance {
    /// Qdrant wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "Cosine",
            Distance::Dot => "Dot",
            Distance::Euclid => "Euclid",
        }
    }

    /// Parse a `QDRANT_DISTANCE` value
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "cosine" => Some(Distance::Cosine),
            "dot" => Some(Distance::Dot),
            "euclid" => Some(Distance::Euclid),
            _ => None,
        }
    }
}

/// Payload index kind for common filter fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadIndexKind {
    /// String equality
    Keyword,
    /// Float range/equality
    Float,
    /// Integer range/equality
    Integer,
}

impl PayloadIndexKind {
    /// Qdrant wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadIndexKind::Keyword => "keyword",
            PayloadIndexKind::Float => "float",
            PayloadIndexKind::Integer => "integer",
        }
    }
}

/// A point: explicit id, vector and payload
#[derive(Debug, Clone)]
pub struct VectorPoint {
    /// Caller-assigned id (preserved by upsert)
    pub id: String,
    /// Embedding vector
    pub vector: Vec<f32>,
    /// Open payload mapping
    pub payload: Map<String, Value>,
}

/// A search hit
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Point id
    pub id: String,
    /// Similarity score
    pub score: f32,
    /// Stored payload
    pub payload: Map<String, Value>,
}

/// AND-composed equality filter over payload fields
#[derive(Debug, Clone, Default)]
pub struct Filter {
    /// Field, value pairs that must all match
    pub must: Vec<(String, Value)>,
}

impl Filter {
    /// Empty filter (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality condition
    pub fn must_match(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.must.push((field.into(), value.into()));
        self
    }

    /// Whether a payload satisfies every condition
    pub fn matches(&self, payload: &Map<String, Value>) -> bool {
        self.must
            .iter()
            .all(|(field, value)| payload.get(field) == Some(value))
    }
}

/// OR-of-equalities filter over a single field, used for deletes
#[derive(Debug, Clone)]
pub struct AnyOfFilter {
    /// Field to test
    pub field: String,
    /// Accepted values
    pub any_of: Vec<Value>,
}

/// Collection info
#[derive(Debug, Clone, Default)]
pub struct CollectionInfo {
    /// Number of stored points
    pub points_count: usize,
}

/// Vector store contract
///
/// All writes are durable before returning.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if absent, with a fixed distance metric
    async fn ensure_collection(
        &self,
        collection: &str,
        dimension: usize,
        distance: Distance,
    ) -> MemoryResult<()>;

    /// Create a payload index for a common filter field
    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        kind: PayloadIndexKind,
    ) -> MemoryResult<()>;

    /// Insert or replace points, preserving caller ids
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> MemoryResult<()>;

    /// Filtered ANN search
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
        filter: Option<&Filter>,
    ) -> MemoryResult<Vec<SearchHit>>;

    /// Delete points by id
    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> MemoryResult<()>;

    /// Delete points matching any of the values in one field
    async fn delete_by_filter(&self, collection: &str, filter: &AnyOfFilter) -> MemoryResult<()>;

    /// Delete every point in the collection
    async fn clear(&self, collection: &str) -> MemoryResult<()>;

    /// Collection info
    async fn info(&self, collection: &str) -> MemoryResult<CollectionInfo>;

    /// Liveness probe
    async fn health_check(&self) -> MemoryResult<()>;
}

// =============================================================================
// In-memory implementation
// =============================================================================

struct MemoryCollection {
    dimension: usize,
    distance: Distance,
    points: HashMap<String, (Vec<f32>, Map<String, Value>)>,
}

/// In-process vector store for tests and offline runs
///
/// Linear scan search with the same filter semantics as the Qdrant adapter.
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryVectorStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn score(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
        match distance {
            Distance::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    0.0
                } else {
                    dot / (norm_a * norm_b)
                }
            }
            Distance::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            // Map distance into a descending score so ordering is uniform
            Distance::Euclid => {
                let d: f32 = a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f32>()
                    .sqrt();
                1.0 / (1.0 + d)
            }
        }
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        dimension: usize,
        distance: Distance,
    ) -> MemoryResult<()> {
        assert!(dimension > 0, "collection dimension must be positive");
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_insert_with(|| MemoryCollection {
                dimension,
                distance,
                points: HashMap::new(),
            });
        Ok(())
    }

    async fn create_payload_index(
        &self,
        _collection: &str,
        _field: &str,
        _kind: PayloadIndexKind,
    ) -> MemoryResult<()> {
        // Linear scan needs no index; accepted for API parity.
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> MemoryResult<()> {
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| MemoryError::CollectionNotFound {
                collection: collection.to_string(),
            })?;

        for point in points {
            if point.vector.len() != data.dimension {
                return Err(MemoryError::vector_store(format!(
                    "dimension mismatch: expected {}, got {}",
                    data.dimension,
                    point.vector.len()
                )));
            }
            data.points.insert(point.id, (point.vector, point.payload));
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
        filter: Option<&Filter>,
    ) -> MemoryResult<Vec<SearchHit>> {
        let collections = self.collections.read().await;
        let data = collections
            .get(collection)
            .ok_or_else(|| MemoryError::CollectionNotFound {
                collection: collection.to_string(),
            })?;

        let mut hits: Vec<SearchHit> = data
            .points
            .iter()
            .filter(|(_, (_, payload))| filter.map(|f| f.matches(payload)).unwrap_or(true))
            .map(|(id, (stored, payload))| SearchHit {
                id: id.clone(),
                score: Self::score(data.distance, vector, stored),
                payload: payload.clone(),
            })
            .filter(|hit| score_threshold.map(|t| hit.score >= t).unwrap_or(true))
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> MemoryResult<()> {
        let mut collections = self.collections.write().await;
        if let Some(data) = collections.get_mut(collection) {
            for id in ids {
                data.points.remove(id);
            }
        }
        Ok(())
    }

    async fn delete_by_filter(&self, collection: &str, filter: &AnyOfFilter) -> MemoryResult<()> {
        let mut collections = self.collections.write().await;
        if let Some(data) = collections.get_mut(collection) {
            data.points.retain(|_, (_, payload)| {
                !filter
                    .any_of
                    .iter()
                    .any(|value| payload.get(&filter.field) == Some(value))
            });
        }
        Ok(())
    }

    async fn clear(&self, collection: &str) -> MemoryResult<()> {
        let mut collections = self.collections.write().await;
        if let Some(data) = collections.get_mut(collection) {
            data.points.clear();
        }
        Ok(())
    }

    async fn info(&self, collection: &str) -> MemoryResult<CollectionInfo> {
        let collections = self.collections.read().await;
        let data = collections
            .get(collection)
            .ok_or_else(|| MemoryError::CollectionNotFound {
                collection: collection.to_string(),
            })?;
        Ok(CollectionInfo {
            points_count: data.points.len(),
        })
    }

    async fn health_check(&self) -> MemoryResult<()> {
        Ok(())
    }
}

// =============================================================================
// Qdrant REST implementation
// =============================================================================

/// Qdrant connection configuration
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    /// Server URL (e.g. "http://localhost:6333")
    pub url: String,
    /// Optional API key
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl QdrantConfig {
    /// Load from `QDRANT_URL`, `QDRANT_API_KEY` and `QDRANT_TIMEOUT`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("QDRANT_URL") {
            config.url = url;
        }
        config.api_key = std::env::var("QDRANT_API_KEY").ok().filter(|k| !k.is_empty());
        if let Some(timeout) = std::env::var("QDRANT_TIMEOUT")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
        {
            config.timeout_secs = timeout;
        }
        config
    }
}

/// Vector store over the Qdrant REST API
pub struct QdrantStore {
    config: QdrantConfig,
    http: reqwest::Client,
}

impl QdrantStore {
    /// Create a client for the configured server
    pub fn new(config: QdrantConfig) -> MemoryResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MemoryError::vector_store(e.to_string()))?;
        Ok(Self { config, http })
    }

    /// Create a client from the environment
    pub fn from_env() -> MemoryResult<Self> {
        Self::new(QdrantConfig::from_env())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> MemoryResult<Value> {
        let response = self
            .apply_auth(request)
            .send()
            .await
            .map_err(|e| MemoryError::vector_store(format!("{}: {}", context, e)))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(MemoryError::vector_store(format!(
                "{}: HTTP {} {}",
                context, status, body
            )));
        }
        Ok(body)
    }

    fn filter_to_json(filter: &Filter) -> Value {
        let must: Vec<Value> = filter
            .must
            .iter()
            .map(|(field, value)| json!({ "key": field, "match": { "value": value } }))
            .collect();
        json!({ "must": must })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        dimension: usize,
        distance: Distance,
    ) -> MemoryResult<()> {
        assert!(dimension > 0, "collection dimension must be positive");

        let probe = self
            .apply_auth(self.http.get(self.endpoint(&format!("collections/{}", collection))))
            .send()
            .await
            .map_err(|e| MemoryError::vector_store(format!("probe collection: {}", e)))?;

        if probe.status().is_success() {
            debug!(collection = %collection, "Collection already exists");
            return Ok(());
        }

        let body = json!({
            "vectors": { "size": dimension, "distance": distance.as_str() }
        });
        self.send(
            self.http
                .put(self.endpoint(&format!("collections/{}", collection)))
                .json(&body),
            "create collection",
        )
        .await?;

        info!(collection = %collection, dimension, distance = distance.as_str(), "Created collection");
        Ok(())
    }

    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        kind: PayloadIndexKind,
    ) -> MemoryResult<()> {
        let body = json!({ "field_name": field, "field_schema": kind.as_str() });
        // Index creation is idempotent server-side; conflicts are benign.
        let result = self
            .send(
                self.http
                    .put(self.endpoint(&format!("collections/{}/index?wait=true", collection)))
                    .json(&body),
                "create payload index",
            )
            .await;
        if let Err(e) = result {
            debug!(collection = %collection, field = %field, error = %e, "Payload index not created");
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> MemoryResult<()> {
        if points.is_empty() {
            return Ok(());
        }

        let wire_points: Vec<Value> = points
            .into_iter()
            .map(|p| json!({ "id": p.id, "vector": p.vector, "payload": p.payload }))
            .collect();
        let body = json!({ "points": wire_points });

        self.send(
            self.http
                .put(self.endpoint(&format!("collections/{}/points?wait=true", collection)))
                .json(&body),
            "upsert points",
        )
        .await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
        filter: Option<&Filter>,
    ) -> MemoryResult<Vec<SearchHit>> {
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(threshold) = score_threshold {
            body["score_threshold"] = json!(threshold);
        }
        if let Some(filter) = filter {
            if !filter.must.is_empty() {
                body["filter"] = Self::filter_to_json(filter);
            }
        }

        let response = self
            .send(
                self.http
                    .post(self.endpoint(&format!("collections/{}/points/search", collection)))
                    .json(&body),
                "search points",
            )
            .await?;

        let hits = response["result"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .filter_map(|hit| {
                        let id = match &hit["id"] {
                            Value::String(s) => s.clone(),
                            Value::Number(n) => n.to_string(),
                            _ => return None,
                        };
                        let score = hit["score"].as_f64().unwrap_or(0.0) as f32;
                        let payload = hit["payload"].as_object().cloned().unwrap_or_default();
                        Some(SearchHit { id, score, payload })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(hits)
    }

    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> MemoryResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = json!({ "points": ids });
        self.send(
            self.http
                .post(self.endpoint(&format!(
                    "collections/{}/points/delete?wait=true",
                    collection
                )))
                .json(&body),
            "delete points",
        )
        .await?;
        Ok(())
    }

    async fn delete_by_filter(&self, collection: &str, filter: &AnyOfFilter) -> MemoryResult<()> {
        let should: Vec<Value> = filter
            .any_of
            .iter()
            .map(|value| json!({ "key": filter.field, "match": { "value": value } }))
            .collect();
        let body = json!({ "filter": { "should": should } });

        self.send(
            self.http
                .post(self.endpoint(&format!(
                    "collections/{}/points/delete?wait=true",
                    collection
                )))
                .json(&body),
            "delete by filter",
        )
        .await?;
        Ok(())
    }

    async fn clear(&self, collection: &str) -> MemoryResult<()> {
        let body = json!({ "filter": {} });
        self.send(
            self.http
                .post(self.endpoint(&format!(
                    "collections/{}/points/delete?wait=true",
                    collection
                )))
                .json(&body),
            "clear collection",
        )
        .await?;
        Ok(())
    }

    async fn info(&self, collection: &str) -> MemoryResult<CollectionInfo> {
        let response = self
            .send(
                self.http
                    .get(self.endpoint(&format!("collections/{}", collection))),
                "collection info",
            )
            .await?;

        let points_count = response["result"]["points_count"].as_u64().unwrap_or(0) as usize;
        Ok(CollectionInfo { points_count })
    }

    async fn health_check(&self) -> MemoryResult<()> {
        let response = self
            .apply_auth(self.http.get(self.endpoint("healthz")))
            .send()
            .await
            .map_err(|e| MemoryError::vector_store(format!("health check: {}", e)))?;
        if !response.status().is_success() {
            return Err(MemoryError::vector_store(format!(
                "health check: HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}
