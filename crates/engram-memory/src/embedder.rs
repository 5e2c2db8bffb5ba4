//! Embedding generation for semantic retrieval
//!
//! TigerStyle: Trait-based embedder with explicit dimension constraints.
//!
//! Backends, selected by `EMBED_MODEL_TYPE`:
//! - `openai` / `dashscope` — OpenAI-compatible `/embeddings` endpoint
//! - `simple` — deterministic hash-based offline fallback
//!
//! [`CachedEmbedder`] memoizes text → vector so repeated writes of the same
//! content do not re-embed.

use crate::error::{MemoryError, MemoryResult};
use crate::types::EMBEDDING_DIM_DEFAULT;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Trait for generating text embeddings
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimension of embeddings produced by this embedder
    fn dimension(&self) -> usize;

    /// Model name/identifier
    fn model_name(&self) -> &str;

    /// Embed a single text string
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>>;

    /// Embed multiple texts
    async fn embed_batch(&self, texts: &[&str]) -> MemoryResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }
}

// =============================================================================
// Offline hash embedder
// =============================================================================

/// Deterministic offline embedder
///
/// Buckets word hashes into a fixed-dimension vector and L2-normalizes.
/// Equal texts map to equal vectors; overlapping vocabularies land near each
/// other. Not a semantic model — it is the offline `simple` fallback and the
/// test embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Create a hash embedder with the given dimension
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "embedding dimension must be positive");
        Self { dimension }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM_DEFAULT)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "simple-hash"
    }

    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];

        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let hash = hasher.finish();
            let index = (hash % self.dimension as u64) as usize;
            vector[index] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }

        Ok(vector)
    }
}

// =============================================================================
// HTTP embedder (OpenAI-compatible)
// =============================================================================

/// Configuration for the HTTP embedding backend
#[derive(Debug, Clone)]
pub struct EmbedConfig {
    /// Model name (e.g. "text-embedding-3-small", "text-embedding-v2")
    pub model: String,
    /// API key
    pub api_key: String,
    /// Base URL without the `/embeddings` suffix
    pub base_url: String,
    /// Output dimension
    pub dimension: usize,
}

/// Default DashScope OpenAI-compatible endpoint
pub const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// Default OpenAI endpoint
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Embedder over an OpenAI-compatible `/embeddings` endpoint
pub struct HttpEmbedder {
    config: EmbedConfig,
    http: reqwest::Client,
}

impl HttpEmbedder {
    /// Create an HTTP embedder
    pub fn new(config: EmbedConfig) -> MemoryResult<Self> {
        if config.model.trim().is_empty() {
            return Err(MemoryError::InvalidConfiguration {
                field: "EMBED_MODEL_NAME".to_string(),
                reason: "model name must not be empty".to_string(),
            });
        }
        let http = reqwest::Client::new();
        Ok(Self { config, http })
    }

    async fn request(&self, texts: Vec<&str>) -> MemoryResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MemoryError::embedding(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MemoryError::embedding(format!(
                "API error {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| MemoryError::embedding(e.to_string()))?;

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        let mut vectors = self.request(vec![text]).await?;
        vectors
            .pop()
            .ok_or_else(|| MemoryError::embedding("no embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> MemoryResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts.to_vec()).await
    }
}

// =============================================================================
// Caching wrapper
// =============================================================================

/// Memoizing wrapper around any embedder
///
/// Keys the cache by content hash; repeated embeds of the same text hit the
/// cache.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<HashMap<u64, Vec<f32>>>,
}

impl CachedEmbedder {
    /// Wrap an embedder with a cache
    pub fn new(inner: Arc<dyn Embedder>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(text: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        hasher.finish()
    }

    /// Number of cached vectors
    pub async fn cached_count(&self) -> usize {
        self.cache.lock().await.len()
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        let key = Self::cache_key(text);
        {
            let cache = self.cache.lock().await;
            if let Some(vector) = cache.get(&key) {
                return Ok(vector.clone());
            }
        }

        let vector = self.inner.embed(text).await?;
        let mut cache = self.cache.lock().await;
        cache.insert(key, vector.clone());
        Ok(vector)
    }
}

// =============================================================================
// Backend selection
// =============================================================================

/// Build an embedder from `EMBED_MODEL_TYPE` and the `EMBED_*` keys
///
/// Unset or `simple` yields the offline hash embedder. Unknown values warn
/// and fall back to `simple` rather than failing a construction that has a
/// working offline path.
pub fn embedder_from_env() -> Arc<dyn Embedder> {
    let kind = std::env::var("EMBED_MODEL_TYPE").unwrap_or_else(|_| "simple".to_string());
    let dimension = std::env::var("EMBED_DIMENSIONS")
        .ok()
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(EMBEDDING_DIM_DEFAULT);

    let http_config = |default_base: &str, default_model: &str, key_var: &str| EmbedConfig {
        model: std::env::var("EMBED_MODEL_NAME").unwrap_or_else(|_| default_model.to_string()),
        api_key: std::env::var("EMBED_API_KEY")
            .or_else(|_| std::env::var(key_var))
            .unwrap_or_default(),
        base_url: std::env::var("EMBED_BASE_URL").unwrap_or_else(|_| default_base.to_string()),
        dimension,
    };

    match kind.to_ascii_lowercase().as_str() {
        "openai" => {
            let config = http_config(OPENAI_BASE_URL, "text-embedding-3-small", "OPENAI_API_KEY");
            match HttpEmbedder::new(config) {
                Ok(embedder) => Arc::new(CachedEmbedder::new(Arc::new(embedder))),
                Err(e) => {
                    tracing::warn!(error = %e, "OpenAI embedder unavailable, using simple fallback");
                    Arc::new(HashEmbedder::new(dimension))
                }
            }
        }
        "dashscope" => {
            let config = http_config(DASHSCOPE_BASE_URL, "text-embedding-v2", "DASHSCOPE_API_KEY");
            match HttpEmbedder::new(config) {
                Ok(embedder) => Arc::new(CachedEmbedder::new(Arc::new(embedder))),
                Err(e) => {
                    tracing::warn!(error = %e, "DashScope embedder unavailable, using simple fallback");
                    Arc::new(HashEmbedder::new(dimension))
                }
            }
        }
        "simple" => Arc::new(HashEmbedder::new(dimension)),
        other => {
            tracing::warn!(kind = %other, "Unknown EMBED_MODEL_TYPE, using simple fallback");
            Arc::new(HashEmbedder::new(dimension))
        }
    }
}
