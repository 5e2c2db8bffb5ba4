//! Search built-in
//!
//! TigerStyle: Injectable backend with an explicit mock fallback.
//!
//! The default implementation is a mock: it returns canned placeholder
//! strings keyed on keyword detection. Production deployments inject their
//! own backend.

use crate::error::ToolResult;
use crate::traits::{Tool, ToolParameter};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Injectable search function: query text in, result lines out
pub type SearchBackend =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = Vec<String>> + Send>> + Send + Sync>;

/// Web-search tool
///
/// Single parameter `input`; `query` is accepted as an alias so the legacy
/// text protocol's free-string binding works unchanged.
pub struct SearchTool {
    backend: Option<SearchBackend>,
}

impl SearchTool {
    /// Create the mock-backed search tool
    pub fn new() -> Self {
        Self { backend: None }
    }

    /// Create a search tool with an injected backend
    pub fn with_backend(backend: SearchBackend) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Canned placeholder results keyed on keyword detection
    fn mock_results(query: &str) -> Vec<String> {
        let lower = query.to_lowercase();
        if lower.contains("weather") || lower.contains("天气") {
            vec![
                "Weather services report partly cloudy skies with a high of 22°C.".to_string(),
                "No severe weather warnings are in effect for the region.".to_string(),
            ]
        } else if lower.contains("rust") {
            vec![
                "Rust is a systems programming language focused on safety and performance."
                    .to_string(),
                "The Rust book is available at doc.rust-lang.org/book.".to_string(),
            ]
        } else if lower.contains("news") || lower.contains("新闻") {
            vec!["Top headlines are unavailable in offline mode.".to_string()]
        } else {
            vec![format!(
                "No live search backend configured; placeholder result for \"{}\"",
                query
            )]
        }
    }
}

impl Default for SearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Searches the web and returns short text snippets for a query"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::string("input", "The search query")]
    }

    async fn run(&self, args: &Map<String, Value>) -> ToolResult<String> {
        let query = args
            .get("input")
            .or_else(|| args.get("query"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let results = match &self.backend {
            Some(backend) => backend(query).await,
            None => Self::mock_results(&query),
        };

        Ok(results.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(key: &str, value: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(key.to_string(), json!(value));
        map
    }

    #[tokio::test]
    async fn test_mock_keyword_detection() {
        let tool = SearchTool::new();
        let output = tool.run(&args("input", "rust borrow checker")).await.unwrap();
        assert!(output.contains("systems programming"));
    }

    #[tokio::test]
    async fn test_query_alias() {
        let tool = SearchTool::new();
        let output = tool.run(&args("query", "anything else")).await.unwrap();
        assert!(output.contains("placeholder result"));
    }

    #[tokio::test]
    async fn test_injected_backend() {
        let backend: SearchBackend = Arc::new(|query: String| {
            Box::pin(async move { vec![format!("hit for {}", query)] })
        });
        let tool = SearchTool::with_backend(backend);

        let output = tool.run(&args("input", "q1")).await.unwrap();
        assert_eq!(output, "hit for q1");
    }
}
