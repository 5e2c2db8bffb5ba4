//! Tool registry for discovery and dispatch
//!
//! TigerStyle: Centralized tool management with explicit lifecycle.
//!
//! The registry holds two kinds of entries: [`Tool`] instances and plain
//! functions (a function is equivalent to a tool with a single
//! `input: string` parameter). Registering a duplicate name overwrites the
//! previous entry and emits a warning.

use crate::error::{ToolError, ToolResult};
use crate::traits::{function_schema, ExpandableTool, Tool, ToolParameter};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A plain function registered as a tool
pub type ToolFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

struct FunctionEntry {
    description: String,
    func: ToolFn,
}

enum Entry {
    Tool(Arc<dyn Tool>),
    Function(FunctionEntry),
}

/// A resolved registry entry
#[derive(Clone)]
pub enum RegistryEntry {
    /// A full tool instance
    Tool(Arc<dyn Tool>),
    /// A plain function (single `input: string` parameter)
    Function(ToolFn),
}

/// Tool registry for managing available tools
pub struct ToolRegistry {
    /// Registered entries, name-keyed; BTreeMap keeps listing order stable
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a tool instance
    ///
    /// A duplicate name overwrites the previous entry with a warning.
    pub async fn register<T: Tool + 'static>(&self, tool: T) {
        self.register_arc(Arc::new(tool)).await;
    }

    /// Register a shared tool instance
    pub async fn register_arc(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let mut entries = self.entries.write().await;

        if entries.contains_key(&name) {
            warn!(tool = %name, "Overwriting previously registered tool");
        } else {
            info!(tool = %name, "Registering tool");
        }
        entries.insert(name, Entry::Tool(tool));
    }

    /// Register every child of an expandable tool
    ///
    /// The expandable tool itself is not registered and cannot be invoked.
    pub async fn register_expandable<T: ExpandableTool>(&self, bundle: &T) {
        let children = bundle.expand();
        debug!(bundle = %bundle.name(), children = children.len(), "Expanding tool bundle");
        for child in children {
            self.register_arc(child).await;
        }
    }

    /// Register a plain function as a tool
    pub async fn register_function(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        func: ToolFn,
    ) {
        let name = name.into();
        let mut entries = self.entries.write().await;

        if entries.contains_key(&name) {
            warn!(tool = %name, "Overwriting previously registered function tool");
        } else {
            info!(tool = %name, "Registering function tool");
        }
        entries.insert(
            name,
            Entry::Function(FunctionEntry {
                description: description.into(),
                func,
            }),
        );
    }

    /// Unregister an entry by name
    pub async fn unregister(&self, name: &str) -> bool {
        let mut entries = self.entries.write().await;
        entries.remove(name).is_some()
    }

    /// Resolve an entry by name
    pub async fn get(&self, name: &str) -> Option<RegistryEntry> {
        let entries = self.entries.read().await;
        entries.get(name).map(|entry| match entry {
            Entry::Tool(tool) => RegistryEntry::Tool(Arc::clone(tool)),
            Entry::Function(f) => RegistryEntry::Function(Arc::clone(&f.func)),
        })
    }

    /// Check if a name is registered
    pub async fn contains(&self, name: &str) -> bool {
        let entries = self.entries.read().await;
        entries.contains_key(name)
    }

    /// List all registered names
    pub async fn list(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        entries.keys().cloned().collect()
    }

    /// Number of registered entries
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Multi-line natural-language summary of all tools
    ///
    /// Used to augment system prompts in text-protocol mode.
    pub async fn describe(&self) -> String {
        let entries = self.entries.read().await;
        if entries.is_empty() {
            return "(no tools registered)".to_string();
        }

        let mut lines = Vec::with_capacity(entries.len());
        for (name, entry) in entries.iter() {
            let description = match entry {
                Entry::Tool(tool) => tool.description().to_string(),
                Entry::Function(f) => f.description.clone(),
            };
            lines.push(format!("- {}: {}", name, description));
        }
        lines.join("\n")
    }

    /// Function-calling schemas for every entry
    pub async fn schemas(&self) -> Vec<Value> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|(name, entry)| match entry {
                Entry::Tool(tool) => {
                    function_schema(name, tool.description(), &tool.parameters())
                }
                Entry::Function(f) => function_schema(
                    name,
                    &f.description,
                    &[ToolParameter::string("input", "Tool input")],
                ),
            })
            .collect()
    }

    /// Dispatch a call by name, propagating tool failures as errors
    ///
    /// Used by the executor, which needs to distinguish success from failure.
    pub async fn try_execute(&self, name: &str, args: &Map<String, Value>) -> ToolResult<String> {
        // Resolve under the lock, execute after releasing it
        match self.get(name).await {
            Some(RegistryEntry::Tool(tool)) => {
                debug!(tool = %name, "Executing tool");
                tool.run(args).await
            }
            Some(RegistryEntry::Function(func)) => {
                debug!(tool = %name, "Executing function tool");
                let input = args
                    .get("input")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| Value::Object(args.clone()).to_string());
                Ok(func(&input))
            }
            None => Err(ToolError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Dispatch a call by name, converting any failure to text
    ///
    /// The model must be able to see and react to tool failures, so this
    /// never propagates an error.
    pub async fn execute(&self, name: &str, args: &Map<String, Value>) -> String {
        match self.try_execute(name, args).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool execution failed");
                format!("错误: {}", e)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes input back"
        }

        fn parameters(&self) -> Vec<ToolParameter> {
            vec![ToolParameter::string("input", "Message to echo")]
        }

        async fn run(&self, args: &Map<String, Value>) -> ToolResult<String> {
            Ok(args
                .get("input")
                .and_then(|v| v.as_str())
                .unwrap_or("no input")
                .to_string())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        fn parameters(&self) -> Vec<ToolParameter> {
            vec![]
        }

        async fn run(&self, _args: &Map<String, Value>) -> ToolResult<String> {
            Err(ToolError::execution_failed("failing", "intentional"))
        }
    }

    struct Bundle;

    impl ExpandableTool for Bundle {
        fn name(&self) -> &str {
            "bundle"
        }

        fn expand(&self) -> Vec<Arc<dyn Tool>> {
            vec![Arc::new(EchoTool), Arc::new(FailingTool)]
        }
    }

    fn args(input: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("input".to_string(), Value::String(input.to_string()));
        map
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let registry = ToolRegistry::new();
        registry.register(EchoTool).await;

        assert!(registry.contains("echo").await);
        assert_eq!(registry.execute("echo", &args("hello")).await, "hello");
    }

    #[tokio::test]
    async fn test_get_resolves_both_entry_kinds() {
        let registry = ToolRegistry::new();
        registry.register(EchoTool).await;
        registry
            .register_function("upper", "Uppercases input", Arc::new(|input: &str| input.to_uppercase()))
            .await;

        assert!(matches!(
            registry.get("echo").await,
            Some(RegistryEntry::Tool(_))
        ));
        assert!(matches!(
            registry.get("upper").await,
            Some(RegistryEntry::Function(_))
        ));
        assert!(registry.get("absent").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_overwrites() {
        let registry = ToolRegistry::new();
        registry.register(EchoTool).await;
        registry.register(EchoTool).await;

        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_function_tool() {
        let registry = ToolRegistry::new();
        registry
            .register_function("shout", "Uppercases input", Arc::new(|input: &str| input.to_uppercase()))
            .await;

        assert_eq!(registry.execute("shout", &args("hey")).await, "HEY");

        let schemas = registry.schemas().await;
        assert_eq!(schemas.len(), 1);
        assert_eq!(
            schemas[0]["function"]["parameters"]["properties"]["input"]["type"],
            "string"
        );
    }

    #[tokio::test]
    async fn test_expandable_registers_children_only() {
        let registry = ToolRegistry::new();
        registry.register_expandable(&Bundle).await;

        assert!(registry.contains("echo").await);
        assert!(registry.contains("failing").await);
        assert!(!registry.contains("bundle").await);
    }

    #[tokio::test]
    async fn test_execute_unknown_returns_text_error() {
        let registry = ToolRegistry::new();
        let output = registry.execute("nonexistent", &Map::new()).await;
        assert!(output.starts_with("错误: "));
        assert!(output.contains("nonexistent"));
    }

    #[tokio::test]
    async fn test_execute_failure_returns_text_error() {
        let registry = ToolRegistry::new();
        registry.register(FailingTool).await;

        let output = registry.execute("failing", &Map::new()).await;
        assert!(output.starts_with("错误: "));
        assert!(output.contains("intentional"));
    }

    #[tokio::test]
    async fn test_describe() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.describe().await, "(no tools registered)");

        registry.register(EchoTool).await;
        let description = registry.describe().await;
        assert!(description.contains("- echo: Echoes input back"));
    }
}
