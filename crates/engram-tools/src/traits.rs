//! Tool traits and core abstractions
//!
//! TigerStyle: Explicit tool interface with typed parameters.
//!
//! A [`Tool`] exposes a stable name, a natural-language description, a typed
//! parameter list and an async `run`. An [`ExpandableTool`] publishes a flat
//! list of child tools at registration time and is never itself invocable.

use crate::error::ToolResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Tool parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// String value
    String,
    /// Floating point value
    Number,
    /// Integer value
    Integer,
    /// Boolean value
    Boolean,
    /// Array of values
    Array,
    /// Object/map of values
    Object,
}

impl ParamType {
    /// JSON-schema name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool parameter definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub param_type: ParamType,
    /// Description of the parameter
    pub description: String,
    /// Whether the parameter is required
    pub required: bool,
    /// Default value (if any)
    pub default: Option<Value>,
}

impl ToolParameter {
    /// Create a new required string parameter
    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: ParamType::String,
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// Create a new required number parameter
    pub fn number(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            param_type: ParamType::Number,
            ..Self::string(name, description)
        }
    }

    /// Create a new required integer parameter
    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            param_type: ParamType::Integer,
            ..Self::string(name, description)
        }
    }

    /// Create a new required boolean parameter
    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            param_type: ParamType::Boolean,
            ..Self::string(name, description)
        }
    }

    /// Create a new required array parameter
    pub fn array(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            param_type: ParamType::Array,
            ..Self::string(name, description)
        }
    }

    /// Make this parameter optional
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Set a default value (implies optional)
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self.required = false;
        self
    }

    /// Render this parameter as a JSON-schema property
    ///
    /// Array parameters default to `items.type = "string"`; a default value
    /// is surfaced in the description text.
    pub fn to_property(&self) -> Value {
        let description = match &self.default {
            Some(default) => format!("{} (default: {})", self.description, default),
            None => self.description.clone(),
        };

        let mut property = json!({
            "type": self.param_type.as_str(),
            "description": description,
        });
        if self.param_type == ParamType::Array {
            property["items"] = json!({ "type": "string" });
        }
        property
    }
}

/// Core trait for tools
///
/// Tools are named callable units exposed to the model. Implementations must
/// not panic across `run`; recoverable failures are returned as `Err` and the
/// registry converts them to text the model can see.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable tool name
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Typed parameter list
    fn parameters(&self) -> Vec<ToolParameter>;

    /// Execute the tool with the given arguments
    async fn run(&self, args: &Map<String, Value>) -> ToolResult<String>;
}

/// A tool that publishes child tools at registration time
///
/// The expandable tool itself is never invocable; each child is registered
/// as an independent tool.
pub trait ExpandableTool: Send + Sync {
    /// Name of the tool bundle (for logging only)
    fn name(&self) -> &str;

    /// Produce the flat list of child tools
    fn expand(&self) -> Vec<Arc<dyn Tool>>;
}

/// Render the function-calling schema for a tool
///
/// Shape: `{type:"function", function:{name, description, parameters:{...}}}`
/// per the chat-completions contract.
pub fn function_schema(
    name: &str,
    description: &str,
    parameters: &[ToolParameter],
) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in parameters {
        properties.insert(param.name.clone(), param.to_property());
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_builders() {
        let param = ToolParameter::string("input", "Input text");
        assert_eq!(param.param_type, ParamType::String);
        assert!(param.required);

        let param = ToolParameter::integer("limit", "Max results").with_default(10);
        assert!(!param.required);
        assert_eq!(param.default, Some(json!(10)));
    }

    #[test]
    fn test_array_property_defaults_items_to_string() {
        let param = ToolParameter::array("tags", "Tags to match");
        let property = param.to_property();
        assert_eq!(property["items"]["type"], "string");
    }

    #[test]
    fn test_default_surfaces_in_description() {
        let param = ToolParameter::integer("limit", "Max results").with_default(10);
        let property = param.to_property();
        let description = property["description"].as_str().unwrap();
        assert!(description.contains("default: 10"));
    }

    #[test]
    fn test_function_schema_shape() {
        let params = vec![
            ToolParameter::string("query", "Search query"),
            ToolParameter::integer("limit", "Max results").optional(),
        ];
        let schema = function_schema("search", "Search the web", &params);

        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "search");
        assert_eq!(
            schema["function"]["parameters"]["properties"]["query"]["type"],
            "string"
        );
        let required = schema["function"]["parameters"]["required"]
            .as_array()
            .unwrap();
        assert_eq!(required.len(), 1);
        assert_eq!(required[0], "query");
    }
}
