//! Tool call executor
//!
//! TigerStyle: Total parsing functions, failures surfaced as data.
//!
//! The executor wraps a registry and a call counter. It parses tool-call
//! intents out of model output under two protocols and executes calls
//! without ever throwing across the boundary: failures become
//! `ToolCallResult { success: false }` so the model can see and react to
//! them.
//!
//! Protocols, tried in order:
//! 1. JSON blocks: `[[TOOL_CALL]] {"name":…,"arguments":{…}} [[/TOOL_CALL]]`.
//!    Invalid JSON inside a block is logged and skipped.
//! 2. Legacy text: `[TOOL_CALL:<name>:<params>]` where `<params>` is JSON,
//!    `k=v` pairs with primitive coercion, or a free-form string bound to
//!    the keys `input`, `query` and `expression`.
//!
//! If the JSON-block protocol yields any call, the legacy protocol is not
//! consulted.

use crate::registry::ToolRegistry;
use engram_core::llm::ChatResponse;
use engram_core::message::{Message, ToolCallRequest, ToolCallResult};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

const BLOCK_OPEN: &str = "[[TOOL_CALL]]";
const BLOCK_CLOSE: &str = "[[/TOOL_CALL]]";
const LEGACY_OPEN: &str = "[TOOL_CALL:";

/// Executes tool calls against a registry
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    /// Counter used to make text-protocol call ids unique in this process
    id_counter: AtomicU64,
    /// Total executed calls
    call_counter: AtomicU64,
}

impl ToolExecutor {
    /// Create an executor over the given registry
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            id_counter: AtomicU64::new(0),
            call_counter: AtomicU64::new(0),
        }
    }

    /// The wrapped registry
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Total calls issued through this executor
    pub fn call_count(&self) -> u64 {
        self.call_counter.load(Ordering::Relaxed)
    }

    /// Parse tool-call intents from a text response
    ///
    /// Total over any input: returns a (possibly empty) list and never fails.
    /// A malformed block never hides a later well-formed one.
    pub fn parse_tool_calls(&self, text: &str) -> Vec<ToolCallRequest> {
        let from_blocks = self.parse_json_blocks(text);
        if !from_blocks.is_empty() {
            return from_blocks;
        }
        self.parse_legacy(text)
    }

    /// Map a native function-calling response to requests
    ///
    /// Provider-issued ids are preserved for result correlation.
    pub fn parse_native_calls(&self, response: &ChatResponse) -> Vec<ToolCallRequest> {
        response.tool_calls.clone()
    }

    /// Execute one call
    pub async fn execute(&self, request: &ToolCallRequest) -> ToolCallResult {
        self.call_counter.fetch_add(1, Ordering::Relaxed);
        debug!(tool = %request.name, id = %request.id, "Executing tool call");

        match self.registry.try_execute(&request.name, &request.arguments).await {
            Ok(output) => ToolCallResult::ok(&request.id, &request.name, output),
            Err(e) => {
                warn!(tool = %request.name, id = %request.id, error = %e, "Tool call failed");
                ToolCallResult::failed(&request.id, &request.name, e.to_string())
            }
        }
    }

    /// Execute a batch sequentially, in order
    pub async fn execute_all(&self, requests: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.execute(request).await);
        }
        results
    }

    /// Format a result as a `tool` role message for native mode
    pub fn format_as_message(result: &ToolCallResult) -> Message {
        let content = if result.success {
            result.output.clone()
        } else {
            format!("错误: {}", result.error.as_deref().unwrap_or("unknown"))
        };
        Message::tool(&result.id, content)
    }

    /// Format a result as free text for the text protocol
    pub fn format_as_text(result: &ToolCallResult) -> String {
        if result.success {
            format!("[工具 {} 返回]: {}", result.name, result.output)
        } else {
            format!(
                "[工具 {} 执行失败]: {}",
                result.name,
                result.error.as_deref().unwrap_or("unknown")
            )
        }
    }

    /// Synthesize a call id unique within this process
    fn next_call_id(&self) -> String {
        let counter = self.id_counter.fetch_add(1, Ordering::Relaxed);
        format!("call_{}_{}", chrono::Utc::now().timestamp_millis(), counter)
    }

    // =========================================================================
    // JSON-block protocol
    // =========================================================================

    fn parse_json_blocks(&self, text: &str) -> Vec<ToolCallRequest> {
        let mut calls = Vec::new();
        let mut rest = text;

        while let Some(open) = rest.find(BLOCK_OPEN) {
            let after_open = &rest[open + BLOCK_OPEN.len()..];
            let Some(close) = after_open.find(BLOCK_CLOSE) else {
                break;
            };
            let body = after_open[..close].trim();

            match serde_json::from_str::<Value>(body) {
                Ok(value) => match Self::call_from_value(&value) {
                    Some((name, arguments)) => {
                        calls.push(ToolCallRequest::new(self.next_call_id(), name, arguments));
                    }
                    None => {
                        warn!(body = %body, "Tool-call block missing name, skipping");
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Invalid JSON in tool-call block, skipping");
                }
            }

            rest = &after_open[close + BLOCK_CLOSE.len()..];
        }

        calls
    }

    fn call_from_value(value: &Value) -> Option<(String, Map<String, Value>)> {
        let name = value.get("name")?.as_str()?.to_string();
        let arguments = match value.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        Some((name, arguments))
    }

    // =========================================================================
    // Legacy text protocol
    // =========================================================================

    fn parse_legacy(&self, text: &str) -> Vec<ToolCallRequest> {
        let mut calls = Vec::new();
        let mut rest = text;

        while let Some(open) = rest.find(LEGACY_OPEN) {
            let after_open = &rest[open + LEGACY_OPEN.len()..];
            match Self::split_legacy_call(after_open) {
                Some((name, params, consumed)) => {
                    let arguments = Self::decode_legacy_params(params);
                    calls.push(ToolCallRequest::new(self.next_call_id(), name, arguments));
                    rest = &after_open[consumed..];
                }
                None => {
                    // Unterminated or malformed; skip past the marker and keep scanning
                    rest = after_open;
                }
            }
        }

        calls
    }

    /// Split `<name>:<params>]`, returning the consumed byte count
    ///
    /// JSON params may contain `]`, so a leading `{` is scanned to its
    /// matching brace before the closing bracket is expected.
    fn split_legacy_call(text: &str) -> Option<(&str, &str, usize)> {
        let colon = text.find(':')?;
        let name = text[..colon].trim();
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return None;
        }

        let params_start = colon + 1;
        let params_text = &text[params_start..];

        if params_text.trim_start().starts_with('{') {
            let json_end = Self::matching_brace_end(params_text)?;
            let close = params_text[json_end..].find(']')? + json_end;
            return Some((name, params_text[..json_end].trim(), params_start + close + 1));
        }

        let close = params_text.find(']')?;
        Some((name, params_text[..close].trim(), params_start + close + 1))
    }

    /// Byte offset just past the brace matching the first `{`
    fn matching_brace_end(text: &str) -> Option<usize> {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (i, c) in text.char_indices() {
            if in_string {
                match c {
                    '\\' if !escaped => escaped = true,
                    '"' if !escaped => in_string = false,
                    _ => escaped = false,
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i + c.len_utf8());
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn decode_legacy_params(params: &str) -> Map<String, Value> {
        let trimmed = params.trim();

        // (i) JSON object
        if trimmed.starts_with('{') {
            match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Object(map)) => return map,
                Ok(_) | Err(_) => {
                    warn!(params = %trimmed, "Legacy params look like JSON but failed to parse");
                }
            }
        }

        // (ii) comma-separated k=v pairs
        if trimmed.contains('=') {
            let mut map = Map::new();
            for pair in trimmed.split(',') {
                let Some((key, value)) = pair.split_once('=') else {
                    continue;
                };
                map.insert(key.trim().to_string(), Self::coerce_primitive(value.trim()));
            }
            if !map.is_empty() {
                return map;
            }
        }

        // (iii) free-form string, bound to the common built-in parameter names
        let mut map = Map::new();
        for key in ["input", "query", "expression"] {
            map.insert(key.to_string(), Value::String(trimmed.to_string()));
        }
        map
    }

    /// Coerce an unquoted literal: integer, float, bool, else string
    fn coerce_primitive(raw: &str) -> Value {
        if let Ok(n) = raw.parse::<i64>() {
            return Value::Number(n.into());
        }
        if let Ok(f) = raw.parse::<f64>() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }
        match raw.to_ascii_lowercase().as_str() {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }

        let unquoted = raw
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .or_else(|| raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
            .unwrap_or(raw);
        Value::String(unquoted.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolResult;
    use crate::traits::{Tool, ToolParameter};
    use async_trait::async_trait;
    use serde_json::json;

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
                .unwrap_or_default()
                .to_string())
        }
    }

    async fn executor() -> ToolExecutor {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(EchoTool).await;
        ToolExecutor::new(registry)
    }

    #[tokio::test]
    async fn test_parse_json_block() {
        let executor = executor().await;
        let text = r#"I will compute. [[TOOL_CALL]]
{"name":"calculator","arguments":{"input":"(15+25)*3"}}
[[/TOOL_CALL]]"#;

        let calls = executor.parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "calculator");
        assert_eq!(calls[0].arguments["input"], "(15+25)*3");
        assert!(calls[0].id.starts_with("call_"));
    }

    #[tokio::test]
    async fn test_parse_multiple_blocks_skips_invalid() {
        let executor = executor().await;
        let text = concat!(
            "[[TOOL_CALL]]{not json[[/TOOL_CALL]]",
            " and then ",
            "[[TOOL_CALL]]{\"name\":\"echo\",\"arguments\":{\"input\":\"hi\"}}[[/TOOL_CALL]]"
        );

        let calls = executor.parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "echo");
    }

    #[tokio::test]
    async fn test_malformed_block_yields_empty_never_panics() {
        let executor = executor().await;
        let calls = executor.parse_tool_calls("[[TOOL_CALL]]{broken[[/TOOL_CALL]]");
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn test_json_blocks_shadow_legacy() {
        let executor = executor().await;
        let text = concat!(
            "[[TOOL_CALL]]{\"name\":\"echo\",\"arguments\":{}}[[/TOOL_CALL]]",
            "[TOOL_CALL:echo:hello]"
        );
        let calls = executor.parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].arguments.is_empty());
    }

    #[tokio::test]
    async fn test_legacy_kv_coercion() {
        let executor = executor().await;
        let calls = executor.parse_tool_calls("[TOOL_CALL:t:a=1,b=true,c=hi]");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["a"], json!(1));
        assert_eq!(calls[0].arguments["b"], json!(true));
        assert_eq!(calls[0].arguments["c"], json!("hi"));
    }

    #[tokio::test]
    async fn test_legacy_free_string_fans_out() {
        let executor = executor().await;
        let calls = executor.parse_tool_calls("[TOOL_CALL:t:hello]");
        assert_eq!(calls.len(), 1);
        for key in ["input", "query", "expression"] {
            assert_eq!(calls[0].arguments[key], json!("hello"));
        }
    }

    #[tokio::test]
    async fn test_legacy_json_params() {
        let executor = executor().await;
        let calls = executor.parse_tool_calls(r#"[TOOL_CALL:t:{"items":[1,2],"q":"x"}]"#);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["items"], json!([1, 2]));
        assert_eq!(calls[0].arguments["q"], json!("x"));
    }

    #[tokio::test]
    async fn test_execute_success_and_failure() {
        let executor = executor().await;

        let ok = executor
            .execute(&ToolCallRequest::new("id1", "echo", {
                let mut m = Map::new();
                m.insert("input".into(), json!("hey"));
                m
            }))
            .await;
        assert!(ok.success);
        assert_eq!(ok.output, "hey");

        let failed = executor
            .execute(&ToolCallRequest::new("id2", "missing", Map::new()))
            .await;
        assert!(!failed.success);
        assert!(failed.error.is_some());
    }

    #[tokio::test]
    async fn test_execute_all_matches_singleton_execution() {
        let executor = executor().await;
        let requests: Vec<ToolCallRequest> = (0..3)
            .map(|i| {
                let mut m = Map::new();
                m.insert("input".into(), json!(format!("msg{}", i)));
                ToolCallRequest::new(format!("id{}", i), "echo", m)
            })
            .collect();

        let batch = executor.execute_all(&requests).await;
        let mut singles = Vec::new();
        for request in &requests {
            singles.push(executor.execute(request).await);
        }

        assert_eq!(batch, singles);
    }

    #[tokio::test]
    async fn test_execute_all_preserves_order_and_ids() {
        let executor = executor().await;
        let requests = vec![
            ToolCallRequest::new("a", "echo", Map::new()),
            ToolCallRequest::new("b", "missing", Map::new()),
        ];

        let results = executor.execute_all(&requests).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "b");
        assert!(results[0].success);
        assert!(!results[1].success);
    }

    #[test]
    fn test_format_as_message() {
        let ok = ToolCallResult::ok("id1", "echo", "out");
        let msg = ToolExecutor::format_as_message(&ok);
        assert_eq!(msg.content, "out");
        assert_eq!(msg.tool_call_id.as_deref(), Some("id1"));

        let failed = ToolCallResult::failed("id2", "echo", "boom");
        let msg = ToolExecutor::format_as_message(&failed);
        assert_eq!(msg.content, "错误: boom");
    }

    #[test]
    fn test_format_as_text() {
        let ok = ToolCallResult::ok("id1", "echo", "out");
        assert_eq!(ToolExecutor::format_as_text(&ok), "[工具 echo 返回]: out");

        let failed = ToolCallResult::failed("id2", "echo", "boom");
        assert_eq!(
            ToolExecutor::format_as_text(&failed),
            "[工具 echo 执行失败]: boom"
        );
    }
}
