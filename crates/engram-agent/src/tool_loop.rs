//! Tool-calling loop
//!
//! TigerStyle: Bounded fixed-point iteration, every step recorded.
//!
//! Drives the model/tool dialogue until the model returns plain text or the
//! step budget runs out. Two modes:
//!
//! - *Native*: tool schemas travel in the request with `tool_choice=auto`;
//!   results return as `tool` role messages keyed by `tool_call_id`.
//! - *Text*: plain chat; tool-call intents are parsed from the response
//!   text and results are injected as a single synthetic user message.
//!
//! When the budget is exhausted one final completion is forced
//! (`tool_choice=none` in native mode) so the caller always gets text.
//!
//! Within one step, calls execute sequentially in model order; results
//! appear in the dialogue in the same order. Cancellation is checked
//! between steps and between the calls of a step.

use crate::error::{AgentError, AgentResult};
use engram_core::llm::{ChatClient, ToolChoice};
use engram_core::message::{Message, ToolCallRequest, ToolCallResult};
use engram_tools::ToolExecutor;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Default step budget
pub const LOOP_STEPS_MAX_DEFAULT: usize = 5;

/// Instruction appended to text-mode tool results so the model continues
const CONTINUE_INSTRUCTION: &str = "请根据以上工具结果继续回答用户的问题。";

/// Cooperative cancellation flag shared with the caller
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// One recorded step of the loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopStep {
    /// Model text content for this step
    pub content: String,
    /// Tool calls requested by the model (empty on the final step)
    pub tool_calls: Vec<ToolCallRequest>,
    /// Results, index-aligned with `tool_calls`
    pub results: Vec<ToolCallResult>,
}

/// Outcome of a loop run
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// The assistant's final text
    pub final_text: String,
    /// Every recorded step
    pub trace: Vec<LoopStep>,
    /// Number of model steps consumed; equals `trace.len()` unless the
    /// budget was exhausted
    pub steps_used: usize,
    /// Whether the step budget forced termination
    pub reached_max_steps: bool,
}

/// The model/tool dialogue driver
pub struct ToolLoop {
    client: Arc<dyn ChatClient>,
    executor: Arc<ToolExecutor>,
    max_steps: usize,
    use_native: bool,
}

impl ToolLoop {
    /// Create a loop in native function-calling mode
    pub fn new(client: Arc<dyn ChatClient>, executor: Arc<ToolExecutor>) -> Self {
        Self {
            client,
            executor,
            max_steps: LOOP_STEPS_MAX_DEFAULT,
            use_native: true,
        }
    }

    /// Switch between native function calling and the text protocol
    pub fn with_native(mut self, use_native: bool) -> Self {
        self.use_native = use_native;
        self
    }

    /// Override the step budget
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        assert!(max_steps > 0, "step budget must be positive");
        self.max_steps = max_steps;
        self
    }

    /// Whether the loop is in native mode
    pub fn is_native(&self) -> bool {
        self.use_native
    }

    /// Run the loop to a fixed point or the step budget
    pub async fn run(&self, messages: Vec<Message>) -> AgentResult<LoopOutcome> {
        self.run_with_cancel(messages, None).await
    }

    /// Run with a cooperative cancellation flag
    ///
    /// On cancellation the partial trace is surfaced inside the error.
    pub async fn run_with_cancel(
        &self,
        messages: Vec<Message>,
        cancel: Option<&CancelFlag>,
    ) -> AgentResult<LoopOutcome> {
        let schemas = self.executor.registry().schemas().await;
        let mut working = messages;
        let mut trace: Vec<LoopStep> = Vec::new();

        for step in 1..=self.max_steps {
            if let Some(flag) = cancel {
                if flag.is_cancelled() {
                    return Err(AgentError::Cancelled {
                        steps_used: trace.len(),
                        partial_trace: trace,
                    });
                }
            }

            let (content, calls) = if self.use_native {
                let response = self
                    .client
                    .chat_with_tools(&working, &schemas, ToolChoice::Auto)
                    .await?;
                let calls = self.executor.parse_native_calls(&response);
                (response.content, calls)
            } else {
                let content = self.client.chat(&working).await?;
                let calls = self.executor.parse_tool_calls(&content);
                (content, calls)
            };

            if calls.is_empty() {
                debug!(step, "Model returned plain text; loop complete");
                trace.push(LoopStep {
                    content: content.clone(),
                    tool_calls: Vec::new(),
                    results: Vec::new(),
                });
                return Ok(LoopOutcome {
                    final_text: content,
                    trace,
                    steps_used: step,
                    reached_max_steps: false,
                });
            }

            debug!(step, calls = calls.len(), "Executing tool calls");

            // The assistant message carries the model's calls verbatim in
            // native mode so `tool_call_id` correlation holds
            if self.use_native {
                working.push(Message::assistant_with_calls(
                    content.clone(),
                    calls.clone(),
                ));
            } else {
                working.push(Message::assistant(content.clone()));
            }

            let mut results: Vec<ToolCallResult> = Vec::with_capacity(calls.len());
            for call in &calls {
                if let Some(flag) = cancel {
                    if flag.is_cancelled() {
                        trace.push(LoopStep {
                            content,
                            tool_calls: calls.clone(),
                            results,
                        });
                        return Err(AgentError::Cancelled {
                            steps_used: trace.len(),
                            partial_trace: trace,
                        });
                    }
                }
                results.push(self.executor.execute(call).await);
            }

            if self.use_native {
                for result in &results {
                    working.push(ToolExecutor::format_as_message(result));
                }
            } else {
                let formatted: Vec<String> =
                    results.iter().map(ToolExecutor::format_as_text).collect();
                working.push(Message::user(format!(
                    "{}\n\n{}",
                    formatted.join("\n"),
                    CONTINUE_INSTRUCTION
                )));
            }

            trace.push(LoopStep {
                content,
                tool_calls: calls,
                results,
            });
        }

        // Budget exhausted: force a textual answer
        info!(max_steps = self.max_steps, "Step budget exhausted; forcing final completion");
        let final_text = if self.use_native {
            self.client
                .chat_with_tools(&working, &schemas, ToolChoice::None)
                .await?
                .content
        } else {
            self.client.chat(&working).await?
        };

        Ok(LoopOutcome {
            final_text,
            trace,
            steps_used: self.max_steps,
            reached_max_steps: true,
        })
    }
}
