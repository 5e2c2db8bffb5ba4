//! End-to-end agent scenarios with a scripted model
//!
//! Covers two-step arithmetic over native tool calling, the text-protocol
//! fallback, max-step termination, and write-back thresholds.

mod common;

use common::ScriptedClient;
use engram_agent::{Agent, MemoryAgent, ToolLoop};
use engram_core::llm::{ChatClient, ToolChoice};
use engram_core::message::Message;
use engram_memory::{
    HashEmbedder, MemoryConfig, MemoryGraphStore, MemoryManager, MemoryType, MemoryVectorStore,
    StoreOptions,
};
use engram_tools::{CalculatorTool, ToolExecutor, ToolRegistry};
use serde_json::json;
use std::sync::Arc;

async fn calculator_executor() -> Arc<ToolExecutor> {
    let registry = Arc::new(ToolRegistry::new());
    registry.register(CalculatorTool).await;
    Arc::new(ToolExecutor::new(registry))
}

async fn memory_manager(config: MemoryConfig) -> MemoryManager {
    MemoryManager::builder(config)
        .vector_store(Arc::new(MemoryVectorStore::new()))
        .embedder(Arc::new(HashEmbedder::new(128)))
        .graph_store(Arc::new(MemoryGraphStore::new()))
        .build()
        .await
        .expect("manager builds")
}

// =============================================================================
// Scenario: two-step arithmetic via native tool calling
// =============================================================================

#[tokio::test]
async fn native_two_step_arithmetic_through_the_loop() {
    let client = Arc::new(ScriptedClient::new(vec![
        ScriptedClient::tool_call("call_1", "calculator", json!({"input": "(15+25)*3"})),
        ScriptedClient::text("120"),
    ]));
    let tool_loop = ToolLoop::new(Arc::clone(&client) as Arc<dyn ChatClient>, calculator_executor().await);

    let outcome = tool_loop
        .run(vec![
            Message::system("you are an assistant"),
            Message::user("Compute (15+25)*3"),
        ])
        .await
        .expect("loop completes");

    assert_eq!(outcome.final_text, "120");
    assert_eq!(outcome.steps_used, 2);
    assert!(!outcome.reached_max_steps);
    assert_eq!(outcome.trace[0].results[0].output, "120");
    assert!(outcome.trace[0].results[0].success);

    // The second request carried the tool result keyed by the call id
    let requests = client.requests.lock().await;
    let followup = &requests[1].messages;
    let tool_msg = followup
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("call_1"))
        .expect("tool result message present");
    assert_eq!(tool_msg.content, "120");
}

// =============================================================================
// Scenario: text-protocol fallback
// =============================================================================

#[tokio::test]
async fn text_protocol_fallback_injects_synthetic_user_message() {
    let client = Arc::new(ScriptedClient::new(vec![
        ScriptedClient::text(
            "I will compute. [[TOOL_CALL]]{\"name\":\"calculator\",\"arguments\":{\"input\":\"(15+25)*3\"}}[[/TOOL_CALL]]",
        ),
        ScriptedClient::text("The answer is 120."),
    ]));
    let tool_loop = ToolLoop::new(Arc::clone(&client) as Arc<dyn ChatClient>, calculator_executor().await)
        .with_native(false);

    let outcome = tool_loop
        .run(vec![Message::user("Compute (15+25)*3")])
        .await
        .expect("loop completes");

    assert_eq!(outcome.final_text, "The answer is 120.");
    assert_eq!(outcome.steps_used, 2);

    // The tool result travels back as formatted text in a user message
    let requests = client.requests.lock().await;
    let followup = &requests[1].messages;
    let injected = followup.last().expect("synthetic message present");
    assert_eq!(injected.role, engram_core::message::Role::User);
    assert!(injected.content.contains("[工具 calculator 返回]: 120"));
}

// =============================================================================
// Scenario: max-step termination
// =============================================================================

#[tokio::test]
async fn max_steps_returns_forced_completion() {
    let client = Arc::new(ScriptedClient::new(vec![
        ScriptedClient::tool_call("c1", "calculator", json!({"input": "1+1"})),
        ScriptedClient::tool_call("c2", "calculator", json!({"input": "2+2"})),
        ScriptedClient::text("Giving up."),
    ]));
    let tool_loop = ToolLoop::new(Arc::clone(&client) as Arc<dyn ChatClient>, calculator_executor().await)
        .with_max_steps(2);

    let outcome = tool_loop
        .run(vec![Message::user("never stop calling tools")])
        .await
        .expect("loop completes");

    assert!(outcome.reached_max_steps);
    assert_eq!(outcome.steps_used, 2);
    assert_eq!(outcome.final_text, "Giving up.");

    let requests = client.requests.lock().await;
    assert_eq!(requests.last().unwrap().tool_choice, Some(ToolChoice::None));
}

// =============================================================================
// Scenario: write-back threshold
// =============================================================================

#[tokio::test]
async fn short_turn_is_not_persisted() {
    let mut config = MemoryConfig::default();
    config.conversation_importance_threshold = 0.9;

    let client = Arc::new(ScriptedClient::new(vec![ScriptedClient::text("hello")]));
    let mut agent = MemoryAgent::new("memo", client as Arc<dyn ChatClient>, memory_manager(config).await, "u1");

    let reply = agent.run("hi").await.expect("turn completes");
    assert_eq!(reply, "hello");

    let stats = agent.memory().stats();
    assert_eq!(stats[&MemoryType::Episodic].count, 0);
    assert_eq!(stats[&MemoryType::Semantic].count, 0);
    assert_eq!(agent.history().len(), 2);
}

#[tokio::test]
async fn important_turn_persists_episodic_only() {
    let mut config = MemoryConfig::default();
    config.conversation_importance_threshold = 0.9;

    let client = Arc::new(ScriptedClient::new(vec![ScriptedClient::text("Noted!")]));
    let mut agent = MemoryAgent::new("memo", client as Arc<dyn ChatClient>, memory_manager(config).await, "u1");

    agent
        .run("remember this: my badge code is 4412")
        .await
        .expect("turn completes");

    let stats = agent.memory().stats();
    assert_eq!(stats[&MemoryType::Episodic].count, 1);
    // The reply carried no knowledge indicator
    assert_eq!(stats[&MemoryType::Semantic].count, 0);
}

#[tokio::test]
async fn knowledge_reply_also_persists_semantic() {
    let mut config = MemoryConfig::default();
    config.conversation_importance_threshold = 0.9;

    let client = Arc::new(ScriptedClient::new(vec![ScriptedClient::text(
        "Entropy is a measure of disorder.",
    )]));
    let mut agent = MemoryAgent::new("memo", client as Arc<dyn ChatClient>, memory_manager(config).await, "u1");

    agent
        .run("remember the definition of entropy")
        .await
        .expect("turn completes");

    let stats = agent.memory().stats();
    assert_eq!(stats[&MemoryType::Episodic].count, 1);
    assert_eq!(stats[&MemoryType::Semantic].count, 1);

    // Discounted importance on the knowledge record
    let fact = agent.memory().semantic().get_all()[0].clone();
    assert!(fact.importance < 0.9);
    assert_eq!(fact.metadata["source"], "assistant");
}

// =============================================================================
// Retrieval augmentation
// =============================================================================

#[tokio::test]
async fn retrieved_memories_augment_the_system_prompt() {
    let client = Arc::new(ScriptedClient::new(vec![ScriptedClient::text(
        "Paris, as you told me before.",
    )]));
    let mut manager = memory_manager(MemoryConfig::default()).await;
    manager
        .store(
            "the user's favorite city is Paris",
            "u1",
            StoreOptions {
                memory_type: Some(MemoryType::Semantic),
                importance: Some(0.9),
                ..Default::default()
            },
        )
        .await
        .expect("seed memory");

    let mut agent = MemoryAgent::new("memo", Arc::clone(&client) as Arc<dyn ChatClient>, manager, "u1");
    agent
        .run("what is my favorite city?")
        .await
        .expect("turn completes");

    let requests = client.requests.lock().await;
    let system = &requests[0].messages[0];
    assert_eq!(system.role, engram_core::message::Role::System);
    assert!(system.content.contains("Relevant memories:"));
    assert!(system.content.contains("favorite city is Paris"));
    assert!(system.content.contains("[semantic]"));
}

#[tokio::test]
async fn known_entities_augment_the_system_prompt() {
    let client = Arc::new(ScriptedClient::new(vec![ScriptedClient::text("ok")]));
    let mut manager = memory_manager(MemoryConfig::default()).await;
    manager
        .add_entity(
            &engram_memory::Entity::new("rust", "Rust", "Language")
                .with_property("description", "a systems programming language"),
        )
        .await;

    let mut agent = MemoryAgent::new("memo", Arc::clone(&client) as Arc<dyn ChatClient>, manager, "u1");
    agent.run("tell me about rust").await.expect("turn completes");

    let requests = client.requests.lock().await;
    let system = &requests[0].messages[0];
    assert!(system.content.contains("Known entities:"));
    assert!(system.content.contains("Rust (Language): a systems programming language"));
}

#[tokio::test]
async fn write_back_is_visible_to_subsequent_retrieval() {
    let mut config = MemoryConfig::default();
    config.conversation_importance_threshold = 0.5;

    let client = Arc::new(ScriptedClient::new(vec![
        ScriptedClient::text("Got it, I'll remember your project deadline."),
        ScriptedClient::text("Your deadline is Friday."),
    ]));
    let mut agent = MemoryAgent::new("memo", Arc::clone(&client) as Arc<dyn ChatClient>, memory_manager(config).await, "u1");

    agent
        .run("remember my project deadline is Friday")
        .await
        .expect("first turn");
    agent
        .run("when is my project deadline?")
        .await
        .expect("second turn");

    // The second request's system prompt carries the first turn's record
    let requests = client.requests.lock().await;
    let system = &requests[1].messages[0];
    assert!(system.content.contains("project deadline is Friday"));
}

// =============================================================================
// Memory agent with tools end-to-end
// =============================================================================

#[tokio::test]
async fn memory_agent_runs_the_tool_loop() {
    let client = Arc::new(ScriptedClient::new(vec![
        ScriptedClient::tool_call("call_1", "calculator", json!({"input": "21*2"})),
        ScriptedClient::text("The result is 42."),
    ]));
    let mut agent = MemoryAgent::new(
        "memo",
        Arc::clone(&client) as Arc<dyn ChatClient>,
        memory_manager(MemoryConfig::default()).await,
        "u1",
    )
    .with_tools(calculator_executor().await);

    let reply = agent.run("Compute 21*2").await.expect("turn completes");
    assert_eq!(reply, "The result is 42.");

    // Tools were declared on the wire and described in the prompt
    let requests = client.requests.lock().await;
    assert!(requests[0].tool_count > 0);
    assert!(requests[0].messages[0].content.contains("Available tools:"));
    assert!(requests[0].messages[0].content.contains("calculator"));
}
