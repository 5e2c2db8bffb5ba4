//! Memory-augmented agent
//!
//! TigerStyle: One turn = retrieve, augment, invoke, write back.
//!
//! Per turn the agent retrieves prior context (cross-tier memories plus
//! graph entities found via extracted keywords), assembles an augmented
//! system prompt, runs the tool-calling loop (or a single completion when
//! tools are disabled), then persists the turn: sufficiently important user
//! input becomes an episodic record, and replies carrying a knowledge
//! indicator phrase become semantic records at a discounted importance.
//!
//! Write-back happens after the response is finalized, so a subsequent
//! retrieve always observes all prior committed turns.

use crate::base::Agent;
use crate::error::AgentResult;
use crate::tool_loop::{ToolLoop, LOOP_STEPS_MAX_DEFAULT};
use async_trait::async_trait;
use engram_core::llm::ChatClient;
use engram_core::message::{History, Message};
use engram_memory::graph::Entity;
use engram_memory::{
    MemoryManager, MemoryType, RetrieveOptions, ScoredMemory, StoreOptions,
};
use engram_tools::ToolExecutor;
use serde_json::{json, Map};
use std::sync::Arc;
use tracing::{debug, warn};

/// Maximum keywords fed to entity search per turn
pub const ENTITY_KEYWORDS_MAX: usize = 3;

/// Entity results fetched per keyword
pub const ENTITY_SEARCH_LIMIT: usize = 3;

/// Phrases marking a reply as knowledge worth keeping
const KNOWLEDGE_INDICATORS: &[&str] = &[
    "is a",
    "is an",
    "is the",
    "is defined as",
    "means",
    "refers to",
    "known as",
    "are called",
    "是指",
    "定义为",
    "意味着",
];

/// Stop words skipped by the default keyword extractor
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "what", "when", "where", "which", "how", "who",
    "why", "are", "was", "were", "can", "could", "would", "should", "about", "from", "into",
    "you", "your", "please", "tell",
];

/// Injectable keyword extractor
///
/// The default splits on whitespace and filters stop tokens; Chinese
/// deployments inject a dictionary or statistical tokenizer.
pub type KeywordExtractor = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// Default extractor: whitespace split, stop-word filter, deduplicated
pub fn default_keyword_extractor(input: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in input
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.len() >= 3)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
    {
        if !keywords.contains(&word) {
            keywords.push(word);
        }
    }
    keywords
}

/// Instructions for the text tool-call protocol, appended to the system
/// prompt when tools run in text mode
const TEXT_PROTOCOL_INSTRUCTIONS: &str = "To call a tool, reply with a block of the form:\n\
[[TOOL_CALL]]\n{\"name\": \"<tool name>\", \"arguments\": {<parameters>}}\n[[/TOOL_CALL]]\n\
Tool results will be provided in the next message.";

/// Agent that fuses the memory manager with the tool-calling loop
pub struct MemoryAgent {
    name: String,
    client: Arc<dyn ChatClient>,
    manager: MemoryManager,
    executor: Option<Arc<ToolExecutor>>,
    history: History,
    user_id: String,
    base_prompt: String,
    use_native: bool,
    max_steps: usize,
    turn: u64,
    keyword_extractor: KeywordExtractor,
}

impl MemoryAgent {
    /// Create a memory agent for one user
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn ChatClient>,
        manager: MemoryManager,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            manager,
            executor: None,
            history: History::default(),
            user_id: user_id.into(),
            base_prompt: "You are a helpful assistant with long-term memory.".to_string(),
            use_native: true,
            max_steps: LOOP_STEPS_MAX_DEFAULT,
            turn: 0,
            keyword_extractor: Arc::new(default_keyword_extractor),
        }
    }

    /// Enable tools through an executor
    pub fn with_tools(mut self, executor: Arc<ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Replace the base system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.base_prompt = prompt.into();
        self
    }

    /// Choose native function calling (default) or the text protocol
    pub fn with_native(mut self, use_native: bool) -> Self {
        self.use_native = use_native;
        self
    }

    /// Override the tool-loop step budget
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        assert!(max_steps > 0, "step budget must be positive");
        self.max_steps = max_steps;
        self
    }

    /// Inject a keyword extractor
    pub fn with_keyword_extractor(mut self, extractor: KeywordExtractor) -> Self {
        self.keyword_extractor = extractor;
        self
    }

    /// The memory manager, for direct access
    pub fn memory(&mut self) -> &mut MemoryManager {
        &mut self.manager
    }

    /// Release memory-subsystem resources
    pub async fn close(&mut self) {
        self.manager.close().await;
    }

    /// Conversation importance heuristic
    ///
    /// Base 0.4; +0.1 for length; +0.1 for a question mark; +0.5 for an
    /// importance keyword; clamped to [0, 1].
    pub fn conversation_importance(content: &str) -> f32 {
        let mut score: f32 = 0.4;
        if content.chars().count() > 50 {
            score += 0.1;
        }
        if content.contains('?') || content.contains('？') {
            score += 0.1;
        }
        if MemoryManager::has_importance_keyword(content) {
            score += 0.5;
        }
        score.clamp(0.0, 1.0)
    }

    /// Whether a reply carries a knowledge indicator phrase
    pub fn has_knowledge_indicator(content: &str) -> bool {
        let lower = content.to_lowercase();
        KNOWLEDGE_INDICATORS.iter().any(|k| lower.contains(k))
    }

    async fn collect_entities(&self, input: &str) -> Vec<Entity> {
        let mut keywords = (self.keyword_extractor)(input);
        keywords.truncate(ENTITY_KEYWORDS_MAX);

        let mut entities: Vec<Entity> = Vec::new();
        for keyword in &keywords {
            for entity in self
                .manager
                .search_entities(keyword, None, ENTITY_SEARCH_LIMIT)
                .await
            {
                if entities.iter().all(|e| e.entity_id != entity.entity_id) {
                    entities.push(entity);
                }
            }
        }
        entities
    }

    async fn compose_system_prompt(
        &self,
        memories: &[ScoredMemory],
        entities: &[Entity],
    ) -> String {
        let mut prompt = self.base_prompt.clone();

        if let Some(executor) = &self.executor {
            prompt.push_str("\n\nAvailable tools:\n");
            prompt.push_str(&executor.registry().describe().await);
            if !self.use_native {
                prompt.push_str("\n\n");
                prompt.push_str(TEXT_PROTOCOL_INSTRUCTIONS);
            }
        }

        if !memories.is_empty() {
            prompt.push_str("\n\nRelevant memories:\n");
            for memory in memories {
                prompt.push_str(&format!(
                    "- [{}] (relevance {:.2}) {}\n",
                    memory.item.memory_type, memory.score, memory.item.content
                ));
            }
        }

        if !entities.is_empty() {
            prompt.push_str("\nKnown entities:\n");
            for entity in entities {
                match entity.properties.get("description").and_then(|v| v.as_str()) {
                    Some(description) => prompt.push_str(&format!(
                        "- {} ({}): {}\n",
                        entity.name, entity.entity_type, description
                    )),
                    None => prompt
                        .push_str(&format!("- {} ({})\n", entity.name, entity.entity_type)),
                }
            }
        }

        prompt
    }

    /// Persist the finished turn into the appropriate tiers
    async fn write_back(&mut self, input: &str, reply: &str) {
        let score = Self::conversation_importance(input);
        let threshold = self.manager.config().conversation_importance_threshold;
        if score < threshold {
            debug!(score, threshold, "Turn below importance threshold; not persisted");
            return;
        }

        let mut metadata = Map::new();
        metadata.insert("turn".to_string(), json!(self.turn));

        let stored = self
            .manager
            .store(
                input,
                self.user_id.clone(),
                StoreOptions {
                    memory_type: Some(MemoryType::Episodic),
                    importance: Some(score),
                    session_id: None,
                    metadata: metadata.clone(),
                },
            )
            .await;
        if let Err(e) = stored {
            warn!(error = %e, "Failed to persist user turn");
        }

        if Self::has_knowledge_indicator(reply) {
            metadata.insert("source".to_string(), json!("assistant"));
            let stored = self
                .manager
                .store(
                    reply,
                    self.user_id.clone(),
                    StoreOptions {
                        memory_type: Some(MemoryType::Semantic),
                        importance: Some((score * 0.8).clamp(0.0, 1.0)),
                        session_id: None,
                        metadata,
                    },
                )
                .await;
            if let Err(e) = stored {
                warn!(error = %e, "Failed to persist assistant knowledge");
            }
        }
    }
}

#[async_trait]
impl Agent for MemoryAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, input: &str) -> AgentResult<String> {
        // 1. Retrieve
        let retrieve_options = RetrieveOptions {
            user_id: Some(self.user_id.clone()),
            memory_types: None,
            limit: self.manager.config().rag_top_k,
            min_importance: Some(self.manager.config().rag_min_score),
        };
        let memories = self.manager.retrieve(input, retrieve_options).await;
        let entities = self.collect_entities(input).await;

        debug!(
            agent = %self.name,
            memories = memories.len(),
            entities = entities.len(),
            "Retrieved context for turn"
        );

        // 2. Augment
        let system = self.compose_system_prompt(&memories, &entities).await;
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(Message::system(system));
        messages.extend(self.history.messages().iter().cloned());
        messages.push(Message::user(input));

        // 3. Invoke
        let reply = match &self.executor {
            Some(executor) => {
                let tool_loop = ToolLoop::new(Arc::clone(&self.client), Arc::clone(executor))
                    .with_native(self.use_native)
                    .with_max_steps(self.max_steps);
                tool_loop.run(messages).await?.final_text
            }
            None => self.client.chat(&messages).await?,
        };

        // 4. Write back, then commit history
        self.write_back(input, &reply).await;
        self.history.push(Message::user(input));
        self.history.push(Message::assistant(reply.clone()));
        self.turn += 1;

        Ok(reply)
    }

    fn history(&self) -> &History {
        &self.history
    }

    fn clear_history(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keyword_extractor() {
        let keywords = default_keyword_extractor("What is the capital of France?");
        assert!(keywords.contains(&"capital".to_string()));
        assert!(keywords.contains(&"france".to_string()));
        assert!(!keywords.contains(&"the".to_string()));
        assert!(!keywords.contains(&"is".to_string()));
    }

    #[test]
    fn test_keyword_extractor_dedupes() {
        let keywords = default_keyword_extractor("rust rust rust borrow borrow");
        assert_eq!(keywords, vec!["rust".to_string(), "borrow".to_string()]);
    }

    #[test]
    fn test_conversation_importance() {
        // Short greeting stays at base
        assert!((MemoryAgent::conversation_importance("hi") - 0.4).abs() < 1e-6);

        // Question mark bumps
        assert!(
            (MemoryAgent::conversation_importance("what now?") - 0.5).abs() < 1e-6
        );

        // Importance keyword reaches the strict threshold
        assert!(MemoryAgent::conversation_importance("remember this for later") >= 0.9);

        // Everything combined still clamps
        let loud = format!("remember this! {}", "x".repeat(100));
        assert!(MemoryAgent::conversation_importance(&loud) <= 1.0);
    }

    #[test]
    fn test_knowledge_indicator() {
        assert!(MemoryAgent::has_knowledge_indicator(
            "Entropy is a measure of disorder."
        ));
        assert!(MemoryAgent::has_knowledge_indicator("RAM 是指随机存取存储器"));
        assert!(!MemoryAgent::has_knowledge_indicator("sure, done!"));
    }
}
