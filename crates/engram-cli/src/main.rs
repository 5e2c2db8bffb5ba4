//! Engram CLI
//!
//! TigerStyle: Interactive demo with explicit error handling.
//!
//! `engram chat` drives a memory-augmented agent from the terminal. With no
//! vector or graph endpoints configured everything runs on the embedded
//! stores and the offline hash embedder, so the demo works without
//! infrastructure; only the LLM endpoint is required.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use engram_agent::{Agent, MemoryAgent};
use engram_core::{HttpChatClient, LlmConfig};
use engram_memory::{
    embedder_from_env, MemoryConfig, MemoryGraphStore, MemoryManager, MemoryVectorStore,
    QdrantStore, VectorStore,
};
use engram_tools::{CalculatorTool, SearchTool, ToolExecutor, ToolRegistry};
use std::io::Write as _;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Engram memory-agent CLI
#[derive(Parser, Debug)]
#[command(name = "engram")]
#[command(about = "Memory-augmented conversational agents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive chat with a memory agent
    Chat {
        /// User id that scopes memories
        #[arg(short, long, default_value = "local_user")]
        user: String,

        /// Session id for episodic grouping
        #[arg(short, long)]
        session: Option<String>,

        /// Disable tools (plain chat with memory)
        #[arg(long)]
        no_tools: bool,

        /// Use the text tool-call protocol instead of native function calling
        #[arg(long)]
        text_protocol: bool,
    },

    /// Print the recognized configuration snapshot
    Env,
}

fn init_logging() {
    // LOG_LEVEL ∈ {DEBUG, INFO, WARN, ERROR, SILENT}; RUST_LOG overrides
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string());
    let directive = match level.to_ascii_uppercase().as_str() {
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARN" => "warn",
        "ERROR" => "error",
        "SILENT" => "off",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn build_agent(
    user: String,
    session: Option<String>,
    no_tools: bool,
    text_protocol: bool,
) -> Result<MemoryAgent> {
    let llm_config = LlmConfig::from_env()
        .context("the LLM endpoint must be configured (LLM_MODEL_ID, LLM_API_KEY, LLM_BASE_URL)")?;
    let client = Arc::new(HttpChatClient::new(llm_config)?);

    let mut memory_config = MemoryConfig::from_env();
    if let Some(session) = session {
        memory_config = memory_config.with_session_id(session);
    }

    // Prefer a reachable Qdrant; otherwise run on the embedded store
    let mut vector: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
    let mut vector_label = "embedded (offline)";
    if let Ok(store) = QdrantStore::from_env() {
        if store.health_check().await.is_ok() {
            vector = Arc::new(store);
            vector_label = "qdrant";
        }
    }
    println!("{}", format!("vector store: {}", vector_label).dimmed());

    let manager = MemoryManager::builder(memory_config)
        .vector_store(vector)
        .embedder(embedder_from_env())
        .graph_store(Arc::new(MemoryGraphStore::new()))
        .build()
        .await?;

    let mut agent = MemoryAgent::new("engram", client, manager, user)
        .with_native(!text_protocol);

    if !no_tools {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(CalculatorTool).await;
        registry.register(SearchTool::new()).await;
        agent = agent.with_tools(Arc::new(ToolExecutor::new(registry)));
    }

    Ok(agent)
}

async fn chat_loop(mut agent: MemoryAgent) -> Result<()> {
    println!(
        "{}",
        "engram chat — type a message, 'exit' to quit".bold()
    );

    let stdin = std::io::stdin();
    loop {
        print!("{} ", ">".green().bold());
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        match agent.run(input).await {
            Ok(reply) => println!("{} {}", "agent:".cyan().bold(), reply),
            Err(e) => eprintln!("{} {}", "error:".red().bold(), e),
        }
    }

    agent.close().await;
    println!("{}", "bye".dimmed());
    Ok(())
}

fn print_env() {
    let show = |key: &str| {
        let value = std::env::var(key).ok();
        let rendered = match (&value, key.contains("KEY") || key.contains("PASSWORD")) {
            (Some(_), true) => "<set>".to_string(),
            (Some(v), false) => v.clone(),
            (None, _) => "<unset>".dimmed().to_string(),
        };
        println!("  {:<24} {}", key, rendered);
    };

    println!("{}", "model endpoint".bold());
    for key in ["LLM_MODEL_ID", "LLM_API_KEY", "LLM_BASE_URL", "LLM_TIMEOUT"] {
        show(key);
    }
    println!("{}", "embedding".bold());
    for key in [
        "EMBED_MODEL_TYPE",
        "EMBED_MODEL_NAME",
        "EMBED_API_KEY",
        "EMBED_BASE_URL",
        "EMBED_DIMENSIONS",
    ] {
        show(key);
    }
    println!("{}", "vector store".bold());
    for key in [
        "QDRANT_URL",
        "QDRANT_API_KEY",
        "QDRANT_COLLECTION",
        "QDRANT_VECTOR_SIZE",
        "QDRANT_DISTANCE",
        "QDRANT_TIMEOUT",
    ] {
        show(key);
    }
    println!("{}", "graph store".bold());
    for key in ["NEO4J_URI", "NEO4J_USERNAME", "NEO4J_PASSWORD", "NEO4J_DATABASE"] {
        show(key);
    }
    println!("{}", "logging".bold());
    show("LOG_LEVEL");
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            user,
            session,
            no_tools,
            text_protocol,
        } => {
            let agent = build_agent(user, session, no_tools, text_protocol).await?;
            chat_loop(agent).await
        }
        Commands::Env => {
            print_env();
            Ok(())
        }
    }
}
