//! # Rag Router CLI (`ragr`)
//!
//! The `ragr` binary manages the local knowledge base and talks to the
//! agent, either one question at a time, interactively, or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! ragr --config ./config/ragr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragr init` | Create the SQLite database and run schema migrations |
//! | `ragr ingest` | Index the documents folder into the knowledge base |
//! | `ragr search "<query>"` | Show the passages the agent would retrieve |
//! | `ragr ask "<question>"` | Run one turn and print the answer |
//! | `ragr chat` | Interactive conversation on one thread |
//! | `ragr serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Index ./docs (created if missing)
//! ragr ingest
//!
//! # Continue a conversation across invocations (named threads are kept in
//! # the SQLite database even when [agent] conversation_store = "memory")
//! ragr ask "What does the onboarding guide say about laptops?" --thread onboarding
//! ragr ask "And for contractors?" --thread onboarding
//!
//! # Serve the LangServe-style API on [server].bind
//! ragr serve
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use rag_router::agent::Agent;
use rag_router::config::{self, Config};
use rag_router::knowledge::SqliteRetriever;
use rag_router::{ingest, logging, migrate, server};
use rag_router_core::ThreadId;

/// Rag Router: a conversational agent that routes each question to a direct
/// answer, the local knowledge base, or the web.
#[derive(Parser)]
#[command(
    name = "ragr",
    about = "Rag Router: a query-routing retrieval-augmented chat agent",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ragr.toml`.
    #[arg(long, global = true, default_value = "./config/ragr.toml")]
    config: PathBuf,

    /// Log every routing decision and state transition to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Index the documents folder into the knowledge base.
    ///
    /// Unchanged files are skipped unless `--full` is given; files that
    /// disappeared from the folder are removed from the index.
    Ingest {
        /// Re-chunk and re-embed every document.
        #[arg(long)]
        full: bool,
    },

    /// Print the passages retrieved for a query.
    Search {
        /// The search query string.
        query: String,

        /// Number of passages (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Ask a single question and print the answer.
    Ask {
        /// The question.
        question: String,

        /// Conversation thread to continue (a new one is generated if omitted).
        ///
        /// Named threads are stored in the database so later invocations can
        /// continue them.
        #[arg(long)]
        thread: Option<String>,
    },

    /// Start an interactive conversation.
    ///
    /// Type `quit` or `exit` to stop.
    Chat {
        /// Conversation thread to continue (a new one is generated if omitted).
        #[arg(long)]
        thread: Option<String>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { full } => {
            ingest::run_ingest(&cfg, full).await?;
        }
        Commands::Search { query, k } => {
            run_search(&cfg, &query, k.unwrap_or(cfg.retrieval.top_k)).await?;
        }
        Commands::Ask { question, thread } => {
            let store = cfg.agent.store_for_cli(thread.is_some());
            let agent = Agent::from_config_with_store(&cfg, store).await?;
            let thread = thread.map(ThreadId::new).unwrap_or_else(ThreadId::generate);
            let answer = agent.handle_turn(&thread, &question).await?;
            println!("{}", answer);
        }
        Commands::Chat { thread } => {
            let store = cfg.agent.store_for_cli(thread.is_some());
            let agent = Agent::from_config_with_store(&cfg, store).await?;
            let thread = thread.map(ThreadId::new).unwrap_or_else(ThreadId::generate);
            run_chat(&agent, &thread).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_search(cfg: &Config, query: &str, k: usize) -> Result<()> {
    let retriever = SqliteRetriever::from_config(cfg).await?;
    let results = retriever.search(query, k).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in results.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.score, hit.chunk_id);
        println!("{}", hit.text.trim());
        println!();
    }
    Ok(())
}

async fn run_chat(agent: &Agent, thread: &ThreadId) -> Result<()> {
    println!("Chatting on thread {} (type 'quit' or 'exit' to stop)", thread);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if matches!(input.to_lowercase().as_str(), "quit" | "exit") {
            break;
        }

        match agent.handle_turn(thread, input).await {
            Ok(answer) => println!("Agent: {}\n", answer),
            Err(e) => eprintln!("Error: {}\n", e),
        }
    }
    Ok(())
}
