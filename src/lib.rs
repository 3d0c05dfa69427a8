//! # Rag Router
//!
//! A conversational agent that decides, per user message, whether to answer
//! directly, consult a local knowledge base, or fall back to live web search.
//!
//! The turn state machine lives in the `rag-router-core` crate. This crate
//! provides the concrete pieces around it: the SQLite knowledge base and its
//! ingestion pipeline, model and web search providers, the conversation
//! store, the CLI, and the HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌──────────┐
//! │  ./docs   │──▶│  Ingest    │──▶│  SQLite  │
//! │ md/pdf/.. │   │ Chunk+Emb  │   │ FTS5+Vec │
//! └───────────┘   └────────────┘   └────┬─────┘
//!                                       │ retrieve
//!   ┌─────────┐   ┌─────────────────────▼─────┐   ┌──────────┐
//!   │ CLI/HTTP│──▶│ Agent → Orchestrator      │──▶│ LLM / Web│
//!   └─────────┘   │ route → kb → judge → web  │   └──────────┘
//!                 └───────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`agent`] | Turn entry point with per-thread serialization |
//! | [`config`] | TOML configuration parsing |
//! | [`connector_fs`] | Documents folder scanner |
//! | [`conversation_store`] | SQLite conversation persistence |
//! | [`db`] | Database connection |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`extract`] | Text extraction for PDF and DOCX |
//! | [`http`] | Shared HTTP client and retry policy |
//! | [`ingest`] | Ingestion pipeline |
//! | [`knowledge`] | Hybrid retriever over the knowledge base |
//! | [`llm`] | OpenAI and Gemini model backends |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`migrate`] | Schema migrations |
//! | [`models`] | Scanned document types |
//! | [`server`] | HTTP server |
//! | [`web_search`] | Tavily web search |

pub mod agent;
pub mod config;
pub mod connector_fs;
pub mod conversation_store;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod http;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod server;
pub mod web_search;
