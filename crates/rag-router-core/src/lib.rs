//! # Rag Router Core
//!
//! Runtime-agnostic decision logic for Rag Router: the conversation data
//! model, the collaborator traits (model backend, retriever, web search),
//! the classifier / judge / synthesizer stages, the per-turn routing state
//! machine, and the conversation store abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP client, or filesystem
//! dependencies. Concrete providers live in the `rag-router` crate.
//!
//! ```text
//!            ┌────────────┐
//!  user ───▶ │  Routing   │──end──────────────────────────▶ Ending
//!            └─────┬──────┘
//!          rag     │      answer
//!     ┌────────────┴──────────────┐
//!     ▼                           ▼
//! ┌───────────────┐  sufficient ┌──────────────┐
//! │ KnowledgeBase │────────────▶│ Synthesizing │──▶ Terminal
//! │    Lookup     │             └──────────────┘
//! └──────┬────────┘                    ▲
//!        │ insufficient  ┌───────────┐ │
//!        └──────────────▶│ WebSearch │─┘
//!                        └───────────┘
//! ```

pub mod backend;
pub mod chunk;
pub mod classifier;
pub mod error;
pub mod judge;
pub mod models;
pub mod orchestrator;
pub mod retriever;
pub mod store;
pub mod synthesizer;
pub mod web;

pub use backend::{ModelBackend, OutputSchema, PromptMessage};
pub use error::TurnError;
pub use models::{ConversationState, Message, Role, Route, RouteDecision, RouteTag, ThreadId};
pub use orchestrator::{Orchestrator, StepKind, TurnObserver, TurnOutcome};
pub use retriever::Retriever;
pub use store::ConversationStore;
pub use web::WebSearch;
