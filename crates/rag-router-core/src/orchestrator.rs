//! Per-turn routing state machine.
//!
//! A turn walks an acyclic graph of [`Step`]s:
//!
//! | State | Work | Next |
//! |-------|------|------|
//! | `Routing` | classifier | `KnowledgeBaseLookup` / `Synthesizing` / `Ending` |
//! | `KnowledgeBaseLookup` | retriever + judge | `Synthesizing` / `WebSearch` |
//! | `WebSearch` | web search | `Synthesizing` |
//! | `Synthesizing` | synthesizer, append answer | done |
//! | `Ending` | append canned reply | done |
//!
//! The orchestrator never writes to the caller's state: it works on a copy
//! and hands the updated copy back in [`TurnOutcome`]. A failed turn therefore
//! leaves the persisted conversation untouched.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::ModelBackend;
use crate::classifier::{self, FALLBACK_REPLY};
use crate::error::TurnError;
use crate::judge::{self, Passages};
use crate::models::{ConversationState, Message, Route, RouteTag};
use crate::retriever::{Retriever, DEFAULT_TOP_K};
use crate::synthesizer::{self, ContextBlock};
use crate::web::{self, WebSearch};

/// A non-terminal state of the turn.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Routing,
    KnowledgeBaseLookup,
    WebSearch,
    Synthesizing,
    Ending { reply: String },
}

enum Transition {
    To(Step),
    Done(String),
}

/// Name of a visited state, reported to observers and in [`TurnOutcome::path`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Routing,
    KnowledgeBaseLookup,
    WebSearch,
    Synthesizing,
    Ending,
}

impl StepKind {
    /// Node name used in streamed progress events.
    pub fn node_name(&self) -> &'static str {
        match self {
            StepKind::Routing => "router",
            StepKind::KnowledgeBaseLookup => "rag_lookup",
            StepKind::WebSearch => "web_search",
            StepKind::Synthesizing => "answer",
            StepKind::Ending => "end",
        }
    }
}

impl Step {
    fn kind(&self) -> StepKind {
        match self {
            Step::Routing => StepKind::Routing,
            Step::KnowledgeBaseLookup => StepKind::KnowledgeBaseLookup,
            Step::WebSearch => StepKind::WebSearch,
            Step::Synthesizing => StepKind::Synthesizing,
            Step::Ending { .. } => StepKind::Ending,
        }
    }
}

/// Receives a callback after every completed state.
pub trait TurnObserver: Send + Sync {
    fn on_step(&self, step: StepKind, state: &ConversationState);
}

/// Observer that ignores every step.
pub struct NoopObserver;

impl TurnObserver for NoopObserver {
    fn on_step(&self, _step: StepKind, _state: &ConversationState) {}
}

/// Result of a successful turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Conversation state after the turn, ready to persist.
    pub state: ConversationState,
    /// The assistant message appended this turn.
    pub answer: String,
    /// States visited, in order.
    pub path: Vec<StepKind>,
    /// Context blocks given to the synthesizer (empty on the end path).
    pub context: Vec<ContextBlock>,
}

/// Runs turns against a fixed set of collaborators.
#[derive(Clone)]
pub struct Orchestrator {
    backend: Arc<dyn ModelBackend>,
    retriever: Arc<dyn Retriever>,
    web: Arc<dyn WebSearch>,
    top_k: usize,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        retriever: Arc<dyn Retriever>,
        web: Arc<dyn WebSearch>,
    ) -> Self {
        Self {
            backend,
            retriever,
            web,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Override the number of passages fetched per lookup.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn backend(&self) -> &dyn ModelBackend {
        self.backend.as_ref()
    }

    pub async fn run_turn(
        &self,
        previous: &ConversationState,
        user_text: &str,
    ) -> Result<TurnOutcome, TurnError> {
        self.run_turn_observed(previous, user_text, &NoopObserver)
            .await
    }

    /// Run one turn, reporting each completed state to `observer`.
    pub async fn run_turn_observed(
        &self,
        previous: &ConversationState,
        user_text: &str,
        observer: &dyn TurnObserver,
    ) -> Result<TurnOutcome, TurnError> {
        let mut state = previous.clone();
        state.begin_turn(user_text);
        let query = state.last_user_text().to_string();

        let mut context = Vec::new();
        let mut path = Vec::new();
        let mut step = Step::Routing;

        let answer = loop {
            let kind = step.kind();
            debug_assert!(!path.contains(&kind), "state {:?} revisited", kind);
            debug!(state = kind.node_name(), "entering state");

            let transition = self.advance(step, &query, &mut state, &mut context).await?;
            path.push(kind);
            observer.on_step(kind, &state);

            match transition {
                Transition::To(next) => step = next,
                Transition::Done(answer) => break answer,
            }
        };

        Ok(TurnOutcome {
            state,
            answer,
            path,
            context,
        })
    }

    async fn advance(
        &self,
        step: Step,
        query: &str,
        state: &mut ConversationState,
        context: &mut Vec<ContextBlock>,
    ) -> Result<Transition, TurnError> {
        match step {
            Step::Routing => {
                let decision = classifier::classify(self.backend.as_ref(), query).await?;
                let route = Route::from(decision.tag());
                state.route = Some(route);
                info!(%route, "route decided");

                Ok(Transition::To(match decision.tag() {
                    RouteTag::NeedsKnowledgeBase => Step::KnowledgeBaseLookup,
                    RouteTag::AnswerableDirectly => Step::Synthesizing,
                    RouteTag::ConversationalEnd => Step::Ending {
                        reply: decision.reply().unwrap_or(FALLBACK_REPLY).to_string(),
                    },
                }))
            }

            Step::KnowledgeBaseLookup => {
                let retrieved = match self.retriever.retrieve(query, self.top_k).await {
                    Ok(text) => Some(text),
                    Err(err) => {
                        warn!(error = %format!("{:#}", err), "knowledge base unavailable, treating as empty");
                        None
                    }
                };

                let passages = match retrieved.as_deref() {
                    Some(text) => Passages::Found(text),
                    None => Passages::Unavailable,
                };
                let verdict = judge::judge(self.backend.as_ref(), query, passages).await?;
                info!(sufficient = verdict.sufficient, "knowledge base judged");

                state.knowledge_base_text = retrieved;
                if verdict.sufficient {
                    state.route = Some(Route::ReadyToAnswer);
                    Ok(Transition::To(Step::Synthesizing))
                } else {
                    state.route = Some(Route::NeedsWeb);
                    Ok(Transition::To(Step::WebSearch))
                }
            }

            Step::WebSearch => {
                let text = self.web.search(query).await;
                if web::is_error_text(&text) {
                    warn!(result = %text, "web search failed, continuing with degraded context");
                }
                state.web_text = Some(text);
                state.route = Some(Route::ReadyToAnswer);
                Ok(Transition::To(Step::Synthesizing))
            }

            Step::Synthesizing => {
                let blocks = synthesizer::context_blocks(
                    state.knowledge_base_text.as_deref(),
                    state.web_text.as_deref(),
                );
                let answer = synthesizer::synthesize(self.backend.as_ref(), query, &blocks).await?;
                state.messages.push(Message::assistant(answer.clone()));
                *context = blocks;
                Ok(Transition::Done(answer))
            }

            Step::Ending { reply } => {
                state.messages.push(Message::assistant(reply.clone()));
                Ok(Transition::Done(reply))
            }
        }
    }
}
