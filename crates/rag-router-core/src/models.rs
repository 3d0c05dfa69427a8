//! Core data models for conversations and routing.
//!
//! These types flow between the orchestrator, its collaborators, and the
//! conversation store. All of them are serializable so durable stores can
//! persist a [`ConversationState`] verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a message in the conversation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Every tag the per-turn state machine can carry in [`ConversationState::route`].
///
/// The first three are produced by the classifier; `NeedsWeb` and
/// `ReadyToAnswer` are produced by the sufficiency judge and the web step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Route {
    NeedsKnowledgeBase,
    AnswerableDirectly,
    ConversationalEnd,
    NeedsWeb,
    ReadyToAnswer,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::NeedsKnowledgeBase => "needs-knowledge-base",
            Route::AnswerableDirectly => "answerable-directly",
            Route::ConversationalEnd => "conversational-end",
            Route::NeedsWeb => "needs-web",
            Route::ReadyToAnswer => "ready-to-answer",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classifier's three-way decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteTag {
    NeedsKnowledgeBase,
    AnswerableDirectly,
    ConversationalEnd,
}

impl RouteTag {
    /// All tags, in the order they are offered to the model.
    pub const ALL: [RouteTag; 3] = [
        RouteTag::ConversationalEnd,
        RouteTag::NeedsKnowledgeBase,
        RouteTag::AnswerableDirectly,
    ];

    /// Short name exchanged with the model (`rag`, `answer`, `end`).
    pub fn wire_name(&self) -> &'static str {
        match self {
            RouteTag::NeedsKnowledgeBase => "rag",
            RouteTag::AnswerableDirectly => "answer",
            RouteTag::ConversationalEnd => "end",
        }
    }

    /// Parse a wire name, tolerating case and surrounding whitespace.
    pub fn from_wire(s: &str) -> Option<Self> {
        let s = s.trim();
        RouteTag::ALL
            .into_iter()
            .find(|tag| tag.wire_name().eq_ignore_ascii_case(s))
    }
}

impl From<RouteTag> for Route {
    fn from(tag: RouteTag) -> Self {
        match tag {
            RouteTag::NeedsKnowledgeBase => Route::NeedsKnowledgeBase,
            RouteTag::AnswerableDirectly => Route::AnswerableDirectly,
            RouteTag::ConversationalEnd => Route::ConversationalEnd,
        }
    }
}

/// Output of the classifier. `reply` is `Some` iff `tag` is `ConversationalEnd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    tag: RouteTag,
    reply: Option<String>,
}

impl RouteDecision {
    /// Build a decision, dropping any reply that accompanies a non-end tag
    /// and substituting `fallback` when an end tag comes without one.
    pub fn new(tag: RouteTag, reply: Option<String>, fallback: &str) -> Self {
        let reply = match tag {
            RouteTag::ConversationalEnd => Some(
                reply
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| fallback.to_string()),
            ),
            _ => None,
        };
        Self { tag, reply }
    }

    pub fn tag(&self) -> RouteTag {
        self.tag
    }

    pub fn reply(&self) -> Option<&str> {
        self.reply.as_deref()
    }
}

/// Whether retrieved knowledge is enough to answer the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SufficiencyVerdict {
    pub sufficient: bool,
}

/// Opaque per-conversation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random thread id (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Persisted state of one conversation.
///
/// `route`, `knowledge_base_text` and `web_text` describe the most recent
/// turn only; [`ConversationState::begin_turn`] clears them before the next
/// turn starts so context never leaks between turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_base_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_text: Option<String>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-turn fields and append the new user message.
    pub fn begin_turn(&mut self, user_text: &str) {
        self.route = None;
        self.knowledge_base_text = None;
        self.web_text = None;
        self.messages.push(Message::user(user_text));
    }

    /// Content of the last user-authored message, or `""` when there is none.
    pub fn last_user_text(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }

    /// Content of the last assistant message, if any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }
}

/// A text chunk produced by the chunker for indexing.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_tag_wire_names() {
        assert_eq!(RouteTag::from_wire("rag"), Some(RouteTag::NeedsKnowledgeBase));
        assert_eq!(RouteTag::from_wire(" Answer "), Some(RouteTag::AnswerableDirectly));
        assert_eq!(RouteTag::from_wire("END"), Some(RouteTag::ConversationalEnd));
        assert_eq!(RouteTag::from_wire("web"), None);
        assert_eq!(RouteTag::from_wire(""), None);
    }

    #[test]
    fn test_decision_reply_only_for_end() {
        let d = RouteDecision::new(RouteTag::AnswerableDirectly, Some("hi".into()), "Hello!");
        assert_eq!(d.reply(), None);

        let d = RouteDecision::new(RouteTag::ConversationalEnd, None, "Hello!");
        assert_eq!(d.reply(), Some("Hello!"));

        let d = RouteDecision::new(RouteTag::ConversationalEnd, Some("   ".into()), "Hello!");
        assert_eq!(d.reply(), Some("Hello!"));

        let d = RouteDecision::new(RouteTag::ConversationalEnd, Some("Hey!".into()), "Hello!");
        assert_eq!(d.reply(), Some("Hey!"));
    }

    #[test]
    fn test_last_user_text_empty_log() {
        let state = ConversationState::new();
        assert_eq!(state.last_user_text(), "");
        assert_eq!(state.last_assistant_text(), None);
    }

    #[test]
    fn test_begin_turn_clears_context() {
        let mut state = ConversationState::new();
        state.begin_turn("first");
        state.route = Some(Route::ReadyToAnswer);
        state.knowledge_base_text = Some("kb".into());
        state.web_text = Some("web".into());
        state.messages.push(Message::assistant("answer"));

        state.begin_turn("second");
        assert_eq!(state.route, None);
        assert_eq!(state.knowledge_base_text, None);
        assert_eq!(state.web_text, None);
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.last_user_text(), "second");
    }

    #[test]
    fn test_state_json_shape() {
        let mut state = ConversationState::new();
        state.begin_turn("hi");
        state.route = Some(Route::ConversationalEnd);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["route"], "conversational-end");
        assert!(json.get("web_text").is_none());

        let back: ConversationState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
