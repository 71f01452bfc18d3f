//! Conversation state shared with the decision oracle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::protocol::Envelope;

/// An operation call requested by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identity; tool results are matched back by it.
    pub id: String,
    /// Operation to run.
    pub operation: String,
    /// Named arguments.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    /// Create a call with a fresh id.
    pub fn new(operation: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            operation: operation.into(),
            arguments,
        }
    }
}

/// One entry in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    /// User input.
    User { text: String },
    /// Oracle decision that requested calls.
    AssistantCalls {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        calls: Vec<ToolCall>,
    },
    /// Result of one requested call.
    ToolResult {
        call_id: String,
        operation: String,
        envelope: Envelope,
    },
    /// Final answer shown to the user.
    AssistantFinal { text: String },
}

/// Ordered, append-only record of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    /// Session id.
    pub id: String,
    turns: Vec<Turn>,
    /// When the session started.
    pub created_at: DateTime<Utc>,
    /// When a turn was last appended.
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Start an empty session.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Turns in order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the session has no turns yet.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Last turn, if any.
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.updated_at = Utc::now();
    }

    /// Append user input.
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(Turn::User { text: text.into() });
    }

    /// Append an oracle decision with calls.
    pub fn push_calls(&mut self, text: Option<String>, calls: Vec<ToolCall>) {
        self.push(Turn::AssistantCalls { text, calls });
    }

    /// Append the result of a call.
    pub fn push_tool_result(&mut self, call: &ToolCall, envelope: Envelope) {
        self.push(Turn::ToolResult {
            call_id: call.id.clone(),
            operation: call.operation.clone(),
            envelope,
        });
    }

    /// Append a final answer.
    pub fn push_final(&mut self, text: impl Into<String>) {
        self.push(Turn::AssistantFinal { text: text.into() });
    }

    /// Drop everything from `mark` on. Used to discard an unanswered user
    /// turn and whatever partial progress followed it.
    pub(crate) fn rollback(&mut self, mark: usize) {
        if mark < self.turns.len() {
            self.turns.truncate(mark);
            self.updated_at = Utc::now();
        }
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_turns_append_in_order() {
        let mut state = ConversationState::new();
        state.push_user("find me a hotel in Chicago");
        let call = ToolCall::new("search_hotels", Map::new());
        state.push_calls(None, vec![call.clone()]);
        state.push_tool_result(&call, Envelope::success(json!({"count": 2})));
        state.push_final("Two hotels are available.");

        assert_eq!(state.len(), 4);
        match &state.turns()[2] {
            Turn::ToolResult { call_id, .. } => assert_eq!(call_id, &call.id),
            other => panic!("unexpected turn {:?}", other),
        }
        assert!(matches!(state.last(), Some(Turn::AssistantFinal { .. })));
    }

    #[test]
    fn test_rollback_discards_unanswered_turn() {
        let mut state = ConversationState::new();
        state.push_user("hi");
        state.push_final("hello");
        let mark = state.len();
        state.push_user("book it");
        state.push_calls(None, vec![ToolCall::new("create_booking", Map::new())]);

        state.rollback(mark);
        assert_eq!(state.len(), 2);
        assert!(matches!(state.last(), Some(Turn::AssistantFinal { .. })));
    }

    #[test]
    fn test_turn_wire_shape() {
        let value = serde_json::to_value(Turn::User { text: "hi".into() }).unwrap();
        assert_eq!(value, json!({"role": "user", "text": "hi"}));
    }

    #[test]
    fn test_generated_call_ids_are_unique() {
        let a = ToolCall::new("search_hotels", Map::new());
        let b = ToolCall::new("search_hotels", Map::new());
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("call_"));
    }
}
