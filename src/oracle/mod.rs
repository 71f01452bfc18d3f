//! Decision oracle: chooses the next step of a conversation.

pub mod openai;

pub use openai::OpenAiOracle;

use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationState, ToolCall};
use crate::error::Result;
use crate::protocol::OperationSpec;

/// What the oracle wants to happen next.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Text for the user. Final when `calls` is empty.
    pub text: Option<String>,
    /// Operations to run before deciding again.
    pub calls: Vec<ToolCall>,
}

impl Decision {
    /// A final answer.
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            calls: Vec::new(),
        }
    }

    /// A request to run operations.
    pub fn call(calls: Vec<ToolCall>) -> Self {
        Self { text: None, calls }
    }

    /// Whether this decision ends the turn.
    pub fn is_final(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Turns a conversation plus the available operations into a decision.
#[async_trait::async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Decide the next step.
    async fn decide(
        &self,
        state: &ConversationState,
        operations: &[OperationSpec],
    ) -> Result<Decision>;
}
