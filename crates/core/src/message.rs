//! Conversation turns and the append-only conversation log.
//!
//! A run's conversation alternates between the user side (typed text and
//! tool results) and the model side (text and tool requests). Every
//! `ModelToolRequest` is answered by exactly one `ToolResult` turn before the
//! model is called again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::history::{HistoryRole, HistoryTurn};
use crate::tool::{ToolCall, ToolOutput};

/// Unique identifier for a conversation (one agent run).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a turn, in the backend's two-role vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One tool result, paired by position with the request it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub output: ToolOutput,
}

/// One atomic unit of conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    UserText {
        text: String,
    },
    ModelText {
        text: String,
    },
    /// Tool calls plus the backend's raw content parts, kept verbatim so the
    /// backend sees its own request on the next call.
    ModelToolRequest {
        calls: Vec<ToolCall>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        raw_parts: Vec<serde_json::Value>,
    },
    ToolResult {
        results: Vec<ToolResultEntry>,
    },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::UserText { text: text.into() }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::ModelText { text: text.into() }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::UserText { .. } | Self::ToolResult { .. } => Role::User,
            Self::ModelText { .. } | Self::ModelToolRequest { .. } => Role::Model,
        }
    }
}

/// An append-only, chronologically ordered sequence of turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Seed a conversation from persisted history plus the new user message.
    pub fn seeded(history: &[HistoryTurn], user_message: impl Into<String>) -> Self {
        let mut conversation = Self::new();
        for entry in history {
            let turn = match entry.role {
                HistoryRole::User => Turn::user(&entry.text),
                HistoryRole::Assistant => Turn::model(&entry.text),
            };
            conversation.turns.push(turn);
        }
        conversation.turns.push(Turn::user(user_message));
        conversation
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Tool calls awaiting results, if the last turn is a tool request.
    pub fn pending_calls(&self) -> Option<&[ToolCall]> {
        match self.turns.last() {
            Some(Turn::ModelToolRequest { calls, .. }) => Some(calls),
            _ => None,
        }
    }

    /// Append a user or model text turn.
    ///
    /// Fails while a tool request is still unanswered.
    pub fn push_text(&mut self, turn: Turn) -> Result<()> {
        if !matches!(turn, Turn::UserText { .. } | Turn::ModelText { .. }) {
            return Err(Error::Internal("push_text expects a text turn".into()));
        }
        self.ensure_no_pending()?;
        self.push(turn);
        Ok(())
    }

    /// Append a model tool request.
    pub fn push_tool_request(
        &mut self,
        calls: Vec<ToolCall>,
        raw_parts: Vec<serde_json::Value>,
    ) -> Result<()> {
        if calls.is_empty() {
            return Err(Error::Internal("tool request without calls".into()));
        }
        self.ensure_no_pending()?;
        self.push(Turn::ModelToolRequest { calls, raw_parts });
        Ok(())
    }

    /// Append the results answering the immediately preceding tool request.
    ///
    /// The number of results must match the number of requested calls.
    pub fn push_tool_results(&mut self, results: Vec<ToolResultEntry>) -> Result<()> {
        let expected = self
            .pending_calls()
            .map(|calls| calls.len())
            .ok_or_else(|| Error::Internal("tool results without a pending tool request".into()))?;
        if expected != results.len() {
            return Err(Error::Internal(format!(
                "expected {expected} tool results, got {}",
                results.len()
            )));
        }
        self.push(Turn::ToolResult { results });
        Ok(())
    }

    fn ensure_no_pending(&self) -> Result<()> {
        if self.pending_calls().is_some() {
            return Err(Error::Internal(
                "previous tool request has not been answered".into(),
            ));
        }
        Ok(())
    }

    fn push(&mut self, turn: Turn) {
        self.updated_at = Utc::now();
        self.turns.push(turn);
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
