//! History storage trait — per-workspace conversation history.
//!
//! The agent loop never touches history itself. Callers read prior turns to
//! seed a run and append the final exchange once the run returns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HistoryError;

/// Default number of history entries retained per workspace.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// The author of a persisted history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

/// A persisted `{role, text}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: HistoryRole,
    pub text: String,
}

impl HistoryTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::Assistant,
            text: text.into(),
        }
    }
}

/// Key-value history storage keyed by workspace root.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// A human-readable name for this backend (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    /// Ordered history for the workspace, oldest first.
    async fn get(&self, workspace_root: &str) -> Result<Vec<HistoryTurn>, HistoryError>;

    /// Append one user/assistant exchange, dropping the oldest entries past
    /// the retention limit.
    async fn append(
        &self,
        workspace_root: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(), HistoryError>;

    /// Forget all history for the workspace.
    async fn clear(&self, workspace_root: &str) -> Result<(), HistoryError>;
}

/// Keep only the most recent `limit` entries.
pub fn retain_recent(turns: &mut Vec<HistoryTurn>, limit: usize) {
    if turns.len() > limit {
        let excess = turns.len() - limit;
        turns.drain(..excess);
    }
}
