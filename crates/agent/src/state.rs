//! Per-run state of the agent loop.

use ssalmuk_core::history::HistoryTurn;
use ssalmuk_core::message::Conversation;
use ssalmuk_core::tool::ToolCall;

/// Where the loop is. `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Model,
    Tools,
    Done,
}

/// Everything one run mutates. Created fresh per run and discarded after.
#[derive(Debug)]
pub struct AgentRunState {
    pub(crate) conversation: Conversation,
    workspace_root: String,
    pub(crate) pending: Vec<ToolCall>,
    pub(crate) final_text: String,
    pub(crate) turn_count: u32,
}

impl AgentRunState {
    /// Seed from prior history plus exactly one new user message.
    pub fn new(
        workspace_root: impl Into<String>,
        history: &[HistoryTurn],
        user_message: impl Into<String>,
    ) -> Self {
        Self {
            conversation: Conversation::seeded(history, user_message),
            workspace_root: workspace_root.into(),
            pending: Vec::new(),
            final_text: String::new(),
            turn_count: 0,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// The root exactly as given; blank means no workspace.
    pub fn workspace_root(&self) -> &str {
        &self.workspace_root
    }

    pub fn has_workspace(&self) -> bool {
        !self.workspace_root.trim().is_empty()
    }

    pub fn pending(&self) -> &[ToolCall] {
        &self.pending
    }

    pub fn final_text(&self) -> &str {
        &self.final_text
    }

    /// Model-phase cycles started so far.
    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }
}
