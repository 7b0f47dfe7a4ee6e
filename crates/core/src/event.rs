//! Agent notifications — progress events for external observers.
//!
//! The loop publishes events as it goes; observers (a terminal printer, a UI
//! bridge) subscribe. Publishing never blocks and never fails, so the
//! absence of a listener has no effect on the loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// The two working phases of the agent loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Model,
    Tools,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Tools => "tools",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the loop announces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A tool is about to be dispatched
    ToolInvoked {
        name: String,
        arguments: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    PhaseEntered {
        phase: Phase,
        timestamp: DateTime<Utc>,
    },

    PhaseExited {
        phase: Phase,
        timestamp: DateTime<Utc>,
    },
}

impl AgentEvent {
    pub fn tool_invoked(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::ToolInvoked {
            name: name.into(),
            arguments,
            timestamp: Utc::now(),
        }
    }

    pub fn phase_entered(phase: Phase) -> Self {
        Self::PhaseEntered {
            phase,
            timestamp: Utc::now(),
        }
    }

    pub fn phase_exited(phase: Phase) -> Self {
        Self::PhaseExited {
            phase,
            timestamp: Utc::now(),
        }
    }
}

/// A broadcast-based event bus for agent events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<AgentEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: AgentEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AgentEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
