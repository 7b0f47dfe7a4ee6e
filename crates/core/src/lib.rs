//! # ssalmuk core
//!
//! Domain types, traits, and error definitions for the ssalmuk coding agent.
//! This crate has **no framework dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the agent loop is a trait here (model backend,
//! tools, history storage). Implementations live in their respective crates,
//! which keeps the loop testable with scripted stand-ins.

pub mod error;
pub mod event;
pub mod history;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{AgentEvent, EventBus, Phase};
pub use history::{HistoryRole, HistoryStore, HistoryTurn};
pub use message::{Conversation, ConversationId, Role, ToolResultEntry, Turn};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolOutput, ToolRegistry};
