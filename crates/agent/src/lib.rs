//! The agent loop for ssalmuk.
//!
//! One run answers one user message:
//!
//! 1. **Seed** the conversation from prior history plus the new message
//! 2. **Ground** the model with the persona, working directory and a fresh
//!    snapshot of the workspace
//! 3. **Call the model** with the conversation and the tool declarations
//! 4. **If tool calls**: dispatch them against the workspace, append the
//!    results, loop back to step 2
//! 5. **If text**: that is the answer
//!
//! The loop stops at the first text-only response or after the turn limit.

pub mod context;
pub mod loop_runner;
pub mod persona;
pub mod runner;
pub mod state;

#[cfg(test)]
mod test_helpers;

pub use context::{ContextOptions, TreeOptions, build_project_context, build_project_tree};
pub use loop_runner::{AgentLoop, DEFAULT_MAX_TURNS, NO_FINAL_RESPONSE};
pub use persona::{DEFAULT_PERSONA, grounding_instruction};
pub use runner::{AgentRunner, ProviderFactory, RunOutcome, RunRequest};
pub use state::{AgentRunState, LoopState};
