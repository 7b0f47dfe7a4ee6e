//! Workspace tools for ssalmuk.
//!
//! Exactly three tools are exposed to the model:
//! - `read_file`: read a file as text
//! - `write_file`: create, overwrite, or patch a file
//! - `run_command`: run a shell command with a confined working directory
//!
//! Every path argument goes through the workspace guard before any I/O.

pub mod read_file;
pub mod run_command;
pub mod write_file;

use std::path::{Path, PathBuf};

use ssalmuk_core::error::ToolError;
use ssalmuk_core::tool::ToolRegistry;
use ssalmuk_security::PathValidationError;

pub use read_file::ReadFileTool;
pub use run_command::{DEFAULT_TIMEOUT_MS, RunCommandTool};
pub use write_file::WriteFileTool;

/// Names of the built-in tools, in declaration order.
pub const TOOL_NAMES: [&str; 3] = ["read_file", "write_file", "run_command"];

/// Create the registry holding the three workspace tools.
pub fn default_registry() -> ToolRegistry {
    registry_with_timeout(DEFAULT_TIMEOUT_MS)
}

/// Same as [`default_registry`] with a custom default command timeout.
pub fn registry_with_timeout(command_timeout_ms: u64) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ReadFileTool));
    registry.register(Box::new(WriteFileTool));
    registry.register(Box::new(
        RunCommandTool::new().with_default_timeout_ms(command_timeout_ms),
    ));
    registry
}

/// Resolve a tool path argument inside the workspace.
pub(crate) fn guard_path(workspace: &Path, raw: &str) -> Result<PathBuf, ToolError> {
    ssalmuk_security::resolve_in_workspace(workspace, raw).map_err(|e| match e {
        PathValidationError::PathEscape { path } => ToolError::PathEscape(path),
        other @ PathValidationError::InvalidRoot { .. } => ToolError::ExecutionFailed {
            tool_name: "workspace".into(),
            reason: other.to_string(),
        },
    })
}
