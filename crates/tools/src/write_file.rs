//! `write_file` — create, overwrite, or patch a workspace file.
//!
//! Two modes:
//! - **full content**: `content` replaces the file, parents are created
//! - **patch**: the first occurrence of `oldString` becomes `newString` in an
//!   existing file
//!
//! Patch mode wins when both are supplied.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use ssalmuk_core::error::ToolError;
use ssalmuk_core::tool::{Tool, ToolOutput};
use tracing::debug;

use crate::guard_path;

const TOOL_NAME: &str = "write_file";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteFileArgs {
    path: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    old_string: Option<String>,
    #[serde(default)]
    new_string: Option<String>,
}

#[derive(Debug)]
enum WriteMode {
    Full { content: String },
    Patch { old: String, new: String },
}

impl WriteFileArgs {
    fn mode(self) -> Result<(String, WriteMode), ToolError> {
        let mode = match (self.old_string, self.new_string, self.content) {
            (Some(old), Some(new), _) => WriteMode::Patch { old, new },
            (_, _, Some(content)) => WriteMode::Full { content },
            _ => {
                return Err(ToolError::InvalidArguments(
                    "Either content or both oldString and newString are required.".into(),
                ));
            }
        };
        Ok((self.path, mode))
    }
}

/// Writes or patches a file relative to the workspace root.
pub struct WriteFileTool;

fn failed(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: TOOL_NAME.into(),
        reason,
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Create or overwrite a file. Optionally replace only a substring (oldString -> newString) instead of full content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Relative path to the file from the workspace root."
                },
                "content": {
                    "type": "string",
                    "description": "Full file content when not using oldString/newString. Required if oldString is not provided."
                },
                "oldString": {
                    "type": "string",
                    "description": "Exact substring to replace. When provided, newString must also be provided."
                },
                "newString": {
                    "type": "string",
                    "description": "Replacement string when using oldString."
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        workspace: &Path,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let args: WriteFileArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let (path, mode) = args.mode()?;
        let file_path = guard_path(workspace, &path)?;

        match mode {
            WriteMode::Full { content } => {
                if let Some(parent) = file_path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| failed(format!("Failed to create directory: {e}")))?;
                }
                tokio::fs::write(&file_path, &content)
                    .await
                    .map_err(|e| failed(format!("Failed to write {path}: {e}")))?;
                debug!(path = %file_path.display(), bytes = content.len(), "Wrote file");
            }
            WriteMode::Patch { old, new } => {
                let existing = tokio::fs::read_to_string(&file_path)
                    .await
                    .map_err(|e| failed(format!("Failed to read {path}: {e}")))?;
                if !existing.contains(&old) {
                    return Err(failed(format!("oldString not found in {path}")));
                }
                let updated = existing.replacen(&old, &new, 1);
                tokio::fs::write(&file_path, updated)
                    .await
                    .map_err(|e| failed(format!("Failed to write {path}: {e}")))?;
                debug!(path = %file_path.display(), "Patched file");
            }
        }

        Ok(ToolOutput::Written { written: true })
    }
}
