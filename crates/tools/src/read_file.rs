//! `read_file` — read a workspace file as text.

use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use ssalmuk_core::error::ToolError;
use ssalmuk_core::tool::{Tool, ToolOutput};
use tracing::debug;

use crate::guard_path;

const TOOL_NAME: &str = "read_file";

/// How file bytes are turned into the text handed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextEncoding {
    Utf8,
    Latin1,
    Ascii,
    Base64,
    Hex,
}

impl TextEncoding {
    fn parse(name: Option<&str>) -> Result<Self, ToolError> {
        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            return Ok(Self::Utf8);
        };
        match name.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "latin1" | "latin-1" | "binary" => Ok(Self::Latin1),
            "ascii" => Ok(Self::Ascii),
            "base64" => Ok(Self::Base64),
            "hex" => Ok(Self::Hex),
            other => Err(ToolError::InvalidArguments(format!(
                "Unsupported encoding '{other}'"
            ))),
        }
    }

    fn decode(self, bytes: Vec<u8>) -> Result<String, String> {
        match self {
            Self::Utf8 => String::from_utf8(bytes).map_err(|e| format!("File is not valid UTF-8: {e}")),
            Self::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
            Self::Ascii => Ok(bytes.into_iter().map(|b| char::from(b & 0x7f)).collect()),
            Self::Base64 => Ok(base64::engine::general_purpose::STANDARD.encode(bytes)),
            Self::Hex => Ok(hex::encode(bytes)),
        }
    }
}

/// Reads a whole file relative to the workspace root.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Path is relative to the workspace root (cwd)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Relative path to the file from the workspace root."
                },
                "encoding": {
                    "type": "string",
                    "description": "Optional encoding, e.g. utf-8. Default is utf-8."
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
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let encoding = TextEncoding::parse(arguments["encoding"].as_str())?;

        let file_path = guard_path(workspace, path)?;
        debug!(path = %file_path.display(), ?encoding, "Reading file");

        let bytes = tokio::fs::read(&file_path)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: TOOL_NAME.into(),
                reason: format!("Failed to read {path}: {e}"),
            })?;

        let content = encoding
            .decode(bytes)
            .map_err(|reason| ToolError::ExecutionFailed {
                tool_name: TOOL_NAME.into(),
                reason,
            })?;

        Ok(ToolOutput::Content { content })
    }
}
