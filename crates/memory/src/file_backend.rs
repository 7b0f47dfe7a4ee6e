//! File-based history — one JSON document mapping keys to turn lists.
//!
//! Storage location: `~/.ssalmuk/history.json`
//!
//! The document is loaded on open and flushed on every mutation (append,
//! clear). Reads are served from memory.

use async_trait::async_trait;
use ssalmuk_core::error::HistoryError;
use ssalmuk_core::history::{DEFAULT_HISTORY_LIMIT, HistoryStore, HistoryTurn, retain_recent};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::history_key;

type Document = BTreeMap<String, Vec<HistoryTurn>>;

/// A file-backed history store.
pub struct FileHistory {
    path: PathBuf,
    limit: usize,
    document: RwLock<Document>,
}

impl FileHistory {
    /// Open the store at `path`.
    ///
    /// A missing file starts empty (created on first write). A file that is
    /// not a JSON object is reported as corrupted rather than overwritten;
    /// individual entries that fail to parse are skipped.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();
        let document = Self::load_from_disk(&path).await?;
        debug!(path = %path.display(), workspaces = document.len(), "File history loaded");
        Ok(Self {
            path,
            limit: DEFAULT_HISTORY_LIMIT,
            document: RwLock::new(document),
        })
    }

    /// Override how many entries are retained per workspace.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_from_disk(path: &Path) -> Result<Document, HistoryError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => {
                return Err(HistoryError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        if content.trim().is_empty() {
            return Ok(Document::new());
        }

        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(&content)
            .map_err(|e| HistoryError::Corrupted(format!("{}: {e}", path.display())))?;

        Ok(raw
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value(value) {
                Ok(turns) => Some((key, turns)),
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping corrupted history entry");
                    None
                }
            })
            .collect())
    }

    /// Write the whole document. Called with the write lock held so flushes
    /// land in mutation order; the in-memory copy is replaced only after this
    /// succeeds.
    async fn flush(&self, document: &Document) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                HistoryError::Storage(format!("Failed to create history directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(document)
            .map_err(|e| HistoryError::Storage(format!("Failed to serialize history: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to write history file: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to replace history file: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl HistoryStore for FileHistory {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, workspace_root: &str) -> Result<Vec<HistoryTurn>, HistoryError> {
        let document = self.document.read().await;
        Ok(document
            .get(&history_key(workspace_root))
            .cloned()
            .unwrap_or_default())
    }

    async fn append(
        &self,
        workspace_root: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(), HistoryError> {
        let mut document = self.document.write().await;
        let mut next = document.clone();
        let list = next.entry(history_key(workspace_root)).or_default();
        list.push(HistoryTurn::user(user_text));
        list.push(HistoryTurn::assistant(assistant_text));
        retain_recent(list, self.limit);

        self.flush(&next).await?;
        *document = next;
        Ok(())
    }

    async fn clear(&self, workspace_root: &str) -> Result<(), HistoryError> {
        let mut document = self.document.write().await;
        let key = history_key(workspace_root);
        if !document.contains_key(&key) {
            return Ok(());
        }

        let mut next = document.clone();
        next.remove(&key);
        self.flush(&next).await?;
        *document = next;
        Ok(())
    }
}
