//! In-memory history — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use ssalmuk_core::error::HistoryError;
use ssalmuk_core::history::{DEFAULT_HISTORY_LIMIT, HistoryStore, HistoryTurn, retain_recent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::history_key;

/// A history store that lives only as long as the process.
pub struct InMemoryHistory {
    entries: Arc<RwLock<HashMap<String, Vec<HistoryTurn>>>>,
    limit: usize,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            limit,
        }
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, workspace_root: &str) -> Result<Vec<HistoryTurn>, HistoryError> {
        let entries = self.entries.read().await;
        Ok(entries
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
        let mut entries = self.entries.write().await;
        let list = entries.entry(history_key(workspace_root)).or_default();
        list.push(HistoryTurn::user(user_text));
        list.push(HistoryTurn::assistant(assistant_text));
        retain_recent(list, self.limit);
        Ok(())
    }

    async fn clear(&self, workspace_root: &str) -> Result<(), HistoryError> {
        self.entries.write().await.remove(&history_key(workspace_root));
        Ok(())
    }
}
