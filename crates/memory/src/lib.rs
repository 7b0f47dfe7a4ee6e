//! Conversation history storage for ssalmuk.
//!
//! History is keyed per workspace root. Both stores keep only the most recent
//! entries (50 by default), dropping the oldest first.

pub mod file_backend;
pub mod in_memory;

pub use file_backend::FileHistory;
pub use in_memory::InMemoryHistory;

use sha2::{Digest, Sha256};

/// Storage key for a workspace root.
///
/// Blank roots share `conversationHistory_default`; anything else is keyed by
/// the first 24 hex characters of the SHA-256 of the root string.
pub fn history_key(workspace_root: &str) -> String {
    if workspace_root.trim().is_empty() {
        return "conversationHistory_default".into();
    }
    let digest = hex::encode(Sha256::digest(workspace_root.as_bytes()));
    format!("conversationHistory_{}", &digest[..24])
}
