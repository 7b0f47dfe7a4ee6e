//! Path confinement — every tool path must resolve inside the workspace root.
//!
//! Resolution is lexical first (`.`/`..` folded, relative paths joined onto
//! the root), then checked against the symlink-resolved root for whatever
//! part of the path already exists. No file is opened or created here.

use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path outside workspace: {path}")]
    PathEscape { path: String },

    #[error("Invalid workspace root '{root}': {reason}")]
    InvalidRoot { root: String, reason: String },
}

/// Resolve `raw` (relative or absolute) against `root` and make sure the
/// result stays inside `root`.
///
/// Returns the absolute, normalized path on success.
pub fn resolve_in_workspace(root: &Path, raw: &str) -> Result<PathBuf, PathValidationError> {
    let root = absolute_root(root)?;

    let input = Path::new(raw);
    let candidate = if input.is_absolute() {
        normalize(input)
    } else {
        normalize(&root.join(input))
    };

    if !candidate.starts_with(&root) {
        warn!(path = %raw, root = %root.display(), "Rejected path outside workspace");
        return Err(PathValidationError::PathEscape { path: raw.into() });
    }

    // A symlink inside the workspace may still point elsewhere, dangling ones
    // included. An anchor that cannot be resolved is rejected.
    if let Ok(real_root) = root.canonicalize()
        && let Some(anchor) = nearest_existing(&candidate)
    {
        match anchor.canonicalize() {
            Ok(real_anchor) if real_anchor.starts_with(&real_root) => {}
            Ok(real_anchor) => {
                warn!(path = %raw, target = %real_anchor.display(), "Rejected symlink escaping workspace");
                return Err(PathValidationError::PathEscape { path: raw.into() });
            }
            Err(e) => {
                warn!(path = %raw, anchor = %anchor.display(), error = %e, "Rejected unresolvable link in workspace");
                return Err(PathValidationError::PathEscape { path: raw.into() });
            }
        }
    }

    Ok(candidate)
}

/// Lexically normalize a path: drop `.` and fold `..` into its parent.
///
/// `..` at the filesystem root stays at the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

fn absolute_root(root: &Path) -> Result<PathBuf, PathValidationError> {
    if root.as_os_str().is_empty() {
        return Err(PathValidationError::InvalidRoot {
            root: String::new(),
            reason: "empty path".into(),
        });
    }
    let absolute = std::path::absolute(root).map_err(|e| PathValidationError::InvalidRoot {
        root: root.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(normalize(&absolute))
}

/// Deepest ancestor (or the path itself) present on disk, links not followed.
fn nearest_existing(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| p.symlink_metadata().is_ok())
}
