//! Directory tree rendering for workspace grounding.

use std::cmp::Ordering;
use std::path::Path;

/// Directories never descended into.
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    "target",
    ".next",
    ".nuxt",
    "coverage",
    ".cache",
];

/// Dot-entries that are still shown.
const VISIBLE_DOTFILES: &[&str] = &[".env", ".env.example"];

#[derive(Debug, Clone)]
pub struct TreeOptions {
    pub max_depth: usize,
    pub ignore_dirs: Vec<String>,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            max_depth: 6,
            ignore_dirs: DEFAULT_IGNORE_DIRS.iter().map(|d| d.to_string()).collect(),
        }
    }
}

impl TreeOptions {
    pub fn is_ignored(&self, dir_name: &str) -> bool {
        self.ignore_dirs.iter().any(|d| d == dir_name)
    }
}

/// One directory entry. Symlinks are never treated as directories.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub name: String,
    pub is_dir: bool,
}

/// List a directory, or nothing when it cannot be read.
pub(crate) fn read_entries(dir: &Path) -> Vec<Entry> {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    read_dir
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let is_dir = entry.file_type().ok()?.is_dir();
            Some(Entry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            })
        })
        .collect()
}

/// Case-insensitive name order, ties broken bytewise so the result is total.
pub(crate) fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Render `root` as an indented tree, files before directories at each level.
///
/// ```text
/// project/
/// ├── Cargo.toml
/// └── src/
///     └── main.rs
/// ```
pub fn build_project_tree(root: &Path, options: &TreeOptions) -> String {
    let root_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| ".".into());

    let mut lines = vec![format!("{root_name}/")];
    walk(root, "", 1, options, &mut lines);
    lines.join("\n")
}

fn walk(dir: &Path, prefix: &str, depth: usize, options: &TreeOptions, lines: &mut Vec<String>) {
    if depth > options.max_depth {
        return;
    }

    let mut entries: Vec<Entry> = read_entries(dir)
        .into_iter()
        .filter(|e| !e.name.starts_with('.') || VISIBLE_DOTFILES.contains(&e.name.as_str()))
        .filter(|e| !e.is_dir || !options.is_ignored(&e.name))
        .collect();
    entries.sort_by(|a, b| a.is_dir.cmp(&b.is_dir).then_with(|| compare_names(&a.name, &b.name)));

    let count = entries.len();
    for (i, entry) in entries.into_iter().enumerate() {
        let is_last = i + 1 == count;
        let connector = if is_last { "└── " } else { "├── " };
        if entry.is_dir {
            lines.push(format!("{prefix}{connector}{}/", entry.name));
            let next_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
            walk(&dir.join(&entry.name), &next_prefix, depth + 1, options, lines);
        } else {
            lines.push(format!("{prefix}{connector}{}", entry.name));
        }
    }
}
