//! Workspace context: the directory tree plus a sample of file contents.

use std::path::Path;

use super::tree::{TreeOptions, build_project_tree, compare_names, read_entries};

/// Files read first at every level, in this order.
pub const PRIORITY_FILES: &[&str] = &[
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "tsconfig.json",
    "README.md",
    "PROJECT.md",
];

/// Extensions (lowercase, without the dot) whose contents are collected.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "toml", "ts", "tsx", "js", "jsx", "mjs", "cjs", "json", "md", "py", "go", "yaml", "yml",
];

const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Caps on how much of the workspace is inlined.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub max_files: usize,
    pub max_chars_per_file: usize,
    pub max_total_chars: usize,
    pub tree: TreeOptions,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            max_files: 40,
            max_chars_per_file: 8_000,
            max_total_chars: 120_000,
            tree: TreeOptions::default(),
        }
    }
}

struct Collected {
    rel: String,
    content: String,
}

struct Collector<'a> {
    options: &'a ContextOptions,
    files: Vec<Collected>,
    total_chars: usize,
}

impl Collector<'_> {
    fn is_full(&self) -> bool {
        self.files.len() >= self.options.max_files || self.total_chars >= self.options.max_total_chars
    }

    fn collect(&mut self, dir: &Path, rel_dir: &str) {
        if self.is_full() {
            return;
        }

        let mut entries = read_entries(dir);
        entries.sort_by(|a, b| {
            let a_priority = PRIORITY_FILES.iter().position(|p| *p == a.name);
            let b_priority = PRIORITY_FILES.iter().position(|p| *p == b.name);
            match (a_priority, b_priority) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a
                    .is_dir
                    .cmp(&b.is_dir)
                    .then_with(|| compare_names(&a.name, &b.name)),
            }
        });

        for entry in entries {
            if self.is_full() {
                break;
            }
            let rel = if rel_dir.is_empty() {
                entry.name.clone()
            } else {
                format!("{rel_dir}/{}", entry.name)
            };
            let full = dir.join(&entry.name);

            if entry.is_dir {
                if !self.options.tree.is_ignored(&entry.name) {
                    self.collect(&full, &rel);
                }
                continue;
            }

            if !has_source_extension(&entry.name) {
                continue;
            }
            // Unreadable files are skipped.
            let Ok(bytes) = std::fs::read(&full) else {
                continue;
            };
            let content = truncate_chars(&String::from_utf8_lossy(&bytes), self.options.max_chars_per_file);
            self.total_chars += content.chars().count();
            self.files.push(Collected { rel, content });
        }
    }
}

fn has_source_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.as_str()))
}

fn truncate_chars(raw: &str, max_chars: usize) -> String {
    match raw.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &raw[..cut]),
        None => raw.to_string(),
    }
}

/// Build the grounding text for `root`.
///
/// Deterministic for identical filesystem state.
pub fn build_project_context(root: &Path, options: &ContextOptions) -> String {
    let tree = build_project_tree(root, &options.tree);

    let mut collector = Collector {
        options,
        files: Vec::new(),
        total_chars: 0,
    };
    collector.collect(root, "");

    let sections: Vec<String> = collector
        .files
        .iter()
        .map(|f| format!("### {}\n```\n{}\n```\n", f.rel, f.content))
        .collect();

    format!(
        "## Project directory structure\n```\n{tree}\n```\n\n## Selected file contents\n\n{}",
        sections.join("\n")
    )
}
