//! Workspace grounding material for the model.
//!
//! Pure functions of the filesystem: a rendered directory tree and a capped
//! sample of file contents.

pub mod project;
pub mod tree;

pub use project::{ContextOptions, build_project_context};
pub use tree::{TreeOptions, build_project_tree};
