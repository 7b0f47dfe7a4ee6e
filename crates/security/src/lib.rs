//! Security boundary for ssalmuk tools.
//!
//! Provides:
//! - **Path confinement**: every file path and working directory a tool
//!   touches must resolve inside the workspace root.
//!
//! Shell command strings themselves are not restricted; only the working
//! directory is confined.

pub mod path;

pub use path::{PathValidationError, normalize, resolve_in_workspace};
