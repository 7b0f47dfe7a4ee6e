//! The agent persona and grounding instruction.

/// Built-in persona, prepended to every model call.
pub const DEFAULT_PERSONA: &str = "You are a world-class full-stack developer. Analyse the user's \
requirements and, using the provided project structure and file contents, write and modify code \
directly with the tools (read_file, write_file, run_command). After every change, run the \
project's test command to confirm it succeeds; if it fails, debug from the error output and \
propose a corrected change yourself. Always use paths relative to the working directory.";

pub(crate) const NO_WORKSPACE_NOTICE: &str = "The working directory has not been set yet. File \
and command tools become available once a working directory is chosen.";

/// Persona plus either the no-workspace notice or the root and its context.
pub fn grounding_instruction(persona: &str, workspace_root: &str, project_context: Option<&str>) -> String {
    if workspace_root.trim().is_empty() {
        return format!("{persona}\n\n{NO_WORKSPACE_NOTICE}");
    }
    format!(
        "{persona}\n\nWorking directory: {workspace_root}\n\n{}",
        project_context.unwrap_or_default()
    )
}
