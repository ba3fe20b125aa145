//! Prompt loader for YAML prompt overrides.

use crate::types::PromptDefinition;
use ragline_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

/// Prompt id used for the grounded (retrieve → generate) template.
pub const GROUNDED_PROMPT_ID: &str = "rag.grounded";

/// Prompt id used for the no-context baseline template.
pub const NO_CONTEXT_PROMPT_ID: &str = "rag.no_context";

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(".ragline").join("prompts")
}

/// Load a prompt definition by ID from the workspace.
///
/// Looks for `<id>.yml` in `.ragline/prompts/`. Returns `Ok(None)` when no
/// override exists, so callers can fall back to the built-in templates.
///
/// # Example
/// ```no_run
/// use ragline_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// if let Some(prompt) = load_prompt(Path::new("."), "rag.grounded")? {
///     println!("Using prompt override: {}", prompt.title);
/// }
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<Option<PromptDefinition>> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    if !prompt_file.exists() {
        tracing::debug!("No prompt override at {:?}", prompt_file);
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_prompt(&definition, prompt_id)?;

    tracing::info!("Loaded prompt override: {} ({})", definition.id, definition.title);

    Ok(Some(definition))
}

fn validate_prompt(def: &PromptDefinition, expected_id: &str) -> AppResult<()> {
    if def.id != expected_id {
        return Err(AppError::Prompt(format!(
            "Prompt id '{}' does not match file name '{}'",
            def.id, expected_id
        )));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    if !def.template.contains("{{question}}") {
        return Err(AppError::Prompt(format!(
            "Prompt '{}' must reference {{{{question}}}}",
            def.id
        )));
    }

    if def.id == GROUNDED_PROMPT_ID && !def.template.contains("{{context}}") {
        return Err(AppError::Prompt(format!(
            "Prompt '{}' must reference {{{{context}}}}",
            def.id
        )));
    }

    Ok(())
}
