//! Prompt rendering for grounded and no-context generation.

use crate::loader::{load_prompt, GROUNDED_PROMPT_ID, NO_CONTEXT_PROMPT_ID};
use ragline_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;
use std::path::Path;

/// Default grounded template: retrieved context, then the question.
pub const GROUNDED_TEMPLATE: &str = "Context: {{context}}\n\nQuestion: {{question}}\nAnswer:";

/// Default baseline template used when retrieval is bypassed.
pub const NO_CONTEXT_TEMPLATE: &str = "Question: {{question}}\nAnswer:";

/// The pair of templates a RAG pipeline renders.
///
/// Templates are compiled once; rendering is pure and safe to share across
/// concurrent pipeline runs.
///
/// # Example
/// ```
/// use ragline_prompt::PromptTemplates;
///
/// let templates = PromptTemplates::default();
/// let prompt = templates.render_grounded("Flags mean things.", "What does a flag mean?").unwrap();
/// assert_eq!(prompt, "Context: Flags mean things.\n\nQuestion: What does a flag mean?\nAnswer:");
/// ```
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    registry: Handlebars<'static>,
}

impl PromptTemplates {
    /// Compile a grounded and a no-context template.
    pub fn new(grounded: &str, no_context: &str) -> AppResult<Self> {
        let mut registry = Handlebars::new();

        // Prompts are plain text
        registry.register_escape_fn(handlebars::no_escape);

        registry
            .register_template_string(GROUNDED_PROMPT_ID, grounded)
            .map_err(|e| AppError::Prompt(format!("Failed to register grounded template: {}", e)))?;
        registry
            .register_template_string(NO_CONTEXT_PROMPT_ID, no_context)
            .map_err(|e| {
                AppError::Prompt(format!("Failed to register no-context template: {}", e))
            })?;

        Ok(Self { registry })
    }

    /// Built-in templates, replaced by any `.ragline/prompts/` overrides present.
    pub fn from_workspace(workspace_path: &Path) -> AppResult<Self> {
        let grounded = load_prompt(workspace_path, GROUNDED_PROMPT_ID)?
            .map(|def| def.template)
            .unwrap_or_else(|| GROUNDED_TEMPLATE.to_string());
        let no_context = load_prompt(workspace_path, NO_CONTEXT_PROMPT_ID)?
            .map(|def| def.template)
            .unwrap_or_else(|| NO_CONTEXT_TEMPLATE.to_string());

        Self::new(&grounded, &no_context)
    }

    /// Render the grounded prompt.
    pub fn render_grounded(&self, context: &str, question: &str) -> AppResult<String> {
        let mut variables = HashMap::new();
        variables.insert("context", context);
        variables.insert("question", question);
        self.render(GROUNDED_PROMPT_ID, &variables)
    }

    /// Render the baseline prompt with no retrieved context.
    pub fn render_no_context(&self, question: &str) -> AppResult<String> {
        let mut variables = HashMap::new();
        variables.insert("question", question);
        self.render(NO_CONTEXT_PROMPT_ID, &variables)
    }

    fn render(&self, name: &str, variables: &HashMap<&str, &str>) -> AppResult<String> {
        self.registry
            .render(name, variables)
            .map_err(|e| AppError::Prompt(format!("Failed to render template '{}': {}", name, e)))
    }
}

impl Default for PromptTemplates {
    /// The built-in templates.
    ///
    /// # Panics
    /// Only if [`GROUNDED_TEMPLATE`] or [`NO_CONTEXT_TEMPLATE`] stop parsing,
    /// which is a programming error in this crate.
    fn default() -> Self {
        Self::new(GROUNDED_TEMPLATE, NO_CONTEXT_TEMPLATE)
            .expect("built-in prompt templates must compile")
    }
}
