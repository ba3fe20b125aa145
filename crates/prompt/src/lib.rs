//! Prompt system for Ragline.
//!
//! This crate renders the prompts sent to the generation collaborator:
//! - Built-in grounded and no-context templates
//! - Handlebars template rendering (no HTML escaping)
//! - Optional YAML overrides stored in `.ragline/prompts/`

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::{PromptTemplates, GROUNDED_TEMPLATE, NO_CONTEXT_TEMPLATE};
pub use loader::{load_prompt, GROUNDED_PROMPT_ID, NO_CONTEXT_PROMPT_ID};
pub use types::PromptDefinition;
