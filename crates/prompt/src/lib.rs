//! Prompt composition for regcite.
//!
//! This crate turns ranked, labelled passages and a question into a
//! `GenerationRequest`:
//! - Handlebars instruction templates constraining citation behaviour
//! - Optional YAML overrides from the workspace
//! - Tagged context rendering for the user message

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::PromptComposer;
pub use loader::{load_prompt, load_templates};
pub use types::{
    ContextPassage, GenerationRequest, PassageReference, PromptDefinition, PromptTemplates,
};
