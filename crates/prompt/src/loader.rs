//! Loader for workspace prompt overrides.

use crate::builder::render_template;
use crate::types::{PromptDefinition, PromptTemplates};
use regcite_core::{AppError, AppResult};
use std::path::Path;

/// File name of the answer prompt inside the prompts directory.
pub const ANSWER_PROMPT_FILE: &str = "answer.yml";

/// Load the answer templates, falling back to the built-in ones.
///
/// Looks for `answer.yml` in `prompts_dir` (normally `.regcite/prompts/`).
/// A present but invalid file is an error rather than a silent fallback.
///
/// # Example
/// ```no_run
/// use regcite_prompt::load_templates;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let templates = load_templates(Path::new(".regcite/prompts"))?;
/// println!("{}", templates.answer);
/// # Ok(())
/// # }
/// ```
pub fn load_templates(prompts_dir: &Path) -> AppResult<PromptTemplates> {
    let prompt_file = prompts_dir.join(ANSWER_PROMPT_FILE);

    if !prompt_file.exists() {
        tracing::debug!("No prompt override at {:?}, using built-in templates", prompt_file);
        return Ok(PromptTemplates::default());
    }

    let definition = load_prompt(&prompt_file)?;
    tracing::info!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition.templates)
}

/// Load and validate a prompt definition file.
pub fn load_prompt(prompt_file: &Path) -> AppResult<PromptDefinition> {
    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    let contents = std::fs::read_to_string(prompt_file).map_err(|e| {
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

    validate_prompt(&definition)?;

    Ok(definition)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
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

    for (name, template) in [
        ("answer", &def.templates.answer),
        ("empty", &def.templates.empty),
        ("strict", &def.templates.strict),
    ] {
        if template.trim().is_empty() {
            return Err(AppError::Prompt(format!(
                "Prompt template '{}' cannot be empty",
                name
            )));
        }
        render_template(template, &serde_json::json!({ "labels": [], "rejected": [] }))?;
    }

    Ok(())
}
