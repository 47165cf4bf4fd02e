//! Prompt composer: renders citation instructions and assembles requests.

use crate::types::{ContextPassage, GenerationRequest, PromptTemplates};
use regcite_core::{AppError, AppResult};
use handlebars::Handlebars;
use serde_json::json;

/// Composes generation requests from ranked passages.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    templates: PromptTemplates,
    require_context: bool,
}

impl PromptComposer {
    /// Create a composer with the given templates.
    ///
    /// With `require_context` set, composing without passages fails with
    /// `AppError::EmptyContext` instead of asking the model to report that
    /// nothing relevant was found.
    pub fn new(templates: PromptTemplates, require_context: bool) -> Self {
        Self {
            templates,
            require_context,
        }
    }

    /// Whether an empty retrieval is an error for this composer.
    pub fn requires_context(&self) -> bool {
        self.require_context
    }

    /// Build a request for `question` from passages in ranking order.
    ///
    /// # Example
    /// ```
    /// use regcite_prompt::{ContextPassage, PromptComposer, PromptTemplates};
    ///
    /// let composer = PromptComposer::new(PromptTemplates::default(), false);
    /// let passages = vec![ContextPassage {
    ///     label: "Admission".to_string(),
    ///     section_id: "Cap2".to_string(),
    ///     text: "Applicants need a GPA of 3.0.".to_string(),
    ///     references: vec![],
    /// }];
    ///
    /// let request = composer.compose("What is the minimum GPA?", passages).unwrap();
    /// assert!(request.instructions.contains("- Admission"));
    /// ```
    pub fn compose(
        &self,
        question: &str,
        passages: Vec<ContextPassage>,
    ) -> AppResult<GenerationRequest> {
        self.compose_with_rejections(question, passages, &[])
    }

    /// Build a request that also reminds the model which labels it must not
    /// cite again.
    pub fn compose_strict(
        &self,
        question: &str,
        passages: Vec<ContextPassage>,
        rejected: &[String],
    ) -> AppResult<GenerationRequest> {
        self.compose_with_rejections(question, passages, rejected)
    }

    fn compose_with_rejections(
        &self,
        question: &str,
        passages: Vec<ContextPassage>,
        rejected: &[String],
    ) -> AppResult<GenerationRequest> {
        if passages.is_empty() && self.require_context {
            return Err(AppError::EmptyContext(format!(
                "No section cleared the similarity threshold for: {}",
                question.trim()
            )));
        }

        let labels: Vec<&str> = passages.iter().map(|p| p.label.as_str()).collect();

        let mut instructions = if passages.is_empty() {
            render_template(&self.templates.empty, &json!({}))?
        } else {
            render_template(&self.templates.answer, &json!({ "labels": labels }))?
        };

        if !rejected.is_empty() {
            let reminder = render_template(&self.templates.strict, &json!({ "rejected": rejected }))?;
            instructions.push_str("\n\n");
            instructions.push_str(reminder.trim());
        }

        tracing::debug!(
            passages = passages.len(),
            strict = !rejected.is_empty(),
            "Composed generation request"
        );

        Ok(GenerationRequest {
            instructions: instructions.trim_end().to_string(),
            passages,
            question: question.trim().to_string(),
        })
    }
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(PromptTemplates::default(), false)
    }
}

/// Render a Handlebars template with JSON data.
pub(crate) fn render_template(template: &str, data: &serde_json::Value) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text output, labels keep their accents and quotes
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", data)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(label: &str, id: &str) -> ContextPassage {
        ContextPassage {
            label: label.to_string(),
            section_id: id.to_string(),
            text: format!("Body of {}", id),
            references: Vec::new(),
        }
    }

    #[test]
    fn test_render_simple_template() {
        let rendered = render_template("Cite {{label}}", &json!({"label": "Prazos & Recursos"}));
        assert_eq!(rendered.unwrap(), "Cite Prazos & Recursos");
    }

    #[test]
    fn test_compose_lists_allowed_labels_in_order() {
        let composer = PromptComposer::default();
        let request = composer
            .compose(
                "Quem preside a comissão?",
                vec![passage("Comissão", "Cap5"), passage("Disposições Gerais", "Cap9")],
            )
            .unwrap();

        let first = request.instructions.find("- Comissão").unwrap();
        let second = request.instructions.find("- Disposições Gerais").unwrap();
        assert!(first < second);
        assert!(request.instructions.contains("[Section: <label>]"));
        assert_eq!(request.passages[0].section_id, "Cap5");
        assert_eq!(request.question, "Quem preside a comissão?");
    }

    #[test]
    fn test_empty_context_allowed_by_default() {
        let composer = PromptComposer::default();
        let request = composer.compose("What is the minimum GPA?", Vec::new()).unwrap();

        assert!(request.is_empty_context());
        assert!(request.instructions.contains("no relevant section was found"));
        assert!(!request.instructions.contains("Allowed labels"));
    }

    #[test]
    fn test_empty_context_rejected_when_required() {
        let composer = PromptComposer::new(PromptTemplates::default(), true);
        let result = composer.compose("What is the minimum GPA?", Vec::new());
        assert!(matches!(result, Err(AppError::EmptyContext(_))));
    }

    #[test]
    fn test_compose_strict_names_rejected_labels() {
        let composer = PromptComposer::default();
        let request = composer
            .compose_strict(
                "Quem preside a comissão?",
                vec![passage("Comissão", "Cap5")],
                &["Capítulo Inventado".to_string(), "Anexo Z".to_string()],
            )
            .unwrap();

        assert!(request
            .instructions
            .contains("not provided: Capítulo Inventado, Anexo Z."));
    }

    #[test]
    fn test_invalid_template_is_prompt_error() {
        let templates = PromptTemplates {
            answer: "{{#each labels}}unclosed".to_string(),
            ..Default::default()
        };
        let composer = PromptComposer::new(templates, false);
        let result = composer.compose("q", vec![passage("A", "S1")]);
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }
}
