//! Prompt types for regcite.
//!
//! A `GenerationRequest` is the immutable value handed to the generation
//! service: citation instructions, ranked context passages and the question.

use serde::{Deserialize, Serialize};

/// A prompt definition loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Instruction templates (Handlebars)
    pub templates: PromptTemplates,
}

/// Handlebars templates used to render the system instructions.
///
/// Templates see `labels` (the allowed citation labels, in ranking order)
/// and, for `strict`, `rejected` (labels refused on the previous attempt).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptTemplates {
    /// Instructions when at least one passage was retrieved
    pub answer: String,

    /// Instructions when retrieval produced nothing
    pub empty: String,

    /// Reminder appended when regenerating after rejected citations
    pub strict: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            answer: DEFAULT_ANSWER_TEMPLATE.to_string(),
            empty: DEFAULT_EMPTY_TEMPLATE.to_string(),
            strict: DEFAULT_STRICT_TEMPLATE.to_string(),
        }
    }
}

const DEFAULT_ANSWER_TEMPLATE: &str = "\
You are an assistant that answers questions about institutional regulations.
Use only the information contained in the sections provided in the context.
Every factual claim must be followed by a citation written exactly as [Section: <label>], where <label> is one of the allowed labels below.
Never invent section names or identifiers, and never cite a section that is not listed.
If the sections do not contain the answer, say so.

Allowed labels:
{{#each labels}}- {{this}}
{{/each}}";

const DEFAULT_EMPTY_TEMPLATE: &str = "\
You are an assistant that answers questions about institutional regulations.
No section of the regulation was found relevant to this question.
Tell the user that no relevant section was found. Do not cite any section and do not answer from memory.";

const DEFAULT_STRICT_TEMPLATE: &str = "\
Your previous answer cited sections that were not provided: {{#each rejected}}{{this}}{{#unless @last}}, {{/unless}}{{/each}}.
Cite only the allowed labels listed above.";

/// A resolved or unresolved cross-reference noted on a passage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassageReference {
    /// Text as it appears in the section body
    pub text: String,

    /// Identifier of the referenced section, when it exists
    pub target: Option<String>,
}

/// One retrieved section as presented to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextPassage {
    /// Citation label the model must use
    pub label: String,

    /// Section identifier
    pub section_id: String,

    /// Section body
    pub text: String,

    /// Cross-references found in the body
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<PassageReference>,
}

/// A fully composed generation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    /// System instructions constraining citation behaviour
    pub instructions: String,

    /// Context passages in retrieval ranking order
    pub passages: Vec<ContextPassage>,

    /// The user's question
    pub question: String,
}

impl GenerationRequest {
    /// Whether the request carries no context at all.
    pub fn is_empty_context(&self) -> bool {
        self.passages.is_empty()
    }

    /// Labels the model is allowed to cite, in ranking order.
    pub fn allowed_labels(&self) -> Vec<&str> {
        self.passages.iter().map(|p| p.label.as_str()).collect()
    }

    /// Render the user message: tagged section blocks followed by the question.
    pub fn render_user_prompt(&self) -> String {
        let mut out = String::new();

        for passage in &self.passages {
            out.push_str(&format!(
                "<section name=\"{}\" id=\"{}\">\n{}\n",
                passage.label,
                passage.section_id,
                passage.text.trim()
            ));

            let resolved: Vec<String> = passage
                .references
                .iter()
                .filter_map(|r| r.target.as_ref().map(|t| format!("{} -> {}", r.text, t)))
                .collect();
            if !resolved.is_empty() {
                out.push_str(&format!("References: {}\n", resolved.join("; ")));
            }

            out.push_str("</section>\n\n");
        }

        out.push_str(&format!("Question: {}", self.question.trim()));
        out
    }
}
