//! Citation checks on generated answers.
//!
//! Every `[Section: X]` (or `[Seção: X]`) marker must name a citation that
//! was handed to the model, by label, by `document: id` or by an unambiguous
//! section id. Markers that do not
//! are flagged and handled according to the configured [`CitationPolicy`].

use crate::citation::Citation;
use regcite_core::CitationPolicy;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Chat-template end marker; anything after it is discarded.
const END_MARKER: &str = "<|im_end|>";

/// A citation marker that names no allowed section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlaggedCitation {
    /// Label as written by the model
    pub label: String,
    /// Full marker text, e.g. `[Section: Art. 99]`
    pub marker: String,
}

/// Result of validating one generated answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    /// Answer text after the policy was applied
    pub text: String,
    /// Allowed labels cited, in order of first appearance
    pub verified: Vec<String>,
    pub flagged: Vec<FlaggedCitation>,
    /// Set under the reject policy when anything was flagged
    pub rejected: bool,
}

impl ValidationOutcome {
    pub fn is_clean(&self) -> bool {
        self.flagged.is_empty()
    }

    /// Distinct flagged labels, in order of appearance.
    pub fn flagged_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for flag in &self.flagged {
            if !labels.contains(&flag.label) {
                labels.push(flag.label.clone());
            }
        }
        labels
    }
}

struct ValidatorPatterns {
    marker: Regex,
    spaces: Regex,
    space_before_punct: Regex,
}

impl ValidatorPatterns {
    fn new() -> Self {
        Self {
            marker: Regex::new(r"\[\s*(?i:section|se[çc][ãa]o)\s*:\s*([^\]]*?)\s*\]")
                .expect("citation marker regex should compile"),
            spaces: Regex::new(r"[ \t]{2,}").expect("spaces regex should compile"),
            space_before_punct: Regex::new(r"[ \t]+([.,;:!?])")
                .expect("punctuation regex should compile"),
        }
    }
}

fn patterns() -> &'static ValidatorPatterns {
    static PATTERNS: OnceLock<ValidatorPatterns> = OnceLock::new();
    PATTERNS.get_or_init(ValidatorPatterns::new)
}

/// Lowercase with runs of whitespace collapsed to one space.
fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Checks generated answers against the citations that were supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseValidator {
    policy: CitationPolicy,
}

impl ResponseValidator {
    pub fn new(policy: CitationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> CitationPolicy {
        self.policy
    }

    /// Validate `text` against `allowed`.
    ///
    /// Under every policy a flagged marker is never left looking verified:
    /// `annotate` and `reject` rewrite it as `[Section: X (unverified)]`,
    /// `strip` removes it.
    pub fn validate(&self, text: &str, allowed: &[Citation]) -> ValidationOutcome {
        let text = text.split(END_MARKER).next().unwrap_or(text).trim();

        let patterns = patterns();
        let mut verified: Vec<String> = Vec::new();
        let mut flagged: Vec<FlaggedCitation> = Vec::new();

        let rewritten = patterns.marker.replace_all(text, |caps: &regex::Captures| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let label = caps.get(1).map_or("", |m| m.as_str());

            if let Some(citation) = find_allowed(label, allowed) {
                if !verified.contains(&citation.label) {
                    verified.push(citation.label.clone());
                }
                return whole.to_string();
            }

            tracing::warn!("Unverified citation in answer: {}", whole);
            flagged.push(FlaggedCitation {
                label: label.to_string(),
                marker: whole.to_string(),
            });

            match self.policy {
                CitationPolicy::Strip => String::new(),
                CitationPolicy::Annotate | CitationPolicy::Reject => {
                    format!("[Section: {} (unverified)]", label)
                }
            }
        });

        let text = if self.policy == CitationPolicy::Strip && !flagged.is_empty() {
            tidy(&rewritten)
        } else {
            rewritten.into_owned()
        };

        let rejected = self.policy == CitationPolicy::Reject && !flagged.is_empty();

        ValidationOutcome {
            text,
            verified,
            flagged,
            rejected,
        }
    }
}

/// The allowed citation a marker label names.
///
/// A label matches a citation's label, its `<document>: <id>` pair, or its
/// bare section id when no other allowed citation shares that id.
fn find_allowed<'a>(label: &str, allowed: &'a [Citation]) -> Option<&'a Citation> {
    let wanted = normalize(label);
    if wanted.is_empty() {
        return None;
    }

    if let Some(citation) = allowed.iter().find(|c| normalize(&c.label) == wanted) {
        return Some(citation);
    }

    let compact_label = compact(label);
    if let Some(citation) = allowed
        .iter()
        .find(|c| compact(&format!("{}:{}", c.document, c.section_id)) == compact_label)
    {
        return Some(citation);
    }

    let mut by_id = allowed.iter().filter(|c| normalize(&c.section_id) == wanted);
    match (by_id.next(), by_id.next()) {
        (Some(citation), None) => Some(citation),
        (Some(_), Some(_)) => {
            tracing::warn!(
                "Citation '{}' matches sections of several documents",
                label
            );
            None
        }
        _ => None,
    }
}

/// Lowercase with all whitespace removed.
fn compact(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Collapse the gaps left by removed markers.
fn tidy(text: &str) -> String {
    let patterns = patterns();
    let collapsed = patterns.spaces.replace_all(text, " ");
    let punctuated = patterns.space_before_punct.replace_all(&collapsed, "$1");

    punctuated
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
