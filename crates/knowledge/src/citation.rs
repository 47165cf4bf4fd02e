//! Citation labels and cross-reference resolution for retrieved sections.

use crate::document::{Document, Section};
use crate::retriever::RetrievalResult;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// A reference to another section found in a section body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossReference {
    /// Text as written in the body, e.g. `art. 12, § 3º`
    pub text: String,

    /// Identifier of the referenced section; `None` when it does not exist
    /// in the loaded document
    pub target: Option<String>,
}

/// How a retrieved section may be cited.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub document: String,
    pub section_id: String,
    /// Label the model must write inside `[Section: ...]`
    pub label: String,
    /// Navigation anchor derived from the label
    pub anchor: String,
    pub cross_refs: Vec<CrossReference>,
}

struct ReferencePatterns {
    /// `Art. 12`, `art. 12, § 3º`, `Artigo 12`, `Article 12 §3`
    regulation: Regex,
    /// Identifier-shaped tokens such as `A2` or `Cap2.Art3`
    literal: Regex,
}

impl ReferencePatterns {
    fn new() -> Self {
        Self {
            regulation: Regex::new(
                r"(?i)\b(?:article|artigo|art\.?)\s*(\d+)\s*[º°o]?(?:\s*,?\s*(?:§|par[áa]grafo|paragraph)\s*(\d+)\s*[º°o]?)?",
            )
            .expect("regulation reference regex should compile"),
            literal: Regex::new(r"\b[A-Za-z]+\d+[A-Za-z0-9]*(?:\.[A-Za-z][A-Za-z0-9]*)*\b")
                .expect("literal reference regex should compile"),
        }
    }
}

fn patterns() -> &'static ReferencePatterns {
    static PATTERNS: OnceLock<ReferencePatterns> = OnceLock::new();
    PATTERNS.get_or_init(ReferencePatterns::new)
}

/// Words that introduce a reference to another section.
const INTRODUCERS: [&str; 4] = ["see", "ver", "vide", "cf."];

/// Maps retrieved sections to citation labels and cross-reference links.
#[derive(Debug, Clone, Default)]
pub struct CitationResolver {
    friendly_names: HashMap<String, String>,
}

impl CitationResolver {
    /// `friendly_names` maps a section id or raw section title, optionally
    /// scoped as `<document>:<key>`, to a label.
    pub fn new(friendly_names: HashMap<String, String>) -> Self {
        Self { friendly_names }
    }

    /// Citations for every hit of `result`, in ranking order.
    ///
    /// Cross-references are resolved within the hit's own document; a hit
    /// whose document is not in `documents` gets no cross-references.
    pub fn resolve(&self, result: &RetrievalResult, documents: &[&Document]) -> Vec<Citation> {
        let mut citations: Vec<Citation> = result
            .hits
            .iter()
            .map(|hit| {
                let document = documents.iter().find(|d| d.name() == hit.document);
                self.cite(document.copied(), &hit.document, &hit.section)
            })
            .collect();

        disambiguate(&mut citations);
        citations
    }

    /// Citations for `sections` of a single document.
    pub fn resolve_sections(&self, document: &Document, sections: &[&Section]) -> Vec<Citation> {
        let mut citations: Vec<Citation> = sections
            .iter()
            .map(|section| self.cite(Some(document), document.name(), section))
            .collect();

        disambiguate(&mut citations);
        citations
    }

    /// Display label for `section` of `document` before disambiguation.
    ///
    /// Lookup order: `<document>:<id>`, `<document>:<title>`, `<id>`,
    /// `<title>`, then the title itself. Square brackets become parentheses
    /// so the label fits inside a `[Section: ...]` marker.
    pub fn label_for(&self, document: &str, section: &Section) -> String {
        let title = section.title.trim();
        let label = self
            .friendly_names
            .get(&format!("{}:{}", document, section.id))
            .or_else(|| self.friendly_names.get(&format!("{}:{}", document, title)))
            .or_else(|| self.friendly_names.get(&section.id))
            .or_else(|| self.friendly_names.get(title))
            .map(String::as_str)
            .unwrap_or(title);

        without_brackets(label)
    }

    fn cite(&self, document: Option<&Document>, name: &str, section: &Section) -> Citation {
        let label = self.label_for(name, section);
        Citation {
            document: name.to_string(),
            section_id: section.id.clone(),
            anchor: slugify(&label),
            label,
            cross_refs: document
                .map(|d| cross_references(d, section))
                .unwrap_or_default(),
        }
    }
}

/// Make repeated labels unique.
///
/// Repeats within one document get the section id appended; repeats across
/// documents get `<document>: <id>`, since ids are only unique per document.
fn disambiguate(citations: &mut [Citation]) {
    let mut documents: HashMap<String, HashSet<String>> = HashMap::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for citation in citations.iter() {
        *counts.entry(citation.label.clone()).or_insert(0) += 1;
        documents
            .entry(citation.label.clone())
            .or_default()
            .insert(citation.document.clone());
    }

    for citation in citations.iter_mut() {
        if counts.get(&citation.label).copied().unwrap_or(0) < 2 {
            continue;
        }
        let across = documents.get(&citation.label).map_or(0, HashSet::len) > 1;
        citation.label = if across {
            without_brackets(&format!(
                "{} ({}: {})",
                citation.label, citation.document, citation.section_id
            ))
        } else {
            format!("{} ({})", citation.label, citation.section_id)
        };
        citation.anchor = slugify(&citation.label);
    }
}

fn without_brackets(label: &str) -> String {
    label.replace('[', "(").replace(']', ")")
}

/// Lowercase slug of ASCII alphanumerics, words joined by `-`.
pub fn slugify(label: &str) -> String {
    let kept: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();

    kept.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Cross-references in the body of `section`, in order of appearance.
pub fn cross_references(document: &Document, section: &Section) -> Vec<CrossReference> {
    let patterns = patterns();
    let body = section.body.as_str();
    let mut found: Vec<(usize, CrossReference)> = Vec::new();
    let mut seen = HashSet::new();

    for caps in patterns.regulation.captures_iter(body) {
        let Some(whole) = caps.get(0) else { continue };
        let mut markers = Vec::new();
        if let Some(article) = caps.get(1) {
            markers.push(format!("Art{}", trim_number(article.as_str())));
        }
        if let Some(paragraph) = caps.get(2) {
            markers.push(format!("Par{}", trim_number(paragraph.as_str())));
        }

        let text = whole.as_str().trim().to_string();
        let target = find_by_suffix(document, &markers).map(|s| s.id.clone());

        match &target {
            Some(id) if *id == section.id => continue,
            Some(_) => {}
            None => tracing::warn!(
                "Unresolved reference '{}' in section '{}' of '{}'",
                text,
                section.id,
                document.name()
            ),
        }

        if seen.insert(text.clone()) {
            found.push((whole.start(), CrossReference { text, target }));
        }
    }

    for token in patterns.literal.find_iter(body) {
        let text = token.as_str();
        if text == section.id {
            continue;
        }

        if document.contains(text) {
            if seen.insert(text.to_string()) {
                found.push((
                    token.start(),
                    CrossReference {
                        text: text.to_string(),
                        target: Some(text.to_string()),
                    },
                ));
            }
        } else if introduced(&body[..token.start()]) {
            tracing::warn!(
                "Section '{}' of '{}' refers to unknown section '{}'",
                section.id,
                document.name(),
                text
            );
            if seen.insert(text.to_string()) {
                found.push((
                    token.start(),
                    CrossReference {
                        text: text.to_string(),
                        target: None,
                    },
                ));
            }
        }
    }

    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, r)| r).collect()
}

fn trim_number(digits: &str) -> &str {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0"
    } else {
        trimmed
    }
}

/// First section, in document order, whose id path ends with `markers`.
fn find_by_suffix<'a>(document: &'a Document, markers: &[String]) -> Option<&'a Section> {
    if markers.is_empty() {
        return None;
    }

    document.sections().iter().find(|section| {
        let path: Vec<&str> = section.id.split('.').collect();
        path.len() >= markers.len()
            && path[path.len() - markers.len()..]
                .iter()
                .zip(markers)
                .all(|(segment, marker)| *segment == marker)
    })
}

/// Whether `before` ends with an introducing word such as "see".
fn introduced(before: &str) -> bool {
    let before = before.trim_end().to_lowercase();
    INTRODUCERS.iter().any(|word| {
        before.ends_with(word)
            && before[..before.len() - word.len()]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric())
    })
}
