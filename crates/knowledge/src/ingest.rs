//! Document ingestion: turns extracted regulation text into a section tree.
//!
//! Input is a PDF, docling-style markdown or plain text. The text is cleaned
//! of extraction artifacts, then split on markdown headings and on recognized
//! regulation headings (`CAPÍTULO II`, `Art. 5º`, `§ 1º`, `IV -`, `b)`),
//! which nest by their structural level.

use crate::document::{Document, DocumentSource, SectionNode};
use crate::extractor::{derive_marker, extract, heading_level};
use regcite_core::{AppError, AppResult};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

/// Below this score extracted text is probably garbled.
pub const MIN_TEXT_QUALITY: f32 = 0.5;

/// Heading given to text that precedes the first heading.
const PREAMBLE_HEADING: &str = "Preamble";

/// UTF-8 read as Latin-1, plus typical PDF glyph-mapping errors.
const MOJIBAKE: &[(&str, &str)] = &[
    ("Ã§", "ç"),
    ("Ã£", "ã"),
    ("Ã¡", "á"),
    ("Ã©", "é"),
    ("Ã³", "ó"),
    ("Ãµ", "õ"),
    ("Ãª", "ê"),
    ("Ã¢", "â"),
    ("Ãº", "ú"),
    ("Ã\u{ad}", "í"),
    ("PîS", "Pós"),
    ("Gradua,ÌO", "Graduação"),
    ("CAPêTULO", "CAPÍTULO"),
    ("â€œ", "\""),
    ("â€\u{9d}", "\""),
    ("â€™", "'"),
    ("â€“", "-"),
];

struct IngestPatterns {
    markdown_heading: Regex,
    hyphenated: Regex,
    spaces: Regex,
    blank_runs: Regex,
}

impl IngestPatterns {
    fn new() -> Self {
        Self {
            markdown_heading: Regex::new(r"^(#{1,6})\s+(.+?)\s*#*$")
                .expect("markdown heading regex should compile"),
            hyphenated: Regex::new(r"(\w+)-[ \t]*\n[ \t]*(\w+)")
                .expect("hyphenation regex should compile"),
            spaces: Regex::new(r"[ \t]+").expect("spaces regex should compile"),
            blank_runs: Regex::new(r"\n{3,}").expect("blank line regex should compile"),
        }
    }
}

fn patterns() -> &'static IngestPatterns {
    static PATTERNS: OnceLock<IngestPatterns> = OnceLock::new();
    PATTERNS.get_or_init(IngestPatterns::new)
}

/// A document produced from raw text.
#[derive(Debug, Clone)]
pub struct ImportedDocument {
    pub source: DocumentSource,
    /// The flattened form, proving the source is well formed
    pub document: Document,
    /// Score of the raw text, see [`text_quality`]
    pub quality: f32,
}

/// Summary of an import for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub title: String,
    pub sections: usize,
    pub quality: f32,
    pub output: std::path::PathBuf,
}

/// Read `path`, clean it and structure it into a document.
///
/// The title is `title` when given, else the first level-one markdown heading,
/// else the file stem.
///
/// # Errors
/// `AppError::MalformedDocument` when the file cannot be read as text or the
/// structured result is not a valid document (for example, no text at all).
pub fn import_file(path: &Path, title: Option<&str>) -> AppResult<ImportedDocument> {
    let raw = read_text(path)?;
    let quality = text_quality(&raw);
    if quality < MIN_TEXT_QUALITY {
        tracing::warn!(
            "Text extracted from {:?} scores {:.2}; it may be garbled",
            path,
            quality
        );
    }

    let cleaned = sanitize(&raw);
    let mut source = structure(&cleaned, title);
    if source.title.is_empty() {
        source.title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Untitled".to_string());
    }

    let document = extract(&source)?;
    tracing::info!(
        "Imported '{}' from {:?}: {} sections (quality {:.2})",
        document.name(),
        path,
        document.len(),
        quality
    );

    Ok(ImportedDocument {
        source,
        document,
        quality,
    })
}

/// Raw text of a `.pdf`, `.md`, `.markdown` or `.txt` file.
pub fn read_text(path: &Path) -> AppResult<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => pdf_text(path),
        Some("md") | Some("markdown") | Some("txt") => Ok(std::fs::read_to_string(path)?),
        _ => Err(AppError::MalformedDocument(format!(
            "Unsupported input format: {:?} (expected .pdf, .md or .txt)",
            path
        ))),
    }
}

fn pdf_text(path: &Path) -> AppResult<String> {
    let doc = lopdf::Document::load(path).map_err(|e| {
        AppError::MalformedDocument(format!("Failed to load PDF {:?}: {}", path, e))
    })?;

    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    tracing::debug!(page_count = pages.len(), "Extracting text from PDF");

    let mut text = String::new();
    for page in pages {
        match doc.extract_text(&[page]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                tracing::warn!(page, error = %e, "Failed to extract text from page, skipping");
            }
        }
    }

    if text.trim().is_empty() {
        return Err(AppError::MalformedDocument(format!(
            "No text could be extracted from {:?}",
            path
        )));
    }

    Ok(text)
}

/// Heuristic score in `[0, 1]` of how cleanly text was extracted.
///
/// Weighs the share of ordinary characters, a word-like share of spaces and
/// the absence of replacement characters. Texts under 100 characters score 0.
pub fn text_quality(text: &str) -> f32 {
    let total = text.chars().count();
    if total < 100 {
        return 0.0;
    }
    let total = total as f32;

    let ordinary = text
        .chars()
        .filter(|c| {
            c.is_alphanumeric() || c.is_whitespace() || ",.;:!?()[]{}@#$%&*_+-=/\"'º°§".contains(*c)
        })
        .count() as f32;
    let spaces = text.chars().filter(|c| *c == ' ').count() as f32 / total;
    let broken = text
        .chars()
        .filter(|c| matches!(c, '\u{fffd}' | '\0'))
        .count() as f32
        / total;

    let spacing = if (0.1..0.3).contains(&spaces) { 1.0 } else { 0.0 };
    (ordinary / total) * 0.6 + spacing * 0.2 + (1.0 - (broken * 10.0).min(1.0)) * 0.2
}

/// Repair common extraction artifacts.
///
/// Fixes mis-decoded accents, drops control and invisible characters,
/// straightens typographic quotes, rejoins words hyphenated across lines and
/// collapses runs of spaces and blank lines. Line structure is kept.
pub fn sanitize(text: &str) -> String {
    let mut fixed = text.to_string();
    for (broken, repaired) in MOJIBAKE {
        if fixed.contains(broken) {
            fixed = fixed.replace(broken, repaired);
        }
    }

    let visible: String = fixed
        .chars()
        .filter_map(|c| match c {
            '\n' | '\t' => Some(c),
            '\u{ad}' | '\u{200b}' | '\u{feff}' | '\u{fffd}' => None,
            '\u{201c}' | '\u{201d}' => Some('"'),
            '\u{2018}' | '\u{2019}' => Some('\''),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();

    let p = patterns();
    let joined = p.hyphenated.replace_all(&visible, "${1}${2}");
    let lines: Vec<String> = joined
        .lines()
        .map(|line| p.spaces.replace_all(line.trim(), " ").into_owned())
        .collect();

    p.blank_runs
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// A heading line split into its level, heading and trailing text.
#[derive(Debug, PartialEq)]
struct HeadingLine {
    level: usize,
    heading: String,
    rest: String,
}

fn parse_heading(line: &str) -> Option<HeadingLine> {
    let plain = line.replace("**", "");

    if let Some(caps) = patterns().markdown_heading.captures(&plain) {
        let hashes = caps.get(1).map_or(1, |m| m.as_str().len());
        let text = caps.get(2).map_or("", |m| m.as_str()).trim();
        return Some(match heading_level(text) {
            Some((level, end)) => split_heading(text, level, end),
            None => HeadingLine {
                level: hashes,
                heading: text.to_string(),
                rest: String::new(),
            },
        });
    }

    let text = plain.trim();
    heading_level(text).map(|(level, end)| split_heading(text, level, end))
}

fn split_heading(text: &str, level: usize, end: usize) -> HeadingLine {
    let (head, tail) = text.split_at(end);
    let ordinal = tail.len() - tail.trim_start_matches(|c: char| c == 'º' || c == '°').len();
    let rest = tail[ordinal..].trim_start_matches(|c: char| {
        c.is_whitespace() || matches!(c, '.' | '-' | '–' | '—' | ':')
    });

    HeadingLine {
        level,
        heading: format!("{}{}", head, &tail[..ordinal]).trim().to_string(),
        rest: rest.trim().to_string(),
    }
}

/// Split cleaned text into a section tree.
///
/// Headings nest by level: a heading closes every open section of the same
/// or a deeper level. Text before the first heading becomes a preamble
/// section. A heading with neither text nor subsections uses its heading as
/// its body. Repeated sibling headings get explicit, numbered markers.
pub fn structure(text: &str, title: Option<&str>) -> DocumentSource {
    let mut title = title.map(|t| t.trim().to_string()).unwrap_or_default();
    let mut roots: Vec<SectionNode> = Vec::new();
    let mut open: Vec<(usize, SectionNode)> = Vec::new();
    let mut preamble: Vec<&str> = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_heading(line) {
            // A leading plain H1 names the document
            Some(parsed)
                if title.is_empty()
                    && parsed.level == 1
                    && open.is_empty()
                    && roots.is_empty()
                    && heading_level(&parsed.heading).is_none() =>
            {
                title = parsed.heading;
            }
            Some(parsed) => {
                close_to(&mut open, &mut roots, parsed.level);
                open.push((
                    parsed.level,
                    SectionNode {
                        heading: Some(parsed.heading),
                        content: Some(parsed.rest),
                        ..SectionNode::default()
                    },
                ));
            }
            None => match open.last_mut() {
                Some((_, node)) => append_line(node, line),
                None => preamble.push(line),
            },
        }
    }
    close_to(&mut open, &mut roots, 0);

    if !preamble.is_empty() {
        roots.insert(
            0,
            SectionNode {
                heading: Some(PREAMBLE_HEADING.to_string()),
                content: Some(preamble.join("\n")),
                ..SectionNode::default()
            },
        );
    }

    fill_empty_leaves(&mut roots);
    number_repeated_markers(&mut roots);

    DocumentSource {
        title,
        version: None,
        sections: roots,
    }
}

/// Close open sections at `level` or deeper, attaching each to its parent.
fn close_to(open: &mut Vec<(usize, SectionNode)>, roots: &mut Vec<SectionNode>, level: usize) {
    while open.last().is_some_and(|(l, _)| *l >= level) {
        let Some((_, node)) = open.pop() else { break };
        match open.last_mut() {
            Some((_, parent)) => parent.children.push(node),
            None => roots.push(node),
        }
    }
}

fn append_line(node: &mut SectionNode, line: &str) {
    let content = node.content.get_or_insert_with(String::new);
    if !content.is_empty() {
        content.push('\n');
    }
    content.push_str(line);
}

fn fill_empty_leaves(nodes: &mut [SectionNode]) {
    for node in nodes {
        let blank = node.content.as_deref().map_or(true, |c| c.trim().is_empty());
        if blank && node.children.is_empty() {
            node.content = node.heading.clone();
        }
        fill_empty_leaves(&mut node.children);
    }
}

/// Give the second and later siblings sharing a marker an explicit
/// `<marker>-<n>` id so identifiers stay unique.
fn number_repeated_markers(nodes: &mut [SectionNode]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for (ordinal, node) in nodes.iter_mut().enumerate() {
        let heading = node.heading.as_deref().unwrap_or_default();
        let marker = derive_marker(heading, ordinal + 1);
        let count = seen.entry(marker.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            node.id = Some(format!("{}-{}", marker, count));
        }
        number_repeated_markers(&mut node.children);
    }
}
