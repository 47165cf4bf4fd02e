//! Section extraction: flattens a nested document into addressable sections.
//!
//! Identifiers are the `.`-joined markers of a node and its ancestors. A
//! marker is the node's explicit `id`, a typed marker derived from a
//! recognized regulation heading (`Cap2`, `Sec1`, `Art12`, `Par3`,
//! `ParUnico`, `Inc4`, `Alb`), or `S<n>` for the n-th sibling otherwise.

use crate::document::{Document, DocumentSource, Section, SectionNode};
use regcite_core::{AppError, AppResult};
use regex::Regex;
use std::sync::OnceLock;

/// Compiled heading patterns, one per typed marker.
struct MarkerPatterns {
    chapter: Regex,
    division: Regex,
    article: Regex,
    sole_paragraph: Regex,
    paragraph: Regex,
    item: Regex,
    subitem: Regex,
}

impl MarkerPatterns {
    fn new() -> Self {
        Self {
            chapter: Regex::new(r"(?i)^\s*(?:cap[ií]tulo|chapter)\s+([ivxlcdm]+|\d+)\b")
                .expect("chapter regex should compile"),
            division: Regex::new(r"(?i)^\s*(?:se[çc][ãa]o|section)\s+([ivxlcdm]+|\d+)\b")
                .expect("section regex should compile"),
            article: Regex::new(r"(?i)^\s*(?:artigo|article|art\.?)\s*(\d+)")
                .expect("article regex should compile"),
            sole_paragraph: Regex::new(r"(?i)^\s*par[áa]grafo\s+[úu]nico")
                .expect("sole paragraph regex should compile"),
            paragraph: Regex::new(r"(?i)^\s*(?:§|par[áa]grafo|paragraph)\s*(\d+)")
                .expect("paragraph regex should compile"),
            item: Regex::new(r"^\s*([IVXLCDM]+)\s*[-–—]").expect("item regex should compile"),
            subitem: Regex::new(r"^\s*([a-z])\)").expect("subitem regex should compile"),
        }
    }
}

fn patterns() -> &'static MarkerPatterns {
    static PATTERNS: OnceLock<MarkerPatterns> = OnceLock::new();
    PATTERNS.get_or_init(MarkerPatterns::new)
}

/// Flatten a document source into sections in depth-first pre-order.
///
/// # Errors
/// `AppError::MalformedDocument` when the document has no title or no
/// sections, a node has no heading, a node has no body (a blank body is only
/// allowed on a node with children), or two nodes produce the same identifier.
pub fn extract(source: &DocumentSource) -> AppResult<Document> {
    if source.title.trim().is_empty() {
        return Err(AppError::MalformedDocument(
            "Document has no title".to_string(),
        ));
    }

    if source.sections.is_empty() {
        return Err(AppError::MalformedDocument(format!(
            "Document '{}' has no sections",
            source.title
        )));
    }

    let mut sections = Vec::new();
    for (ordinal, node) in source.sections.iter().enumerate() {
        flatten(node, None, ordinal + 1, &mut sections)?;
    }

    tracing::debug!(
        "Extracted {} sections from '{}'",
        sections.len(),
        source.title
    );

    Document::new(source.title.trim(), source.version.clone(), sections)
}

fn flatten(
    node: &SectionNode,
    parent: Option<&Section>,
    ordinal: usize,
    out: &mut Vec<Section>,
) -> AppResult<()> {
    let location = || match parent {
        Some(p) => format!("child {} of '{}'", ordinal, p.id),
        None => format!("top-level section {}", ordinal),
    };

    let title = match node.heading.as_deref().map(str::trim) {
        Some(heading) if !heading.is_empty() => heading.to_string(),
        _ => {
            return Err(AppError::MalformedDocument(format!(
                "{} has no heading",
                location()
            )))
        }
    };

    let body = match node.content.as_deref() {
        Some(content) if !content.trim().is_empty() || !node.children.is_empty() => {
            content.trim().to_string()
        }
        Some(_) => {
            return Err(AppError::MalformedDocument(format!(
                "Section '{}' ({}) has an empty body and no subsections",
                title,
                location()
            )))
        }
        None => {
            return Err(AppError::MalformedDocument(format!(
                "Section '{}' ({}) has no content",
                title,
                location()
            )))
        }
    };

    let marker = match node.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => derive_marker(&title, ordinal),
    };

    let id = match parent {
        Some(p) => format!("{}.{}", p.id, marker),
        None => marker.clone(),
    };

    if out.iter().any(|s| s.id == id) {
        return Err(AppError::MalformedDocument(format!(
            "Duplicate section identifier '{}' (heading '{}')",
            id, title
        )));
    }

    let section = Section {
        id,
        marker,
        title,
        body,
        parent: parent.map(|p| p.id.clone()),
        position: out.len(),
        depth: parent.map(|p| p.depth + 1).unwrap_or(0),
    };

    out.push(section.clone());

    for (child_ordinal, child) in node.children.iter().enumerate() {
        flatten(child, Some(&section), child_ordinal + 1, out)?;
    }

    Ok(())
}

/// Derive a marker from a heading, falling back to `S<ordinal>`.
pub fn derive_marker(heading: &str, ordinal: usize) -> String {
    let p = patterns();

    if let Some(n) = capture_number(&p.chapter, heading) {
        return format!("Cap{}", n);
    }
    if let Some(n) = capture_number(&p.division, heading) {
        return format!("Sec{}", n);
    }
    if let Some(n) = capture_number(&p.article, heading) {
        return format!("Art{}", n);
    }
    if p.sole_paragraph.is_match(heading) {
        return "ParUnico".to_string();
    }
    if let Some(n) = capture_number(&p.paragraph, heading) {
        return format!("Par{}", n);
    }
    if let Some(n) = capture_number(&p.item, heading) {
        return format!("Inc{}", n);
    }
    if let Some(letter) = p.subitem.captures(heading).and_then(|c| c.get(1)) {
        return format!("Al{}", letter.as_str());
    }

    format!("S{}", ordinal)
}

/// Structural level of a regulation heading at the start of `line`, from 1
/// (chapter) to 6 (lettered item), with the byte length of the heading.
///
/// Recognizes the same headings as [`derive_marker`], in the same order.
pub fn heading_level(line: &str) -> Option<(usize, usize)> {
    let p = patterns();

    for (pattern, level) in [(&p.chapter, 1), (&p.division, 2), (&p.article, 3)] {
        if let Some(end) = numbered_prefix(pattern, line) {
            return Some((level, end));
        }
    }
    if let Some(m) = p.sole_paragraph.find(line) {
        return Some((4, m.end()));
    }
    if let Some(end) = numbered_prefix(&p.paragraph, line) {
        return Some((4, end));
    }
    if let Some(end) = numbered_prefix(&p.item, line) {
        return Some((5, end));
    }
    p.subitem.find(line).map(|m| (6, m.end()))
}

/// End of the match when its first capture group is a valid number.
fn numbered_prefix(pattern: &Regex, text: &str) -> Option<usize> {
    let caps = pattern.captures(text)?;
    let token = caps.get(1)?.as_str();
    token.parse::<u32>().ok().or_else(|| parse_roman(token))?;
    caps.get(0).map(|m| m.end())
}

/// First capture group as an arabic or roman number.
fn capture_number(pattern: &Regex, text: &str) -> Option<u32> {
    let token = pattern.captures(text)?.get(1)?.as_str();
    token.parse::<u32>().ok().or_else(|| parse_roman(token))
}

/// Parse a canonical roman numeral (case-insensitive).
pub(crate) fn parse_roman(token: &str) -> Option<u32> {
    fn digit(c: char) -> Option<u32> {
        match c {
            'I' => Some(1),
            'V' => Some(5),
            'X' => Some(10),
            'L' => Some(50),
            'C' => Some(100),
            'D' => Some(500),
            'M' => Some(1000),
            _ => None,
        }
    }

    let upper = token.to_ascii_uppercase();
    let values: Vec<u32> = upper.chars().map(digit).collect::<Option<_>>()?;
    if values.is_empty() {
        return None;
    }

    let mut total = 0;
    for (i, &value) in values.iter().enumerate() {
        match values.get(i + 1) {
            Some(&next) if next > value => total -= value as i64,
            _ => total += value as i64,
        }
    }

    let total = u32::try_from(total).ok().filter(|&n| n > 0)?;

    // Reject non-canonical spellings such as "IIII" or "VX"
    (to_roman(total) == upper).then_some(total)
}

fn to_roman(mut n: u32) -> String {
    const TABLE: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];

    let mut out = String::new();
    for &(value, symbol) in TABLE.iter() {
        while n >= value {
            out.push_str(symbol);
            n -= value;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(heading: &str, content: &str, children: Vec<SectionNode>) -> SectionNode {
        SectionNode {
            heading: Some(heading.to_string()),
            content: Some(content.to_string()),
            id: None,
            children,
        }
    }

    fn regulation() -> DocumentSource {
        DocumentSource {
            title: "Regulamento do Programa".to_string(),
            version: Some("2024".to_string()),
            sections: vec![
                node("CAPÍTULO I - DA FINALIDADE", "O programa tem por finalidade...", vec![]),
                node(
                    "CAPÍTULO II - DO INGRESSO",
                    "",
                    vec![
                        node("Art. 3º", "A seleção é anual.", vec![]),
                        node(
                            "Art. 4º",
                            "São requisitos:",
                            vec![
                                node("I - diploma de graduação", "Obrigatório.", vec![]),
                                node("II - histórico escolar", "Com média mínima.", vec![]),
                                node("§ 1º", "Ver art. 3º.", vec![node("a) estrangeiros", "Diploma revalidado.", vec![])]),
                                node("Parágrafo único", "Casos omissos.", vec![]),
                            ],
                        ),
                    ],
                ),
                node("Disposições finais", "Este regulamento entra em vigor...", vec![]),
            ],
        }
    }

    #[test]
    fn test_flatten_preorder_with_typed_markers() {
        let doc = extract(&regulation()).unwrap();
        let ids: Vec<&str> = doc.sections().iter().map(|s| s.id.as_str()).collect();

        assert_eq!(
            ids,
            vec![
                "Cap1",
                "Cap2",
                "Cap2.Art3",
                "Cap2.Art4",
                "Cap2.Art4.Inc1",
                "Cap2.Art4.Inc2",
                "Cap2.Art4.Par1",
                "Cap2.Art4.Par1.Ala",
                "Cap2.Art4.ParUnico",
                "S3",
            ]
        );

        let par = doc.get("Cap2.Art4.Par1").unwrap();
        assert_eq!(par.parent.as_deref(), Some("Cap2.Art4"));
        assert_eq!(par.depth, 2);
        assert_eq!(par.position, 6);
        assert_eq!(doc.sections()[0].parent, None);
    }

    #[test]
    fn test_reflatten_is_identical() {
        let first = extract(&regulation()).unwrap();
        let second = extract(&first.to_source()).unwrap();
        assert_eq!(first.sections(), second.sections());
        assert_eq!(first.name(), second.name());
    }

    #[test]
    fn test_explicit_id_wins() {
        let mut source = regulation();
        source.sections[0].id = Some("Finalidade".to_string());
        let doc = extract(&source).unwrap();
        assert_eq!(doc.sections()[0].id, "Finalidade");
    }

    #[test]
    fn test_derive_marker_variants() {
        assert_eq!(derive_marker("Chapter 2 - Admission", 1), "Cap2");
        assert_eq!(derive_marker("Seção III", 1), "Sec3");
        assert_eq!(derive_marker("Artigo 12º", 1), "Art12");
        assert_eq!(derive_marker("Article 7", 1), "Art7");
        assert_eq!(derive_marker("Paragraph 3", 1), "Par3");
        assert_eq!(derive_marker("IV - prazo", 1), "Inc4");
        assert_eq!(derive_marker("Admission requirements", 5), "S5");
        // "Civil" is not a roman numeral
        assert_eq!(derive_marker("Chapter civil matters", 2), "S2");
    }

    #[test]
    fn test_heading_level() {
        let level = |line: &'static str| heading_level(line).map(|(l, end)| (l, &line[..end]));

        assert_eq!(level("CAPÍTULO II"), Some((1, "CAPÍTULO II")));
        assert_eq!(level("Seção I - Da Banca"), Some((2, "Seção I")));
        assert_eq!(level("Art. 5º O prazo é de 30 dias."), Some((3, "Art. 5")));
        assert_eq!(level("Parágrafo único. Casos omissos."), Some((4, "Parágrafo único")));
        assert_eq!(level("§ 2º A banca..."), Some((4, "§ 2")));
        assert_eq!(level("IV - histórico"), Some((5, "IV -")));
        assert_eq!(level("b) estrangeiros"), Some((6, "b)")));
        assert_eq!(level("Chapter civil matters"), None);
        assert_eq!(level("O programa tem por finalidade"), None);
    }

    #[test]
    fn test_parse_roman() {
        assert_eq!(parse_roman("XIV"), Some(14));
        assert_eq!(parse_roman("iv"), Some(4));
        assert_eq!(parse_roman("IIII"), None);
        assert_eq!(parse_roman("DID"), None);
    }

    #[test]
    fn test_missing_heading_is_malformed() {
        let mut source = regulation();
        source.sections[2].heading = Some("   ".to_string());
        assert!(matches!(extract(&source), Err(AppError::MalformedDocument(_))));
    }

    #[test]
    fn test_missing_body_is_malformed() {
        let mut source = regulation();
        source.sections[0].content = None;
        assert!(matches!(extract(&source), Err(AppError::MalformedDocument(_))));

        let mut source = regulation();
        source.sections[0].content = Some(" ".to_string());
        let err = extract(&source).unwrap_err();
        assert!(err.to_string().contains("empty body"));
    }

    #[test]
    fn test_duplicate_identifiers_are_malformed() {
        let mut source = regulation();
        source.sections.push(node("CAPÍTULO I", "Repetido", vec![]));
        let err = extract(&source).unwrap_err();
        assert!(err.to_string().contains("Duplicate section identifier 'Cap1'"));
    }

    #[test]
    fn test_empty_document_is_malformed() {
        let source = DocumentSource {
            title: "Vazio".to_string(),
            version: None,
            sections: vec![],
        };
        assert!(matches!(extract(&source), Err(AppError::MalformedDocument(_))));
    }
}
