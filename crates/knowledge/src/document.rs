//! Regulation document model.
//!
//! `DocumentSource` is the nested tree read from disk; `Document` is the
//! flattened, immutable form every other component works with.

use regcite_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A regulation document as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSource {
    /// Document-level name
    pub title: String,

    /// Optional version tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Top-level sections in reading order
    #[serde(default)]
    pub sections: Vec<SectionNode>,
}

/// One node of the section tree.
///
/// `heading` and `content` are optional at the serde level so that a missing
/// field is reported as a malformed document rather than a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SectionNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Explicit marker, used verbatim instead of one derived from the heading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SectionNode>,
}

/// An addressable section of a flattened document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    /// Hierarchy path, e.g. `Cap2.Art3.Par2`
    pub id: String,

    /// This node's own marker (last segment of `id`)
    pub marker: String,

    /// Human-readable heading
    pub title: String,

    /// Body text
    pub body: String,

    /// Identifier of the enclosing section
    pub parent: Option<String>,

    /// 0-based index in the flattened sequence
    pub position: usize,

    /// 0 for top-level sections
    pub depth: usize,
}

/// A flattened regulation document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    name: String,
    version: Option<String>,
    sections: Vec<Section>,
    positions: HashMap<String, usize>,
}

impl Document {
    /// Assemble a document from sections in reading order.
    ///
    /// Fails when identifiers repeat, positions are out of sequence, or a
    /// parent identifier does not name an earlier section.
    pub fn new(
        name: impl Into<String>,
        version: Option<String>,
        sections: Vec<Section>,
    ) -> AppResult<Self> {
        let mut positions = HashMap::with_capacity(sections.len());

        for (index, section) in sections.iter().enumerate() {
            if section.position != index {
                return Err(AppError::MalformedDocument(format!(
                    "Section '{}' has position {} but appears at {}",
                    section.id, section.position, index
                )));
            }

            if let Some(parent) = &section.parent {
                if !positions.contains_key(parent) {
                    return Err(AppError::MalformedDocument(format!(
                        "Section '{}' references unknown parent '{}'",
                        section.id, parent
                    )));
                }
            }

            if positions.insert(section.id.clone(), index).is_some() {
                return Err(AppError::MalformedDocument(format!(
                    "Duplicate section identifier '{}'",
                    section.id
                )));
            }
        }

        Ok(Self {
            name: name.into(),
            version,
            sections,
            positions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Sections in reading order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Look up a section by identifier.
    pub fn get(&self, id: &str) -> Option<&Section> {
        self.positions.get(id).map(|&i| &self.sections[i])
    }

    /// Section at a flattened position.
    pub fn at(&self, position: usize) -> Option<&Section> {
        self.sections.get(position)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Rebuild the nested source tree from parent links.
    ///
    /// Every node carries its marker as an explicit id, so extracting the
    /// result again yields the same section sequence.
    pub fn to_source(&self) -> DocumentSource {
        let mut roots = Vec::new();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.sections.len()];

        for (index, section) in self.sections.iter().enumerate() {
            match section.parent.as_ref().and_then(|p| self.positions.get(p)) {
                Some(&parent) => children[parent].push(index),
                None => roots.push(index),
            }
        }

        fn build(sections: &[Section], children: &[Vec<usize>], index: usize) -> SectionNode {
            let section = &sections[index];
            SectionNode {
                heading: Some(section.title.clone()),
                content: Some(section.body.clone()),
                id: Some(section.marker.clone()),
                children: children[index]
                    .iter()
                    .map(|&kid| build(sections, children, kid))
                    .collect(),
            }
        }

        DocumentSource {
            title: self.name.clone(),
            version: self.version.clone(),
            sections: roots
                .into_iter()
                .map(|root| build(&self.sections, &children, root))
                .collect(),
        }
    }
}

/// Read a document source from a `.json`, `.yaml` or `.yml` file.
pub fn load_source(path: &Path) -> AppResult<DocumentSource> {
    let contents = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let parsed: Result<DocumentSource, String> = match extension.as_deref() {
        Some("json") => serde_json::from_str(&contents).map_err(|e| e.to_string()),
        Some("yaml") | Some("yml") => serde_yaml::from_str(&contents).map_err(|e| e.to_string()),
        _ => {
            return Err(AppError::MalformedDocument(format!(
                "Unsupported document format: {:?} (expected .json, .yaml or .yml)",
                path
            )))
        }
    };

    parsed.map_err(|e| AppError::MalformedDocument(format!("Failed to parse {:?}: {}", path, e)))
}

/// Write a document source as `.json`, `.yaml` or `.yml`.
pub fn save_source(path: &Path, source: &DocumentSource) -> AppResult<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let contents = match extension.as_deref() {
        Some("json") => serde_json::to_string_pretty(source)?,
        Some("yaml") | Some("yml") => serde_yaml::to_string(source)?,
        _ => {
            return Err(AppError::Config(format!(
                "Unsupported output format: {:?} (expected .json, .yaml or .yml)",
                path
            )))
        }
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;

    tracing::debug!("Wrote document '{}' to {:?}", source.title, path);
    Ok(())
}

/// Read and flatten a document file.
pub fn load_document(path: &Path) -> AppResult<(DocumentSource, Document)> {
    let source = load_source(path)?;
    let document = crate::extractor::extract(&source)?;

    tracing::debug!(
        "Loaded document '{}' from {:?}: {} sections",
        document.name(),
        path,
        document.len()
    );

    Ok((source, document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn section(id: &str, parent: Option<&str>, position: usize) -> Section {
        Section {
            id: id.to_string(),
            marker: id.rsplit('.').next().unwrap_or(id).to_string(),
            title: format!("Title {}", id),
            body: format!("Body {}", id),
            parent: parent.map(str::to_string),
            position,
            depth: parent.map(|p| p.matches('.').count() + 1).unwrap_or(0),
        }
    }

    #[test]
    fn test_document_lookup() {
        let doc = Document::new(
            "Regulamento",
            None,
            vec![section("Cap1", None, 0), section("Cap1.Art1", Some("Cap1"), 1)],
        )
        .unwrap();

        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get("Cap1.Art1").map(|s| s.position), Some(1));
        assert!(doc.get("Cap2").is_none());
    }

    #[test]
    fn test_document_rejects_duplicates() {
        let result = Document::new(
            "Regulamento",
            None,
            vec![section("Cap1", None, 0), section("Cap1", None, 1)],
        );
        assert!(matches!(result, Err(AppError::MalformedDocument(_))));
    }

    #[test]
    fn test_document_rejects_dangling_parent() {
        let result = Document::new("Regulamento", None, vec![section("Cap1.Art1", Some("Cap1"), 0)]);
        assert!(matches!(result, Err(AppError::MalformedDocument(_))));
    }

    #[test]
    fn test_to_source_rebuilds_nesting() {
        let doc = Document::new(
            "Regulamento",
            Some("2024".to_string()),
            vec![
                section("Cap1", None, 0),
                section("Cap1.Art1", Some("Cap1"), 1),
                section("Cap1.Art2", Some("Cap1"), 2),
                section("Cap2", None, 3),
            ],
        )
        .unwrap();

        let source = doc.to_source();
        assert_eq!(source.version.as_deref(), Some("2024"));
        assert_eq!(source.sections.len(), 2);
        assert_eq!(source.sections[0].children.len(), 2);
        assert_eq!(source.sections[0].children[1].id.as_deref(), Some("Art2"));
        assert!(source.sections[1].children.is_empty());
    }

    #[test]
    fn test_load_yaml_and_json() {
        let temp = TempDir::new().unwrap();

        let yaml_path = temp.path().join("reg.yaml");
        fs::write(
            &yaml_path,
            "title: Regulamento\nsections:\n  - heading: CAPÍTULO I\n    content: Disposições\n",
        )
        .unwrap();
        let (_, doc) = load_document(&yaml_path).unwrap();
        assert_eq!(doc.sections()[0].id, "Cap1");

        let json_path = temp.path().join("reg.json");
        fs::write(
            &json_path,
            r#"{"title": "Regulamento", "sections": [{"heading": "Art. 3", "content": "Texto"}]}"#,
        )
        .unwrap();
        let (_, doc) = load_document(&json_path).unwrap();
        assert_eq!(doc.sections()[0].id, "Art3");
    }

    #[test]
    fn test_save_source_round_trips() {
        let temp = TempDir::new().unwrap();
        let source: DocumentSource = serde_json::from_value(serde_json::json!({
            "title": "Regulamento",
            "sections": [{"heading": "CAPÍTULO I", "content": "", "children": [
                {"heading": "Art. 1º", "content": "Disposições gerais."}
            ]}]
        }))
        .unwrap();

        for name in ["out/reg.yaml", "out/reg.json"] {
            let path = temp.path().join(name);
            save_source(&path, &source).unwrap();
            assert_eq!(load_source(&path).unwrap(), source);
        }

        let unsupported = save_source(&temp.path().join("reg.txt"), &source);
        assert!(matches!(unsupported, Err(AppError::Config(_))));
    }

    #[test]
    fn test_load_rejects_bad_input() {
        let temp = TempDir::new().unwrap();

        let txt = temp.path().join("reg.txt");
        fs::write(&txt, "plain").unwrap();
        assert!(matches!(load_source(&txt), Err(AppError::MalformedDocument(_))));

        let broken = temp.path().join("reg.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(load_source(&broken), Err(AppError::MalformedDocument(_))));
    }
}
