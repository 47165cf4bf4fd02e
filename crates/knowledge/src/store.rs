//! SQLite persistence for indexed corpora.
//!
//! One database per document under `.regcite/index/<stem>-<hash>.sqlite`,
//! where the hash is taken from the document's canonical path. A save
//! replaces the whole content in a single transaction; a load checks the
//! stored fingerprint against the current document and embedding signature.

use crate::corpus::{fingerprint, EmbeddingRecord, IndexedCorpus};
use crate::document::Document;
use crate::embeddings::EmbeddingSignature;
use chrono::{DateTime, Utc};
use regcite_core::{AppError, AppResult, IndexBackend};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Metadata stored next to the embeddings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMeta {
    pub document: String,
    pub fingerprint: String,
    pub signature: EmbeddingSignature,
    pub sections: usize,
    pub built_at: DateTime<Utc>,
}

/// Embedding store for one document.
#[derive(Debug, Clone)]
pub struct CorpusStore {
    path: PathBuf,
}

impl CorpusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store location for `document_path` inside `index_dir`.
    ///
    /// Documents sharing a file stem in different directories, or with
    /// different extensions, get different stores.
    pub fn for_document(index_dir: &Path, document_path: &Path) -> Self {
        let stem = document_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());

        let canonical =
            std::fs::canonicalize(document_path).unwrap_or_else(|_| document_path.to_path_buf());
        let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
        let hash = hex::encode(&digest[..6]);

        Self::new(index_dir.join(format!("{}-{}.sqlite", stem, hash)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn open(&self) -> AppResult<Connection> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("Failed to create index directory: {}", e))
            })?;
        }

        let conn = Connection::open(&self.path)
            .map_err(|e| AppError::Storage(format!("Failed to open SQLite index: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS corpus_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS embeddings (
                position INTEGER PRIMARY KEY,
                section_id TEXT NOT NULL UNIQUE,
                vector BLOB NOT NULL
            );
            "#,
        )
        .map_err(|e| AppError::Storage(format!("Failed to create tables: {}", e)))?;

        Ok(conn)
    }

    /// Replace the stored corpus with `corpus`.
    pub fn save(&self, corpus: &IndexedCorpus) -> AppResult<()> {
        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Storage(format!("Failed to begin transaction: {}", e)))?;

        tx.execute_batch("DELETE FROM embeddings; DELETE FROM corpus_meta;")
            .map_err(|e| AppError::Storage(format!("Failed to clear index: {}", e)))?;

        let signature = corpus.signature();
        let meta = [
            ("document", corpus.document().name().to_string()),
            ("fingerprint", corpus.fingerprint().to_string()),
            ("provider", signature.provider.clone()),
            ("model", signature.model.clone()),
            ("dimensions", signature.dimensions.to_string()),
            ("sections", corpus.records().len().to_string()),
            ("built_at", corpus.built_at().to_rfc3339()),
        ];

        for (key, value) in &meta {
            tx.execute(
                "INSERT INTO corpus_meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| AppError::Storage(format!("Failed to write metadata: {}", e)))?;
        }

        {
            let mut stmt = tx
                .prepare("INSERT INTO embeddings (position, section_id, vector) VALUES (?1, ?2, ?3)")
                .map_err(|e| AppError::Storage(format!("Failed to prepare insert: {}", e)))?;

            for (position, record) in corpus.records().iter().enumerate() {
                stmt.execute(params![
                    position as i64,
                    record.section_id,
                    embedding_to_bytes(&record.vector)
                ])
                .map_err(|e| AppError::Storage(format!("Failed to insert embedding: {}", e)))?;
            }
        }

        tx.commit()
            .map_err(|e| AppError::Storage(format!("Failed to commit index: {}", e)))?;

        tracing::debug!(
            "Saved {} embeddings to {:?}",
            corpus.records().len(),
            self.path
        );
        Ok(())
    }

    /// Read stored metadata without loading embeddings.
    pub fn meta(&self) -> AppResult<StoredMeta> {
        if !self.exists() {
            return Err(AppError::StaleIndex(format!("No index at {:?}", self.path)));
        }

        let conn = self.open()?;
        let get = |key: &str| -> AppResult<String> {
            conn.query_row(
                "SELECT value FROM corpus_meta WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| AppError::Storage(format!("Failed to read metadata: {}", e)))?
            .ok_or_else(|| AppError::StaleIndex(format!("Index {:?} has no '{}' entry", self.path, key)))
        };

        let parse_usize = |key: &str| -> AppResult<usize> {
            get(key)?
                .parse()
                .map_err(|e| AppError::Storage(format!("Corrupt '{}' entry: {}", key, e)))
        };

        let built_at = DateTime::parse_from_rfc3339(&get("built_at")?)
            .map_err(|e| AppError::Storage(format!("Corrupt 'built_at' entry: {}", e)))?
            .with_timezone(&Utc);

        Ok(StoredMeta {
            document: get("document")?,
            fingerprint: get("fingerprint")?,
            signature: EmbeddingSignature {
                provider: get("provider")?,
                model: get("model")?,
                dimensions: parse_usize("dimensions")?,
            },
            sections: parse_usize("sections")?,
            built_at,
        })
    }

    /// Load the stored corpus for `document`.
    ///
    /// # Errors
    /// `AppError::StaleIndex` when no index exists, or when the stored
    /// fingerprint, section count, identifiers or dimension do not match the
    /// current document and `signature`.
    pub fn load(
        &self,
        document: Document,
        signature: &EmbeddingSignature,
        backend: IndexBackend,
    ) -> AppResult<IndexedCorpus> {
        let meta = self.meta()?;
        let expected = fingerprint(&document, signature)?;

        if meta.signature != *signature {
            return Err(AppError::StaleIndex(format!(
                "Index for '{}' was built with {}, current embedding is {}",
                meta.document, meta.signature, signature
            )));
        }

        if meta.fingerprint != expected {
            return Err(AppError::StaleIndex(format!(
                "Document '{}' changed since its index was built",
                document.name()
            )));
        }

        let conn = self.open()?;
        let mut stmt = conn
            .prepare("SELECT section_id, vector FROM embeddings ORDER BY position")
            .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(|e| AppError::Storage(format!("Failed to query embeddings: {}", e)))?;

        let mut records = Vec::with_capacity(meta.sections);
        for row in rows {
            let (section_id, bytes) =
                row.map_err(|e| AppError::Storage(format!("Failed to read embedding: {}", e)))?;
            records.push(EmbeddingRecord {
                section_id,
                vector: bytes_to_embedding(&bytes)?,
            });
        }

        tracing::debug!("Loaded {} embeddings from {:?}", records.len(), self.path);

        IndexedCorpus::from_parts(
            document,
            records,
            meta.signature,
            meta.fingerprint,
            meta.built_at,
            backend,
        )
    }
}

/// Convert embedding vector to little-endian bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert stored bytes back to an embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Storage(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
