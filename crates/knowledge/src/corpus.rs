//! Indexed corpus: a document plus one embedding per section.
//!
//! An `IndexedCorpus` is immutable once built. `CorpusHandle` holds the
//! current corpus behind an `Arc`; readers take a snapshot and a rebuild
//! swaps a finished corpus in, so a query never sees a half-built index.

use crate::document::{Document, Section};
use crate::embeddings::{l2_normalize, EmbeddingProvider, EmbeddingSignature};
use crate::progress::ProgressReporter;
use crate::vector_index::{build_backend, NearestNeighbors};
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use regcite_core::config::AppConfig;
use regcite_core::{AppError, AppResult, IndexBackend};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Embedding of one section.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub section_id: String,
    /// Unit-length vector
    pub vector: Vec<f32>,
}

/// Knobs for an index build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Sections embedded concurrently
    pub concurrency: usize,
    /// Deadline for one section embedding
    pub timeout: Duration,
    /// Nearest-neighbor backend for lookups
    pub backend: IndexBackend,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout: Duration::from_secs(30),
            backend: IndexBackend::Flat,
        }
    }
}

impl BuildOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            concurrency: config.embedding.concurrency.max(1),
            timeout: Duration::from_secs(config.embedding.timeout_secs),
            backend: config.retrieval.backend,
        }
    }
}

/// Text embedded for a section: its heading as a markdown title, then the body.
pub fn section_embedding_text(section: &Section) -> String {
    format!("## {}\n{}", section.title, section.body)
}

/// SHA-256 over the canonical document tree and the embedding signature.
pub fn fingerprint(document: &Document, signature: &EmbeddingSignature) -> AppResult<String> {
    let canonical = serde_json::to_vec(&document.to_source())?;

    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    hasher.update(signature.to_string().as_bytes());

    Ok(hex::encode(hasher.finalize()))
}

/// A document with its section embeddings and lookup backend.
#[derive(Debug)]
pub struct IndexedCorpus {
    document: Document,
    records: Vec<EmbeddingRecord>,
    signature: EmbeddingSignature,
    fingerprint: String,
    built_at: DateTime<Utc>,
    neighbors: Box<dyn NearestNeighbors>,
}

impl IndexedCorpus {
    /// Embed every section of `document` and build the lookup backend.
    ///
    /// Sections are embedded independently, up to `options.concurrency` at a
    /// time, and collected in document order. Any failure aborts the build.
    pub async fn build(
        document: Document,
        provider: &dyn EmbeddingProvider,
        options: &BuildOptions,
        progress: &ProgressReporter,
    ) -> AppResult<Self> {
        let signature = provider.signature();
        let total = document.len() as u64;
        let embedded = AtomicU64::new(0);

        tracing::info!(
            "Embedding {} sections of '{}' with {}",
            total,
            document.name(),
            signature
        );

        let vectors: Vec<Vec<f32>> = futures::stream::iter(document.sections())
            .map(|section| {
                let signature = &signature;
                let embedded = &embedded;
                async move {
                    let text = section_embedding_text(section);
                    let mut vector = embed_with_deadline(provider, &text, options.timeout)
                        .await
                        .map_err(|e| section_error(&section.id, e))?;

                    if vector.len() != signature.dimensions {
                        return Err(AppError::EmbeddingService(format!(
                            "Section '{}': got {} dimensions, expected {}",
                            section.id,
                            vector.len(),
                            signature.dimensions
                        )));
                    }

                    l2_normalize(&mut vector);

                    let done = embedded.fetch_add(1, Ordering::Relaxed) + 1;
                    progress.embed(done, total, &signature.model);

                    Ok(vector)
                }
            })
            .buffered(options.concurrency.max(1))
            .try_collect()
            .await?;

        let records = document
            .sections()
            .iter()
            .zip(vectors)
            .map(|(section, vector)| EmbeddingRecord {
                section_id: section.id.clone(),
                vector,
            })
            .collect();

        let fingerprint = fingerprint(&document, &signature)?;
        Self::from_parts(
            document,
            records,
            signature,
            fingerprint,
            Utc::now(),
            options.backend,
        )
    }

    /// Assemble a corpus from previously computed records.
    ///
    /// # Errors
    /// `AppError::StaleIndex` when the records do not line up with the
    /// document's sections or the signature's dimension.
    pub fn from_parts(
        document: Document,
        records: Vec<EmbeddingRecord>,
        signature: EmbeddingSignature,
        fingerprint: String,
        built_at: DateTime<Utc>,
        backend: IndexBackend,
    ) -> AppResult<Self> {
        if records.len() != document.len() {
            return Err(AppError::StaleIndex(format!(
                "'{}' has {} sections but {} embeddings",
                document.name(),
                document.len(),
                records.len()
            )));
        }

        for (section, record) in document.sections().iter().zip(&records) {
            if section.id != record.section_id {
                return Err(AppError::StaleIndex(format!(
                    "Embedding for '{}' found where '{}' was expected",
                    record.section_id, section.id
                )));
            }
            if record.vector.len() != signature.dimensions {
                return Err(AppError::StaleIndex(format!(
                    "Embedding for '{}' has {} dimensions, expected {}",
                    record.section_id,
                    record.vector.len(),
                    signature.dimensions
                )));
            }
        }

        let vectors: Vec<Vec<f32>> = records.iter().map(|r| r.vector.clone()).collect();
        let neighbors = build_backend(backend, &vectors, signature.dimensions);

        Ok(Self {
            document,
            records,
            signature,
            fingerprint,
            built_at,
            neighbors,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    pub fn signature(&self) -> &EmbeddingSignature {
        &self.signature
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn backend_name(&self) -> &'static str {
        self.neighbors.backend_name()
    }

    /// Up to `k` sections most similar to `vector`, best first.
    pub fn nearest(&self, vector: &[f32], k: usize) -> Vec<(&Section, f32)> {
        self.neighbors
            .query(vector, k)
            .into_iter()
            .filter_map(|hit| self.document.at(hit.position).map(|s| (s, hit.score)))
            .collect()
    }

    pub fn stats(&self) -> CorpusStats {
        CorpusStats {
            document: self.document.name().to_string(),
            version: self.document.version().map(str::to_string),
            sections: self.document.len(),
            signature: self.signature.clone(),
            backend: self.backend_name().to_string(),
            fingerprint: self.fingerprint.clone(),
            built_at: self.built_at,
        }
    }
}

/// Summary of a corpus for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusStats {
    pub document: String,
    pub version: Option<String>,
    pub sections: usize,
    pub signature: EmbeddingSignature,
    pub backend: String,
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
}

async fn embed_with_deadline(
    provider: &dyn EmbeddingProvider,
    text: &str,
    timeout: Duration,
) -> AppResult<Vec<f32>> {
    match tokio::time::timeout(timeout, provider.embed(text)).await {
        Ok(result) => result,
        Err(_) => Err(AppError::timeout("section embedding", timeout)),
    }
}

fn section_error(section_id: &str, err: AppError) -> AppError {
    match err {
        AppError::Timeout { .. } => err,
        other => AppError::EmbeddingService(format!("Section '{}': {}", section_id, other)),
    }
}

/// Shared slot for the current corpus of one document.
#[derive(Debug)]
pub struct CorpusHandle {
    current: RwLock<Arc<IndexedCorpus>>,
}

impl CorpusHandle {
    pub fn new(corpus: IndexedCorpus) -> Self {
        Self {
            current: RwLock::new(Arc::new(corpus)),
        }
    }

    /// The corpus as of now; unaffected by later swaps.
    pub fn snapshot(&self) -> Arc<IndexedCorpus> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install `corpus`, returning the one it replaced.
    pub fn replace(&self, corpus: IndexedCorpus) -> Arc<IndexedCorpus> {
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, Arc::new(corpus))
    }

    /// Run `build` and swap its result in only if it succeeds.
    ///
    /// The lock is not held while building; readers keep using the previous
    /// corpus until the swap.
    pub async fn rebuild<F>(&self, build: F) -> AppResult<Arc<IndexedCorpus>>
    where
        F: Future<Output = AppResult<IndexedCorpus>>,
    {
        match build.await {
            Ok(corpus) => {
                self.replace(corpus);
                tracing::info!("Swapped in rebuilt corpus");
                Ok(self.snapshot())
            }
            Err(e) => {
                tracing::warn!("Rebuild failed, keeping previous corpus: {}", e);
                Err(e)
            }
        }
    }
}
