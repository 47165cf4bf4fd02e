//! Regulation knowledge base.
//!
//! Turns structured regulation documents into searchable section indexes and
//! answers questions from them with verifiable citations. Indexes are kept
//! locally in SQLite, one per document.

pub mod citation;
pub mod corpus;
pub mod document;
pub mod embeddings;
pub mod extractor;
pub mod ingest;
pub mod progress;
pub mod rag;
pub mod retriever;
pub mod store;
pub mod validator;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use citation::{Citation, CitationResolver, CrossReference};
pub use corpus::{BuildOptions, CorpusHandle, CorpusStats, EmbeddingRecord, IndexedCorpus};
pub use document::{
    load_document, save_source, Document, DocumentSource, Section, SectionNode,
};
pub use embeddings::{create_provider, EmbeddingProvider, EmbeddingSignature};
pub use extractor::extract;
pub use ingest::{import_file, ImportReport, ImportedDocument};
pub use progress::{ProgressEvent, ProgressReporter};
pub use rag::{Answer, AnswerOptions, AnswerOutcome, Assistant};
pub use retriever::{RetrievalResult, RetrievedSection, Retriever};
pub use store::{CorpusStore, StoredMeta};
pub use validator::{FlaggedCitation, ResponseValidator, ValidationOutcome};

use corpus::fingerprint;
use regcite_core::config::AppConfig;
use regcite_core::{AppError, AppResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Result of indexing one document.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub document: String,
    pub path: PathBuf,
    pub sections: usize,
    /// False when an up-to-date index was reused
    pub rebuilt: bool,
    pub duration_secs: f64,
}

/// Load the corpus for the document at `path`, building it when needed.
///
/// A missing index is built and saved. A stale one is rebuilt when `force`
/// or `index.autoRebuild` is set and reported as `AppError::StaleIndex`
/// otherwise. Returns the corpus and whether it was rebuilt.
pub async fn open_corpus(
    config: &AppConfig,
    path: &Path,
    provider: &dyn EmbeddingProvider,
    progress: &ProgressReporter,
    force: bool,
) -> AppResult<(IndexedCorpus, bool)> {
    let (_, document) = load_document(path)?;
    progress.extract(document.name(), document.len() as u64);

    let store = CorpusStore::for_document(&config.index_dir(), path);
    let options = BuildOptions::from_config(config);

    if !force && store.exists() {
        match store.load(document.clone(), &provider.signature(), options.backend) {
            Ok(corpus) => {
                tracing::info!("Loaded index for '{}' from {:?}", corpus.document().name(), store.path());
                return Ok((corpus, false));
            }
            Err(AppError::StaleIndex(reason)) if config.index.auto_rebuild => {
                tracing::warn!("{}; rebuilding", reason);
            }
            Err(AppError::StaleIndex(reason)) => {
                return Err(AppError::StaleIndex(format!(
                    "{}. Run 'regcite index' to rebuild it",
                    reason
                )));
            }
            Err(e) => return Err(e),
        }
    } else if !store.exists() {
        tracing::info!("No index for '{}' yet; building it", document.name());
    }

    let corpus = IndexedCorpus::build(document, provider, &options, progress).await?;
    progress.persist(
        corpus.records().len() as u64,
        &store.path().display().to_string(),
    );
    store.save(&corpus)?;

    Ok((corpus, true))
}

/// Open every configured document.
pub async fn open_corpora(
    config: &AppConfig,
    provider: &dyn EmbeddingProvider,
    progress: &ProgressReporter,
    force: bool,
) -> AppResult<Vec<IndexedCorpus>> {
    let paths = configured_documents(config)?;

    let mut corpora = Vec::with_capacity(paths.len());
    for path in &paths {
        let (corpus, _) = open_corpus(config, path, provider, progress, force).await?;
        corpora.push(corpus);
    }
    Ok(corpora)
}

/// Build (or verify) the index of every configured document.
pub async fn index(
    config: &AppConfig,
    progress: &ProgressReporter,
    force: bool,
) -> AppResult<Vec<IndexReport>> {
    let provider = create_provider(&config.embedding).await?;
    let paths = configured_documents(config)?;

    let mut reports = Vec::with_capacity(paths.len());
    for path in paths {
        let start = Instant::now();
        let (corpus, rebuilt) =
            open_corpus(config, &path, provider.as_ref(), progress, force).await?;

        let duration = start.elapsed();
        tracing::info!(
            "Indexed '{}': {} sections in {:.2}s (rebuilt: {})",
            corpus.document().name(),
            corpus.document().len(),
            duration.as_secs_f64(),
            rebuilt
        );

        reports.push(IndexReport {
            document: corpus.document().name().to_string(),
            path,
            sections: corpus.document().len(),
            rebuilt,
            duration_secs: duration.as_secs_f64(),
        });
    }

    Ok(reports)
}

/// Structure a PDF, markdown or text file and write it as a document source.
///
/// `output` defaults to `<input stem>.yaml` beside the input. An existing
/// output is only replaced when `force` is set.
pub fn import(
    input: &Path,
    output: Option<&Path>,
    title: Option<&str>,
    force: bool,
) -> AppResult<ImportReport> {
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => input.with_extension("yaml"),
    };
    if output.as_path() == input {
        return Err(AppError::Config(format!(
            "Import output {:?} would overwrite its input",
            output
        )));
    }
    if output.exists() && !force {
        return Err(AppError::Config(format!(
            "{:?} already exists. Use --force to replace it",
            output
        )));
    }

    let imported = import_file(input, title)?;
    save_source(&output, &imported.source)?;
    tracing::info!("Wrote '{}' to {:?}", imported.document.name(), output);

    Ok(ImportReport {
        title: imported.document.name().to_string(),
        sections: imported.document.len(),
        quality: imported.quality,
        output,
    })
}

/// Persisted index state of one configured document.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub path: PathBuf,
    pub index_path: PathBuf,
    /// `None` when the document was never indexed
    pub indexed: Option<StoredMeta>,
    /// Whether the document changed since it was indexed
    pub document_changed: Option<bool>,
    pub db_size_bytes: u64,
}

/// Index statistics for every configured document.
pub fn stats(config: &AppConfig) -> AppResult<Vec<StoreStats>> {
    let paths = configured_documents(config)?;

    let mut all = Vec::with_capacity(paths.len());
    for path in paths {
        let store = CorpusStore::for_document(&config.index_dir(), &path);
        let indexed = if store.exists() {
            Some(store.meta()?)
        } else {
            None
        };

        let document_changed = match &indexed {
            Some(meta) => {
                let (_, document) = load_document(&path)?;
                Some(fingerprint(&document, &meta.signature)? != meta.fingerprint)
            }
            None => None,
        };

        let db_size_bytes = std::fs::metadata(store.path()).map(|m| m.len()).unwrap_or(0);

        all.push(StoreStats {
            index_path: store.path().to_path_buf(),
            path,
            indexed,
            document_changed,
            db_size_bytes,
        });
    }

    Ok(all)
}

/// Flattened configured documents, optionally only those whose name or file
/// stem equals `filter`.
pub fn sections(config: &AppConfig, filter: Option<&str>) -> AppResult<Vec<Document>> {
    let mut documents = Vec::new();
    for path in configured_documents(config)? {
        let (_, document) = load_document(&path)?;
        let stem = path.file_stem().map(|s| s.to_string_lossy().to_string());

        let wanted = match filter {
            Some(name) => document.name() == name || stem.as_deref() == Some(name),
            None => true,
        };
        if wanted {
            documents.push(document);
        }
    }

    if let Some(name) = filter {
        if documents.is_empty() {
            return Err(AppError::Config(format!("No configured document named '{}'", name)));
        }
    }

    Ok(documents)
}

fn configured_documents(config: &AppConfig) -> AppResult<Vec<PathBuf>> {
    let paths = config.document_paths();
    if paths.is_empty() {
        return Err(AppError::Config(
            "No documents configured. Add them under 'documents' in .regcite/config.yaml".to_string(),
        ));
    }
    Ok(paths)
}
