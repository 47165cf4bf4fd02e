//! Answer orchestration.
//!
//! `answer` runs retrieval, citation resolution, prompt composition,
//! generation and citation validation for one question. Every corpus is read
//! through a snapshot taken at the start, so a concurrent rebuild never
//! changes the sections a question is answered from. `rebuild` re-indexes one
//! document while questions keep being answered from the previous corpus.

use crate::citation::{Citation, CitationResolver};
use crate::corpus::{BuildOptions, CorpusHandle, IndexedCorpus};
use crate::document::{load_document, Document};
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::progress::ProgressReporter;
use crate::rag::types::{Answer, AnswerOutcome, RetrievedScore};
use crate::retriever::{RetrievalResult, Retriever};
use crate::store::CorpusStore;
use crate::validator::{ResponseValidator, ValidationOutcome};
use regcite_core::config::AppConfig;
use regcite_core::{AppError, AppResult, CitationPolicy, RetrievalConfig};
use regcite_llm::{LlmClient, LlmRequest};
use regcite_prompt::{ContextPassage, GenerationRequest, PassageReference, PromptComposer};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Answering knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct AnswerOptions {
    pub retrieval: RetrievalConfig,
    /// Deadline for the query embedding
    pub embed_timeout: Duration,
    /// Deadline for one generation call, retries included
    pub generation_timeout: Duration,
    pub policy: CitationPolicy,
    /// Regenerations allowed under the reject policy
    pub max_retries: u32,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: Option<u32>,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl AnswerOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        let attempts = u64::from(config.llm.max_attempts.max(1));
        let generation_timeout = Duration::from_secs(config.llm.timeout_secs * attempts)
            + Duration::from_millis(config.llm.retry_delay_ms * (attempts - 1));

        Self {
            retrieval: config.retrieval.clone(),
            embed_timeout: Duration::from_secs(config.embedding.timeout_secs),
            generation_timeout,
            policy: config.validation.policy,
            max_retries: config.validation.max_retries,
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            top_p: config.llm.top_p,
            max_tokens: config.llm.max_tokens,
        }
    }
}

/// The retrieval-and-citation pipeline over one or more documents.
pub struct Assistant {
    corpora: Vec<CorpusHandle>,
    provider: Arc<dyn EmbeddingProvider>,
    retriever: Retriever,
    resolver: CitationResolver,
    composer: PromptComposer,
    validator: ResponseValidator,
    llm: Arc<dyn LlmClient>,
    options: AnswerOptions,
}

impl Assistant {
    pub fn new(
        corpora: Vec<IndexedCorpus>,
        provider: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmClient>,
        composer: PromptComposer,
        options: AnswerOptions,
    ) -> Self {
        Self {
            corpora: corpora.into_iter().map(CorpusHandle::new).collect(),
            retriever: Retriever::new(
                provider.clone(),
                options.retrieval.clone(),
                options.embed_timeout,
            ),
            provider,
            resolver: CitationResolver::new(options.retrieval.friendly_names.clone()),
            composer,
            validator: ResponseValidator::new(options.policy),
            llm,
            options,
        }
    }

    /// Open every configured document, loading or building its index.
    pub async fn open(config: &AppConfig, progress: &ProgressReporter) -> AppResult<Self> {
        let provider = create_provider(&config.embedding).await?;
        let corpora = crate::open_corpora(config, provider.as_ref(), progress, false).await?;
        let llm = regcite_llm::create_client(&config.llm)?;
        let templates = regcite_prompt::load_templates(&config.prompts_dir())?;
        let composer = PromptComposer::new(templates, config.retrieval.require_context);

        Ok(Self::new(
            corpora,
            provider,
            llm,
            composer,
            AnswerOptions::from_config(config),
        ))
    }

    pub fn corpora(&self) -> &[CorpusHandle] {
        &self.corpora
    }

    fn snapshots(&self) -> Vec<Arc<IndexedCorpus>> {
        self.corpora.iter().map(CorpusHandle::snapshot).collect()
    }

    /// Re-index the document at `path` and swap it in for the corpus of the
    /// same title, saving the new index first.
    ///
    /// Questions already running keep their snapshot of the previous corpus;
    /// on failure the previous corpus stays in place.
    ///
    /// # Errors
    /// `AppError::Config` when no open corpus has the document's title, plus
    /// anything loading, embedding or saving reports.
    pub async fn rebuild(
        &self,
        config: &AppConfig,
        path: &Path,
        progress: &ProgressReporter,
    ) -> AppResult<Arc<IndexedCorpus>> {
        let (_, document) = load_document(path)?;
        let handle = self
            .corpora
            .iter()
            .find(|h| h.snapshot().document().name() == document.name())
            .ok_or_else(|| {
                AppError::Config(format!(
                    "No open document titled '{}' to rebuild",
                    document.name()
                ))
            })?;

        progress.extract(document.name(), document.len() as u64);
        let store = CorpusStore::for_document(&config.index_dir(), path);
        let options = BuildOptions::from_config(config);
        let provider = self.provider.as_ref();

        handle
            .rebuild(async move {
                let corpus = IndexedCorpus::build(document, provider, &options, progress).await?;
                progress.persist(
                    corpus.records().len() as u64,
                    &store.path().display().to_string(),
                );
                store.save(&corpus)?;
                Ok(corpus)
            })
            .await
    }

    /// Retrieve sections for `query` across all documents.
    pub async fn search(&self, query: &str, k: usize, threshold: f32) -> AppResult<RetrievalResult> {
        require_question(query)?;
        self.retriever
            .retrieve_many(&self.snapshots(), query, k, threshold)
            .await
    }

    /// Answer `question` with citations checked against what was retrieved.
    #[tracing::instrument(skip(self))]
    pub async fn answer(&self, question: &str) -> AppResult<Answer> {
        require_question(question)?;
        let snapshots = self.snapshots();
        let retrieval = self
            .retriever
            .retrieve_many(
                &snapshots,
                question,
                self.options.retrieval.top_k,
                self.options.retrieval.similarity_threshold,
            )
            .await?;

        let documents: Vec<&Document> = snapshots.iter().map(|c| c.document()).collect();
        let citations = self.resolver.resolve(&retrieval, &documents);
        let passages = context_passages(&retrieval, &citations);

        let mut request = match self.composer.compose(question, passages.clone()) {
            Ok(request) => request,
            Err(AppError::EmptyContext(reason)) => {
                tracing::info!("Answering without generation: {}", reason);
                return Ok(Answer::no_relevant_section(question));
            }
            Err(e) => return Err(e),
        };

        let outcome = if retrieval.is_empty() {
            tracing::info!("No section cleared the threshold; asking the model to say so");
            AnswerOutcome::NoRelevantSection
        } else {
            tracing::info!(
                "Answering from {} sections (top score {:.3})",
                retrieval.len(),
                retrieval.top_score().unwrap_or(0.0)
            );
            AnswerOutcome::Answered
        };

        let mut attempts = 0;
        let validation = loop {
            attempts += 1;
            let response = self.generate(&request).await?;
            let checked = self.validator.validate(&response.content, &citations);

            if !checked.rejected {
                break checked;
            }

            if attempts > self.options.max_retries {
                tracing::warn!(
                    "Answer still cites unretrieved sections after {} attempts; stripping them",
                    attempts
                );
                break ResponseValidator::new(CitationPolicy::Strip)
                    .validate(&response.content, &citations);
            }

            tracing::info!(
                "Rejected answer citing {:?}; regenerating with strict instructions",
                checked.flagged_labels()
            );
            request =
                self.composer
                    .compose_strict(question, passages.clone(), &checked.flagged_labels())?;
        };

        Ok(build_answer(validation, citations, &retrieval, outcome, attempts))
    }

    async fn generate(&self, request: &GenerationRequest) -> AppResult<regcite_llm::LlmResponse> {
        let deadline = self.options.generation_timeout;
        match tokio::time::timeout(deadline, self.llm.complete(&self.llm_request(request))).await {
            Ok(result) => result,
            Err(_) => Err(AppError::timeout("generation", deadline)),
        }
    }

    fn llm_request(&self, request: &GenerationRequest) -> LlmRequest {
        let llm_request = LlmRequest::new(request.render_user_prompt(), &self.options.model)
            .with_system(&request.instructions)
            .with_temperature(self.options.temperature)
            .with_top_p(self.options.top_p);

        match self.options.max_tokens {
            Some(max) => llm_request.with_max_tokens(max),
            None => llm_request,
        }
    }
}

fn require_question(question: &str) -> AppResult<()> {
    if question.trim().is_empty() {
        return Err(AppError::Config("Question is empty".to_string()));
    }
    Ok(())
}

/// Passages in ranking order, labelled with their citations.
fn context_passages(retrieval: &RetrievalResult, citations: &[Citation]) -> Vec<ContextPassage> {
    retrieval
        .hits
        .iter()
        .zip(citations)
        .map(|(hit, citation)| ContextPassage {
            label: citation.label.clone(),
            section_id: hit.section.id.clone(),
            text: if hit.section.body.trim().is_empty() {
                hit.section.title.clone()
            } else {
                hit.section.body.clone()
            },
            references: citation
                .cross_refs
                .iter()
                .map(|r| PassageReference {
                    text: r.text.clone(),
                    target: r.target.clone(),
                })
                .collect(),
        })
        .collect()
}

fn build_answer(
    validation: ValidationOutcome,
    citations: Vec<Citation>,
    retrieval: &RetrievalResult,
    outcome: AnswerOutcome,
    attempts: u32,
) -> Answer {
    Answer {
        text: validation.text,
        citations,
        verified: validation.verified,
        flagged: validation.flagged,
        outcome,
        retrieved: retrieval
            .hits
            .iter()
            .map(|hit| RetrievedScore {
                document: hit.document.clone(),
                section_id: hit.section.id.clone(),
                score: hit.score,
            })
            .collect(),
        attempts,
    }
}
