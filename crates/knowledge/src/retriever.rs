//! Query-time retrieval over one or more indexed corpora.

use crate::corpus::IndexedCorpus;
use crate::document::Section;
use crate::embeddings::{l2_normalize, EmbeddingProvider, EmbeddingSignature};
use regcite_core::{AppError, AppResult, RetrievalConfig};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// One retrieved section.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedSection {
    /// Name of the document the section belongs to
    pub document: String,
    pub section: Section,
    pub score: f32,
}

/// Retrieved sections, best first, all at or above the threshold.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievedSection>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.hits.iter().map(|h| &h.section)
    }

    /// Highest score, if anything was retrieved.
    pub fn top_score(&self) -> Option<f32> {
        self.hits.first().map(|h| h.score)
    }
}

/// Embeds queries and looks them up in a corpus.
#[derive(Debug, Clone)]
pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
    embed_timeout: Duration,
}

impl Retriever {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            config,
            embed_timeout,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn signature(&self) -> EmbeddingSignature {
        self.provider.signature()
    }

    /// Retrieve with the configured `top_k` and threshold.
    pub async fn search(&self, corpus: &IndexedCorpus, query: &str) -> AppResult<RetrievalResult> {
        self.retrieve(
            corpus,
            query,
            self.config.top_k,
            self.config.similarity_threshold,
        )
        .await
    }

    /// Up to `k` sections of `corpus` scoring at least `threshold` against
    /// `query`, best first.
    ///
    /// # Errors
    /// `AppError::Config` when the corpus was embedded with a different
    /// provider, model or dimension; `AppError::Timeout` when the query
    /// embedding exceeds its deadline.
    #[tracing::instrument(skip(self, corpus), fields(document = %corpus.document().name()))]
    pub async fn retrieve(
        &self,
        corpus: &IndexedCorpus,
        query: &str,
        k: usize,
        threshold: f32,
    ) -> AppResult<RetrievalResult> {
        self.check_signature(corpus)?;
        let vector = self.embed_query(query).await?;
        let hits = lookup(corpus, &vector, k, threshold);

        tracing::debug!(
            "Retrieved {} sections (threshold {:.2}, scores: {:?})",
            hits.len(),
            threshold,
            hits.iter().map(|h| h.score).collect::<Vec<_>>()
        );

        Ok(RetrievalResult { hits })
    }

    /// Retrieve across several corpora and merge the hits.
    ///
    /// Hits are ordered by score, then corpus order, then section position,
    /// and truncated to `k`.
    pub async fn retrieve_many(
        &self,
        corpora: &[Arc<IndexedCorpus>],
        query: &str,
        k: usize,
        threshold: f32,
    ) -> AppResult<RetrievalResult> {
        for corpus in corpora {
            self.check_signature(corpus)?;
        }

        // One embedding per distinct signature; every corpus shares the
        // retriever's provider, so this is at most one call.
        let mut vectors: HashMap<&EmbeddingSignature, Vec<f32>> = HashMap::new();
        for corpus in corpora {
            if !vectors.contains_key(corpus.signature()) {
                let vector = self.embed_query(query).await?;
                vectors.insert(corpus.signature(), vector);
            }
        }

        let mut ranked: Vec<(usize, RetrievedSection)> = Vec::new();
        for (order, corpus) in corpora.iter().enumerate() {
            if let Some(vector) = vectors.get(corpus.signature()) {
                ranked.extend(
                    lookup(corpus, vector, k, threshold)
                        .into_iter()
                        .map(|hit| (order, hit)),
                );
            }
        }

        ranked.sort_by(|(order_a, a), (order_b, b)| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| order_a.cmp(order_b))
                .then_with(|| a.section.position.cmp(&b.section.position))
        });
        ranked.truncate(k);

        Ok(RetrievalResult {
            hits: ranked.into_iter().map(|(_, hit)| hit).collect(),
        })
    }

    fn check_signature(&self, corpus: &IndexedCorpus) -> AppResult<()> {
        let expected = self.provider.signature();
        if *corpus.signature() != expected {
            return Err(AppError::Config(format!(
                "Corpus '{}' was embedded with {}, but the query provider is {}",
                corpus.document().name(),
                corpus.signature(),
                expected
            )));
        }
        Ok(())
    }

    async fn embed_query(&self, query: &str) -> AppResult<Vec<f32>> {
        let mut vector = match tokio::time::timeout(self.embed_timeout, self.provider.embed(query))
            .await
        {
            Ok(result) => result?,
            Err(_) => return Err(AppError::timeout("query embedding", self.embed_timeout)),
        };

        l2_normalize(&mut vector);
        Ok(vector)
    }
}

fn lookup(corpus: &IndexedCorpus, vector: &[f32], k: usize, threshold: f32) -> Vec<RetrievedSection> {
    corpus
        .nearest(vector, k)
        .into_iter()
        .filter(|(_, score)| *score >= threshold)
        .map(|(section, score)| RetrievedSection {
            document: corpus.document().name().to_string(),
            section: section.clone(),
            score,
        })
        .collect()
}
