//! Stub services shared by the scenario tests.

use crate::corpus::{BuildOptions, IndexedCorpus};
use crate::document::{Document, DocumentSource};
use crate::embeddings::EmbeddingProvider;
use crate::extractor::extract;
use crate::progress::ProgressReporter;
use async_trait::async_trait;
use regcite_core::{AppError, AppResult};
use regcite_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const DIMS: usize = 7;

/// Unit vector whose cosine with `query_vector()` is exactly `score`.
pub fn scored_vector(score: f32, axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIMS];
    v[0] = score;
    v[axis] = (1.0 - score * score).sqrt();
    v
}

pub fn query_vector() -> Vec<f32> {
    let mut v = vec![0.0; DIMS];
    v[0] = 1.0;
    v
}

/// Embedding provider returning fixed vectors for texts containing a key.
#[derive(Debug)]
pub struct StubProvider {
    vectors: Vec<(String, Vec<f32>)>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn new(vectors: Vec<(&str, Vec<f32>)>) -> Self {
        Self {
            vectors: vectors
                .into_iter()
                .map(|(key, v)| (key.to_string(), v))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for StubProvider {
    fn provider_name(&self) -> &str {
        "stub"
    }

    fn model_name(&self) -> &str {
        "stub-v1"
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        texts
            .iter()
            .map(|text| {
                self.vectors
                    .iter()
                    .find(|(key, _)| text.contains(key.as_str()))
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| AppError::EmbeddingService(format!("no stub vector for '{}'", text)))
            })
            .collect()
    }
}

/// Provider answering like `inner`, but only after `delay`.
#[derive(Debug)]
pub struct SlowProvider {
    inner: StubProvider,
    delay: Duration,
}

impl SlowProvider {
    pub fn new(inner: StubProvider, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowProvider {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed_batch(texts).await
    }
}

/// Five regulation sections and the GPA question, with similarities
/// 0.40, 0.81, 0.10, 0.63 and 0.22 in document order.
pub fn gpa_source() -> DocumentSource {
    serde_json::from_value(serde_json::json!({
        "title": "Graduate Regulations",
        "version": "2024",
        "sections": [
            {"heading": "Article 1", "content": "Scope of the graduate program."},
            {"heading": "Article 2", "content": "Admission requires a minimum GPA of 3.0. See Article 4."},
            {"heading": "Article 3", "content": "Library opening hours."},
            {"heading": "Article 4", "content": "Students below a 2.5 GPA are placed on probation."},
            {"heading": "Article 5", "content": "Thesis formatting rules."}
        ]
    }))
    .unwrap()
}

pub fn gpa_provider() -> StubProvider {
    StubProvider::new(vec![
        ("Scope of the graduate", scored_vector(0.40, 1)),
        ("Admission requires", scored_vector(0.81, 2)),
        ("Library opening", scored_vector(0.10, 3)),
        ("placed on probation", scored_vector(0.63, 4)),
        ("Thesis formatting", scored_vector(0.22, 5)),
        ("minimum GPA?", query_vector()),
        ("parking", scored_vector(0.0, 6)),
    ])
}

pub fn gpa_document() -> Document {
    extract(&gpa_source()).unwrap()
}

pub async fn gpa_corpus(provider: &StubProvider) -> IndexedCorpus {
    IndexedCorpus::build(
        gpa_document(),
        provider,
        &BuildOptions::default(),
        &ProgressReporter::noop(),
    )
    .await
    .unwrap()
}

/// Generation client replaying canned replies and recording requests.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<LlmRequest>>,
    delay: Duration,
}

impl ScriptedLlm {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Hold every reply back for `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        tokio::time::sleep(self.delay).await;
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AppError::Llm("script exhausted".to_string()))?;

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::new(0, 0),
        })
    }
}
