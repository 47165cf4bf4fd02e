//! Deadlines on the embedding and generation services.

use super::support::{gpa_corpus, gpa_document, gpa_provider, ScriptedLlm, SlowProvider};
use crate::corpus::{BuildOptions, IndexedCorpus};
use crate::progress::ProgressReporter;
use crate::rag::{AnswerOptions, Assistant};
use crate::retriever::Retriever;
use regcite_core::{AppError, ErrorClass, RetrievalConfig};
use regcite_prompt::{PromptComposer, PromptTemplates};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_timeout(err: &AppError, operation: &str, millis: u64) {
        assert!(
            matches!(err, AppError::Timeout { operation: op, millis: ms } if op == operation && *ms == millis),
            "unexpected error: {err:?}"
        );
        assert_eq!(err.class(), ErrorClass::ServiceUnavailable);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_slow_query_embedding_times_out() {
        let corpus = gpa_corpus(&gpa_provider()).await;
        let slow = Arc::new(SlowProvider::new(gpa_provider(), Duration::from_millis(500)));
        let retriever = Retriever::new(slow, RetrievalConfig::default(), Duration::from_millis(50));

        let err = retriever
            .retrieve(&corpus, "What is the minimum GPA?", 3, 0.5)
            .await
            .unwrap_err();

        assert_timeout(&err, "query embedding", 50);
        assert_eq!(err.to_string(), "Timed out after 50ms: query embedding");
    }

    #[tokio::test]
    async fn test_slow_section_embedding_aborts_build() {
        let slow = SlowProvider::new(gpa_provider(), Duration::from_millis(500));
        let options = BuildOptions {
            timeout: Duration::from_millis(50),
            ..BuildOptions::default()
        };

        let err = IndexedCorpus::build(gpa_document(), &slow, &options, &ProgressReporter::noop())
            .await
            .unwrap_err();

        assert_timeout(&err, "section embedding", 50);
    }

    #[tokio::test]
    async fn test_slow_generation_times_out() {
        let provider = Arc::new(gpa_provider());
        let corpus = gpa_corpus(&provider).await;
        let llm = Arc::new(ScriptedLlm::new(&["Too late."]).with_delay(Duration::from_millis(500)));

        let options = AnswerOptions {
            generation_timeout: Duration::from_millis(50),
            ..AnswerOptions::default()
        };
        let assistant = Assistant::new(
            vec![corpus],
            provider,
            llm.clone(),
            PromptComposer::new(PromptTemplates::default(), false),
            options,
        );

        let err = assistant.answer("What is the minimum GPA?").await.unwrap_err();

        assert_timeout(&err, "generation", 50);
        assert_eq!(llm.requests().len(), 1);
    }

    #[test]
    fn test_generation_deadline_covers_every_attempt() {
        let mut config = regcite_core::config::AppConfig::default();
        config.llm.timeout_secs = 10;
        config.llm.max_attempts = 3;
        config.llm.retry_delay_ms = 500;

        let options = AnswerOptions::from_config(&config);
        assert_eq!(options.generation_timeout, Duration::from_secs(31));
    }
}
