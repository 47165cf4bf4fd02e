//! End-to-end answer scenarios with stub embedding and generation services.

use super::support::{gpa_corpus, gpa_provider, gpa_source, ScriptedLlm};
use crate::progress::ProgressReporter;
use crate::rag::{AnswerOptions, AnswerOutcome, Assistant};
use crate::store::CorpusStore;
use regcite_core::config::AppConfig;
use regcite_core::{AppError, CitationPolicy};
use regcite_prompt::{PromptComposer, PromptTemplates};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[cfg(test)]
mod tests {
    use super::*;

    fn options(policy: CitationPolicy) -> AnswerOptions {
        let mut options = AnswerOptions::default();
        options.retrieval.top_k = 3;
        options.retrieval.similarity_threshold = 0.5;
        options.retrieval.friendly_names =
            HashMap::from([("Art2".to_string(), "Admission".to_string())]);
        options.policy = policy;
        options.max_retries = 1;
        options
    }

    async fn assistant(
        llm: Arc<ScriptedLlm>,
        policy: CitationPolicy,
        require_context: bool,
    ) -> Assistant {
        let provider = Arc::new(gpa_provider());
        let corpus = gpa_corpus(&provider).await;
        Assistant::new(
            vec![corpus],
            provider,
            llm,
            PromptComposer::new(PromptTemplates::default(), require_context),
            options(policy),
        )
    }

    #[tokio::test]
    async fn test_answer_cites_retrieved_sections() {
        let llm = Arc::new(ScriptedLlm::new(&[
            "The minimum GPA is 3.0 [Section: Admission]; below 2.5 means probation [Section: Article 4].<|im_end|>",
        ]));
        let assistant = assistant(llm.clone(), CitationPolicy::Annotate, false).await;

        let answer = assistant.answer("What is the minimum GPA?").await.unwrap();

        assert_eq!(answer.outcome, AnswerOutcome::Answered);
        assert_eq!(answer.attempts, 1);
        assert!(answer.is_fully_cited());
        assert_eq!(answer.verified, vec!["Admission", "Article 4"]);
        assert!(!answer.text.ends_with("<|im_end|>"));

        let retrieved: Vec<&str> = answer.retrieved.iter().map(|r| r.section_id.as_str()).collect();
        assert_eq!(retrieved, vec!["Art2", "Art4"]);

        // Art. 2 refers to Art. 4, which resolves inside the document
        let admission = &answer.citations[0];
        assert_eq!(admission.anchor, "admission");
        assert_eq!(admission.cross_refs[0].target.as_deref(), Some("Art4"));

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        let system = requests[0].system.as_deref().unwrap_or_default();
        assert!(system.contains("- Admission"));
        assert!(system.contains("- Article 4"));
        assert!(requests[0].prompt.contains("<section name=\"Admission\" id=\"Art2\">"));
        assert!(requests[0].prompt.ends_with("Question: What is the minimum GPA?"));
        assert_eq!(requests[0].temperature, Some(0.3));
    }

    #[tokio::test]
    async fn test_unretrieved_citation_is_annotated() {
        let llm = Arc::new(ScriptedLlm::new(&[
            "GPA 3.0 [Section: Admission], fees apply [Section: Article 3].",
        ]));
        let assistant = assistant(llm, CitationPolicy::Annotate, false).await;

        let answer = assistant.answer("What is the minimum GPA?").await.unwrap();

        assert_eq!(answer.flagged.len(), 1);
        assert_eq!(answer.flagged[0].label, "Article 3");
        assert!(answer.text.contains("[Section: Article 3 (unverified)]"));
        assert!(!answer.verified.contains(&"Article 3".to_string()));
    }

    #[tokio::test]
    async fn test_reject_regenerates_with_strict_instructions() {
        let llm = Arc::new(ScriptedLlm::new(&[
            "GPA 3.0 [Section: Article 9].",
            "GPA 3.0 [Section: Admission].",
        ]));
        let assistant = assistant(llm.clone(), CitationPolicy::Reject, false).await;

        let answer = assistant.answer("What is the minimum GPA?").await.unwrap();

        assert_eq!(answer.attempts, 2);
        assert!(answer.is_fully_cited());
        assert_eq!(answer.text, "GPA 3.0 [Section: Admission].");

        let requests = llm.requests();
        let strict = requests[1].system.as_deref().unwrap_or_default();
        assert!(strict.contains("not provided: Article 9."));
    }

    #[tokio::test]
    async fn test_reject_falls_back_to_strip_after_retries() {
        let llm = Arc::new(ScriptedLlm::new(&[
            "GPA 3.0 [Section: Article 9].",
            "GPA 3.0 [Section: Article 9] [Section: Admission].",
        ]));
        let assistant = assistant(llm, CitationPolicy::Reject, false).await;

        let answer = assistant.answer("What is the minimum GPA?").await.unwrap();

        assert_eq!(answer.attempts, 2);
        assert_eq!(answer.text, "GPA 3.0 [Section: Admission].");
        assert_eq!(answer.flagged.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_retrieval_asks_model_to_report_nothing_found() {
        let llm = Arc::new(ScriptedLlm::new(&["No relevant section was found."]));
        let assistant = assistant(llm.clone(), CitationPolicy::Annotate, false).await;

        let answer = assistant.answer("Where is parking?").await.unwrap();

        assert_eq!(answer.outcome, AnswerOutcome::NoRelevantSection);
        assert!(answer.citations.is_empty());
        assert_eq!(answer.attempts, 1);

        let requests = llm.requests();
        let system = requests[0].system.as_deref().unwrap_or_default();
        assert!(system.contains("no relevant section was found"));
    }

    #[tokio::test]
    async fn test_required_context_skips_generation() {
        let llm = Arc::new(ScriptedLlm::new(&[]));
        let assistant = assistant(llm.clone(), CitationPolicy::Annotate, true).await;

        let answer = assistant.answer("Where is parking?").await.unwrap();

        assert_eq!(answer.outcome, AnswerOutcome::NoRelevantSection);
        assert_eq!(answer.attempts, 0);
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_fails_the_query() {
        let llm = Arc::new(ScriptedLlm::new(&[]));
        let assistant = assistant(llm, CitationPolicy::Annotate, false).await;

        let err = assistant.answer("What is the minimum GPA?").await.unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_search_uses_given_k_and_threshold() {
        let llm = Arc::new(ScriptedLlm::new(&[]));
        let assistant = assistant(llm, CitationPolicy::Annotate, false).await;

        let result = assistant
            .search("What is the minimum GPA?", 4, 0.2)
            .await
            .unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(result.hits[0].document, "Graduate Regulations");
    }

    #[tokio::test]
    async fn test_blank_question_is_rejected_before_embedding() {
        let llm = Arc::new(ScriptedLlm::new(&[]));
        let assistant = assistant(llm.clone(), CitationPolicy::Annotate, false).await;

        let err = assistant.answer("  \n\t").await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(matches!(assistant.search("", 3, 0.5).await, Err(AppError::Config(_))));
        assert!(llm.requests().is_empty());
    }

    /// Workspace holding the GPA regulation with a raised minimum GPA.
    fn revised_workspace() -> (TempDir, AppConfig, std::path::PathBuf) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("graduate.json");

        let mut source = gpa_source();
        source.sections[1].content =
            Some("Admission requires a minimum GPA of 3.2. See Article 4.".to_string());
        std::fs::write(&path, serde_json::to_string_pretty(&source).unwrap()).unwrap();

        let config = AppConfig {
            workspace: temp.path().to_path_buf(),
            documents: vec![path.clone()],
            ..AppConfig::default()
        };
        (temp, config, path)
    }

    #[tokio::test]
    async fn test_rebuild_during_answer_keeps_its_snapshot() {
        let (_temp, config, path) = revised_workspace();
        let llm = Arc::new(
            ScriptedLlm::new(&["The minimum GPA is 3.0 [Section: Admission]."])
                .with_delay(Duration::from_millis(100)),
        );
        let assistant = assistant(llm.clone(), CitationPolicy::Annotate, false).await;
        let progress = ProgressReporter::noop();

        let (answer, rebuilt) = tokio::join!(assistant.answer("What is the minimum GPA?"), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            assistant.rebuild(&config, &path, &progress).await
        });
        let answer = answer.unwrap();
        let rebuilt = rebuilt.unwrap();

        // The question was answered from the corpus it started with
        let prompt = &llm.requests()[0].prompt;
        assert!(prompt.contains("minimum GPA of 3.0"));
        assert!(!prompt.contains("3.2"));
        assert!(answer.is_fully_cited());

        let current = assistant.corpora()[0].snapshot();
        assert!(Arc::ptr_eq(&current, &rebuilt));
        assert_eq!(current.document().get("Art2").unwrap().body, "Admission requires a minimum GPA of 3.2. See Article 4.");

        let stored = CorpusStore::for_document(&config.index_dir(), &path).meta().unwrap();
        assert_eq!(stored.fingerprint, rebuilt.fingerprint());
    }

    #[tokio::test]
    async fn test_rebuild_of_unknown_document_keeps_corpus() {
        let (_temp, config, path) = revised_workspace();
        let mut source = gpa_source();
        source.title = "Undergraduate Regulations".to_string();
        std::fs::write(&path, serde_json::to_string(&source).unwrap()).unwrap();

        let llm = Arc::new(ScriptedLlm::new(&[]));
        let assistant = assistant(llm, CitationPolicy::Annotate, false).await;
        let before = assistant.corpora()[0].snapshot();

        let err = assistant
            .rebuild(&config, &path, &ProgressReporter::noop())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Config(_)));
        assert!(Arc::ptr_eq(&before, &assistant.corpora()[0].snapshot()));
    }
}
