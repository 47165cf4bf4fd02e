//! Embedding provider trait and factory.

use regcite_core::config::EmbeddingSettings;
use regcite_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identity of the embedding space a vector lives in.
///
/// Vectors are only comparable when their signatures are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmbeddingSignature {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
}

impl fmt::Display for EmbeddingSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({} dims)", self.provider, self.model, self.dimensions)
    }
}

/// Trait for embedding providers.
///
/// Providers must be deterministic: embedding the same text twice yields the
/// same vector.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + fmt::Debug {
    /// Get provider name (e.g., "ollama", "trigram")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::EmbeddingService("No embedding returned".to_string()))
    }

    /// Signature of the vectors this provider produces.
    fn signature(&self) -> EmbeddingSignature {
        EmbeddingSignature {
            provider: self.provider_name().to_string(),
            model: self.model_name().to_string(),
            dimensions: self.dimensions(),
        }
    }
}

/// Create an embedding provider from settings.
///
/// The Ollama provider verifies the service and model before returning.
pub async fn create_provider(settings: &EmbeddingSettings) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "trigram" => Ok(Arc::new(super::providers::trigram::TrigramProvider::new(
            settings.dimensions,
        ))),

        "ollama" => {
            let provider = super::providers::ollama::OllamaProvider::connect(settings).await?;
            Ok(Arc::new(provider))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: ollama, trigram",
            settings.provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigram_settings() -> EmbeddingSettings {
        EmbeddingSettings {
            provider: "trigram".to_string(),
            dimensions: 128,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_trigram_provider() {
        let provider = create_provider(&trigram_settings()).await.unwrap();
        assert_eq!(
            provider.signature(),
            EmbeddingSignature {
                provider: "trigram".to_string(),
                model: "trigram-v1".to_string(),
                dimensions: 128,
            }
        );
    }

    #[tokio::test]
    async fn test_create_unknown_provider() {
        let settings = EmbeddingSettings {
            provider: "unknown".to_string(),
            ..Default::default()
        };

        let err = create_provider(&settings).await.unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[tokio::test]
    async fn test_provider_embed_single() {
        let provider = create_provider(&trigram_settings()).await.unwrap();
        let embedding = provider.embed("prazo de defesa").await.unwrap();
        assert_eq!(embedding.len(), 128);
    }

    #[test]
    fn test_signature_display() {
        let signature = EmbeddingSignature {
            provider: "ollama".to_string(),
            model: "all-minilm".to_string(),
            dimensions: 384,
        };
        assert_eq!(signature.to_string(), "ollama/all-minilm (384 dims)");
    }
}
