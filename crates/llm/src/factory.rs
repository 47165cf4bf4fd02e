//! Generation provider factory.

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use regcite_core::config::LlmSettings;
use regcite_core::{AppError, AppResult};
use std::sync::Arc;

/// Known generation providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Ollama,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
        }
    }
}

/// Create a generation client from settings.
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown.
pub fn create_client(settings: &LlmSettings) -> AppResult<Arc<dyn LlmClient>> {
    match ProviderType::parse(&settings.provider) {
        Some(ProviderType::Ollama) => {
            tracing::debug!(
                endpoint = %settings.endpoint,
                model = %settings.model,
                "Creating Ollama client"
            );
            Ok(Arc::new(OllamaClient::from_settings(settings)))
        }
        None => Err(AppError::Config(format!(
            "Unknown provider: {}",
            settings.provider
        ))),
    }
}
