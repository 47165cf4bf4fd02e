//! Generation service integration for regcite.
//!
//! Provides a provider-agnostic `LlmClient` trait and the Ollama
//! implementation used to turn a composed prompt into an answer.
//!
//! # Example
//! ```no_run
//! use regcite_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Quem preside a comissão?", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;

pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::{create_client, ProviderType};
pub use providers::OllamaClient;
