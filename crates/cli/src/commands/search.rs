//! Search command handler.

use super::stderr_progress;
use clap::Args;
use regcite_core::{config::AppConfig, AppResult};
use regcite_knowledge::{create_provider, open_corpora, Retriever};
use std::sync::Arc;
use std::time::Duration;

/// Show the sections retrieved for a query
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Maximum number of sections (default: retrieval.topK)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Minimum similarity (default: retrieval.similarityThreshold)
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing search command");
        tracing::debug!("Search options: {:?}", self);

        let k = self.top_k.unwrap_or(config.retrieval.top_k);
        let threshold = self
            .threshold
            .unwrap_or(config.retrieval.similarity_threshold);

        let provider = create_provider(&config.embedding).await?;
        let corpora = open_corpora(config, provider.as_ref(), &stderr_progress(), false).await?;
        let corpora: Vec<_> = corpora.into_iter().map(Arc::new).collect();

        let retriever = Retriever::new(
            provider,
            config.retrieval.clone(),
            Duration::from_secs(config.embedding.timeout_secs),
        );
        let result = retriever
            .retrieve_many(&corpora, &self.query, k, threshold)
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }

        if result.is_empty() {
            println!("No section scored at least {:.2}", threshold);
            return Ok(());
        }

        for (rank, hit) in result.hits.iter().enumerate() {
            println!(
                "{}. {:.3}  {} [{}] {}",
                rank + 1,
                hit.score,
                hit.document,
                hit.section.id,
                hit.section.title
            );
        }

        Ok(())
    }
}
