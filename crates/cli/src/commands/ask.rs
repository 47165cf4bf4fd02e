//! Ask command handler.
//!
//! Runs the full answer pipeline and prints the answer with its sources.

use super::stderr_progress;
use clap::Args;
use regcite_core::{config::AppConfig, AppError, AppResult};
use regcite_knowledge::{AnswerOutcome, Assistant};

/// Ask a question about the configured regulations
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Number of sections to retrieve (overrides retrieval.topK)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        if self.question.trim().is_empty() {
            return Err(AppError::Config("No question provided".to_string()));
        }

        let mut config = config.clone();
        if let Some(k) = self.top_k {
            config.retrieval.top_k = k;
            config.validate()?;
        }

        let assistant = Assistant::open(&config, &stderr_progress()).await?;
        let answer = assistant.answer(&self.question).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&answer)?);
            return Ok(());
        }

        println!("{}", answer.text);
        println!();

        match answer.outcome {
            AnswerOutcome::NoRelevantSection => {
                println!("Sources: (no relevant section found)");
            }
            AnswerOutcome::Answered => {
                println!("Sources:");
                for citation in &answer.citations {
                    let cited = if answer.verified.contains(&citation.label) {
                        "cited"
                    } else {
                        "retrieved"
                    };
                    println!(
                        "- {} [{}] {}#{} ({})",
                        citation.label, citation.section_id, citation.document, citation.anchor, cited
                    );
                    for reference in &citation.cross_refs {
                        match &reference.target {
                            Some(target) => println!("    see {} -> {}", reference.text, target),
                            None => println!("    see {} (not in this document)", reference.text),
                        }
                    }
                }
            }
        }

        if !answer.flagged.is_empty() {
            println!();
            println!("Unverified citations:");
            for flag in &answer.flagged {
                println!("- {}", flag.label);
            }
        }

        Ok(())
    }
}
