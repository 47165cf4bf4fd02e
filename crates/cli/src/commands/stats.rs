//! Stats command handler.
//!
//! Shows the persisted index state of each configured document.

use clap::Args;
use regcite_core::{config::AppConfig, AppResult};

/// Show index statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let stats = regcite_knowledge::stats(config)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }

        for entry in &stats {
            println!("{}", entry.path.display());
            match &entry.indexed {
                Some(meta) => {
                    println!("  Document: {}", meta.document);
                    println!("  Sections: {}", meta.sections);
                    println!("  Embedding: {}", meta.signature);
                    println!("  Built at: {}", meta.built_at.to_rfc3339());
                    println!("  Index: {} ({} bytes)", entry.index_path.display(), entry.db_size_bytes);
                    if entry.document_changed == Some(true) {
                        println!("  Status: out of date, run 'regcite index'");
                    } else {
                        println!("  Status: up to date");
                    }
                }
                None => println!("  Not indexed yet"),
            }
        }

        Ok(())
    }
}
