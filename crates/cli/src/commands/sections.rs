//! Sections command handler.

use clap::Args;
use regcite_core::{config::AppConfig, AppResult};

/// List the flattened sections of each document
#[derive(Args, Debug)]
pub struct SectionsCommand {
    /// Only this document (by title or file name without extension)
    #[arg(short, long)]
    pub document: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SectionsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing sections command");

        let documents = regcite_knowledge::sections(config, self.document.as_deref())?;

        if self.json {
            let output: Vec<_> = documents
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "document": d.name(),
                        "version": d.version(),
                        "sections": d.sections(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        for document in &documents {
            match document.version() {
                Some(version) => println!("{} ({})", document.name(), version),
                None => println!("{}", document.name()),
            }
            for section in document.sections() {
                println!(
                    "{}{}  {}",
                    "  ".repeat(section.depth + 1),
                    section.id,
                    section.title
                );
            }
        }

        Ok(())
    }
}
