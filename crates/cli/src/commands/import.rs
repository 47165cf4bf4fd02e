//! Import command handler.

use clap::Args;
use regcite_core::{config::AppConfig, AppResult};
use regcite_knowledge::ingest::MIN_TEXT_QUALITY;
use std::path::PathBuf;

/// Convert a PDF, markdown or text regulation into a document source
#[derive(Args, Debug)]
pub struct ImportCommand {
    /// File to import (.pdf, .md, .markdown or .txt)
    pub input: PathBuf,

    /// Output file, .yaml or .json (default: <input>.yaml beside the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Document title (default: first top-level heading or the file name)
    #[arg(short, long)]
    pub title: Option<String>,

    /// Replace an existing output file
    #[arg(short, long)]
    pub force: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ImportCommand {
    pub fn execute(&self, _config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing import command for {:?}", self.input);

        let report = regcite_knowledge::import(
            &self.input,
            self.output.as_deref(),
            self.title.as_deref(),
            self.force,
        )?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!("Imported '{}' ({} sections)", report.title, report.sections);
        println!("  Written to: {}", report.output.display());
        if report.quality < MIN_TEXT_QUALITY {
            println!(
                "  Warning: text quality {:.2}, review the output before indexing",
                report.quality
            );
        }
        println!("Add it under 'documents' in .regcite/config.yaml to index it.");

        Ok(())
    }
}
