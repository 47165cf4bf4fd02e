//! Index command handler.

use super::stderr_progress;
use clap::Args;
use regcite_core::{config::AppConfig, AppResult};

/// Build or refresh the section indexes
#[derive(Args, Debug)]
pub struct IndexCommand {
    /// Rebuild even when the stored index is up to date
    #[arg(short, long)]
    pub force: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing index command (force: {})", self.force);

        // A stale index is rebuilt here rather than reported
        let mut config = config.clone();
        config.index.auto_rebuild = true;

        let reports = regcite_knowledge::index(&config, &stderr_progress(), self.force).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&reports)?);
            return Ok(());
        }

        for report in &reports {
            let state = if report.rebuilt { "indexed" } else { "up to date" };
            println!(
                "{}: {} sections, {} ({:.2}s)",
                report.document, report.sections, state, report.duration_secs
            );
        }

        Ok(())
    }
}
