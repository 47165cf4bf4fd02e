//! Command handlers for the regcite CLI.

pub mod ask;
pub mod import;
pub mod index;
pub mod search;
pub mod sections;
pub mod stats;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use import::ImportCommand;
pub use index::IndexCommand;
pub use search::SearchCommand;
pub use sections::SectionsCommand;
pub use stats::StatsCommand;

use regcite_knowledge::ProgressReporter;
use std::sync::Arc;

/// Progress reporter printing one line per event to stderr.
pub(crate) fn stderr_progress() -> ProgressReporter {
    ProgressReporter::new(Arc::new(|event| eprintln!("{}", event.format_simple())))
}
