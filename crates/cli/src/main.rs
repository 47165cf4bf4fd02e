//! regcite CLI
//!
//! Main entry point for the regcite command-line tool.
//! Answers questions about regulation documents with checked citations.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ImportCommand, IndexCommand, SearchCommand, SectionsCommand, StatsCommand};
use regcite_core::{config::AppConfig, logging, AppError, AppResult, ErrorClass};
use std::path::PathBuf;
use std::process::ExitCode;

/// regcite - cited answers from institutional regulations
#[derive(Parser, Debug)]
#[command(name = "regcite")]
#[command(about = "Cited answers from institutional regulations", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "REGCITE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file (default: .regcite/config.yaml)
    #[arg(short, long, global = true, env = "REGCITE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Generation provider
    #[arg(short, long, global = true, env = "REGCITE_PROVIDER")]
    provider: Option<String>,

    /// Generation model identifier
    #[arg(short, long, global = true, env = "REGCITE_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a question about the configured regulations
    Ask(AskCommand),

    /// Show the sections retrieved for a query
    Search(SearchCommand),

    /// Build or refresh the section indexes
    Index(IndexCommand),

    /// Convert a PDF, markdown or text regulation into a document file
    Import(ImportCommand),

    /// List the flattened sections of each document
    Sections(SectionsCommand),

    /// Show index statistics
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let (label, code) = match e.class() {
                ErrorClass::ServiceUnavailable => ("service unavailable, try again later", 3),
                ErrorClass::IndexOutOfDate => ("index out of date", 4),
                ErrorClass::InvalidInput => ("invalid input", 2),
                ErrorClass::Internal => ("internal error", 1),
            };
            eprintln!("error ({}): {}", label, e);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    // Workspace and config file decide which YAML is read
    let config = AppConfig::load_with(cli.workspace, cli.config)?;

    // Apply remaining CLI overrides
    let config = config.with_overrides(
        None,
        None,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("regcite starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Generation: {}/{}", config.llm.provider, config.llm.model);
    tracing::debug!(
        "Embedding: {}/{} ({} dims)",
        config.embedding.provider,
        config.embedding.model,
        config.embedding.dimensions
    );

    config.validate()?;
    config.ensure_regcite_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Search(_) => "search",
        Commands::Index(_) => "index",
        Commands::Import(_) => "import",
        Commands::Sections(_) => "sections",
        Commands::Stats(_) => "stats",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result: Result<(), AppError> = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Index(cmd) => cmd.execute(&config).await,
        Commands::Import(cmd) => cmd.execute(&config),
        Commands::Sections(cmd) => cmd.execute(&config),
        Commands::Stats(cmd) => cmd.execute(&config),
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
