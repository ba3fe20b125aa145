//! Ragline CLI
//!
//! Main entry point for the ragline command-line tool.
//! Ingests documents into local collections and answers questions over them.

mod commands;

use clap::{Parser, Subcommand};
use commands::{
    AskCommand, CleanCommand, DeleteCommand, IngestCommand, SearchCommand, StatsCommand,
};
use ragline_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Ragline - retrieval-augmented generation over local collections
#[derive(Parser, Debug)]
#[command(name = "ragline")]
#[command(about = "Retrieval-augmented generation over local collections", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "RAGLINE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "RAGLINE_CONFIG")]
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

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Generation provider (ollama, gemini)
    #[arg(short, long, global = true, env = "RAGLINE_PROVIDER")]
    provider: Option<String>,

    /// Generation model identifier
    #[arg(short, long, global = true, env = "RAGLINE_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load documents into a collection
    Ingest(IngestCommand),

    /// Retrieve the documents closest to a query
    Search(SearchCommand),

    /// Answer a question grounded in a collection
    Ask(AskCommand),

    /// Remove documents by id
    Delete(DeleteCommand),

    /// Show collection statistics
    Stats(StatsCommand),

    /// Delete a collection and all its files
    Clean(CleanCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ingest(_) => "ingest",
            Commands::Search(_) => "search",
            Commands::Ask(_) => "ask",
            Commands::Delete(_) => "delete",
            Commands::Stats(_) => "stats",
            Commands::Clean(_) => "clean",
        }
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load()?.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
        cli.log_json,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_json)?;

    tracing::info!("Ragline CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.validate()?;
    config.ensure_ragline_dir()?;

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Ingest(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Delete(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
        Commands::Clean(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask_with_filters() {
        let cli = Cli::try_parse_from([
            "ragline",
            "ask",
            "race",
            "What does a purple flag mean?",
            "-k",
            "2",
            "--filter",
            "source_type=rules",
            "--stream",
        ])
        .unwrap();

        match cli.command {
            Commands::Ask(cmd) => {
                assert_eq!(cmd.collection, "race");
                assert_eq!(cmd.top_k, Some(2));
                assert_eq!(cmd.filter, vec!["source_type=rules"]);
                assert!(cmd.stream);
                assert!(!cmd.no_context);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ragline", "stats", "race", "--log-json", "-v"]).unwrap();
        assert!(cli.log_json);
        assert!(cli.verbose);
        assert_eq!(cli.command.name(), "stats");
    }

    #[test]
    fn test_parse_ingest_paths() {
        let cli = Cli::try_parse_from([
            "ragline", "ingest", "race", "--path", "data.txt", "--path", "docs", "--if-empty",
        ])
        .unwrap();

        match cli.command {
            Commands::Ingest(cmd) => {
                assert_eq!(cmd.path.len(), 2);
                assert!(cmd.if_empty);
                assert!(!cmd.reset);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_delete_requires_ids() {
        assert!(Cli::try_parse_from(["ragline", "delete", "race"]).is_err());
        assert!(Cli::try_parse_from(["ragline", "delete", "race", "3", "4"]).is_ok());
    }
}
