//! Promptloom CLI
//!
//! Main entry point for the `loom` command-line tool.
//! Assembles system prompts from session files and runs text through the
//! rewrite pipeline.

mod commands;

use clap::{Parser, Subcommand};
use commands::{BuildCommand, PreviewCommand, ProfilesCommand, RewriteCommand, ValidateCommand};
use loom_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Promptloom - segment-based system prompt assembly
#[derive(Parser, Debug)]
#[command(name = "loom")]
#[command(about = "Segment-based system prompt assembly", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "LOOM_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "LOOM_CONFIG")]
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

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assemble a system prompt from a session file
    Build(BuildCommand),

    /// Show the segments a session produces
    Preview(PreviewCommand),

    /// Check a session for missing segments
    Validate(ValidateCommand),

    /// Run text through one rewrite stage
    Rewrite(RewriteCommand),

    /// List rule profiles in the workspace
    Profiles(ProfilesCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load configuration from the workspace the command line or environment names
    let config = AppConfig::load_from(cli.workspace.clone(), cli.config.clone())?;

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Promptloom CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);

    config.validate()?;

    let command_name = match &cli.command {
        Commands::Build(_) => "build",
        Commands::Preview(_) => "preview",
        Commands::Validate(_) => "validate",
        Commands::Rewrite(_) => "rewrite",
        Commands::Profiles(_) => "profiles",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Build(cmd) => cmd.execute(&config).await,
        Commands::Preview(cmd) => cmd.execute(&config).await,
        Commands::Validate(cmd) => cmd.execute(&config).await,
        Commands::Rewrite(cmd) => cmd.execute(&config).await,
        Commands::Profiles(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
