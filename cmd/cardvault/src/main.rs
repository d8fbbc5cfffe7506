//! CardVault CLI - identify trading cards from photos.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{BuildCommand, InspectCommand, ProvisionCommand, QueryCommand};

/// CardVault CLI - visual trading-card identification.
///
/// Builds a similarity index from a labeled corpus of card images and
/// answers "which card is this?" for a photo.
///
/// Configuration is read from ~/.giztoy/cardvault/config.yaml when present.
#[derive(Parser)]
#[command(name = "cardvault")]
#[command(about = "Visual trading-card identification")]
#[command(version)]
pub struct Cli {
    /// Config file, YAML or JSON (default is ~/.giztoy/cardvault/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long, global = true)]
    pub output: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build index artifacts from a corpus manifest
    Build(BuildCommand),
    /// Obtain a servable index: remote, then local, then rebuild
    Provision(ProvisionCommand),
    /// Identify the card in an image
    Query(QueryCommand),
    /// Show metadata of a stored index
    Inspect(InspectCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Build(cmd) => cmd.run(&cli).await,
        Commands::Provision(cmd) => cmd.run(&cli).await,
        Commands::Query(cmd) => cmd.run(&cli).await,
        Commands::Inspect(cmd) => cmd.run(&cli).await,
    }
}
