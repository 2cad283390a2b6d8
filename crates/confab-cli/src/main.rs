//! Confab CLI - Command Line Interface for the Confab chat runtime
//!
//! Interactive chat, one-shot generation, model inspection, and synthetic
//! benchmarking on top of the confab-core session controller.

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

mod commands;
mod config;
mod demo;
mod utils;

use commands::{
    bench::BenchCommand, chat::ChatCommand, generate::GenerateCommand, info::InfoCommand, Command,
};

#[derive(Parser)]
#[command(
    name = "confab",
    version = env!("CARGO_PKG_VERSION"),
    about = "Confab chat session CLI",
    long_about = "A command-line interface for interactive chat, one-shot generation, model inspection, and benchmarking over locally compiled chat models."
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CONFAB_CONFIG")]
    config: Option<PathBuf>,

    /// JSON output format
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    #[command(name = "chat", alias = "c")]
    Chat(ChatCommand),

    /// Generate a single response for a prompt
    #[command(name = "generate", alias = "gen")]
    Generate(GenerateCommand),

    /// Display the resolved model and session configuration
    #[command(name = "info", alias = "i")]
    Info(InfoCommand),

    /// Run a synthetic prefill/decode benchmark
    #[command(name = "bench", alias = "b")]
    Bench(BenchCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli)?;

    debug!("Confab CLI v{} starting", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = config::Config::load(cli.config.as_deref())?;
    debug!("Configuration loaded: {:?}", config);

    // Execute command
    let result = match cli.command {
        Commands::Chat(cmd) => cmd.execute(&config, cli.json).await,
        Commands::Generate(cmd) => cmd.execute(&config, cli.json).await,
        Commands::Info(cmd) => cmd.execute(&config, cli.json).await,
        Commands::Bench(cmd) => cmd.execute(&config, cli.json).await,
    };

    match result {
        Ok(_) => {
            if !cli.quiet {
                info!("Command completed successfully");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
