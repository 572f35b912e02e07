//! Cloudlift CLI
//!
//! A command-line tool for watching the host agent and driving its
//! synthetic load generator.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{config_check, load, status};
use std::path::PathBuf;

/// Cloudlift CLI
#[derive(Parser)]
#[command(name = "cloudlift")]
#[command(author, version, about = "CLI for the Cloudlift host migration agent", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via CLOUDLIFT_API_URL env var)
    #[arg(long, env = "CLOUDLIFT_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show monitor status and the latest sample
    Status,

    /// Take a fresh host usage reading
    Usage,

    /// Drive the synthetic load generator
    #[command(subcommand)]
    Load(LoadCommands),

    /// Migration config utilities
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum LoadCommands {
    /// Busy-loop CPU workers
    #[command(subcommand)]
    Cpu(CpuCommands),

    /// Memory ballast
    #[command(subcommand)]
    Memory(MemoryCommands),

    /// Run the external stress tool on the agent host
    Stress {
        /// Seconds before stress exits (agent default: 300)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show the current synthetic load
    Show,
}

#[derive(Subcommand)]
pub enum CpuCommands {
    /// Start CPU workers
    Start {
        /// Number of worker threads (agent default: 4)
        #[arg(long, short)]
        workers: Option<usize>,
    },

    /// Stop all CPU workers
    Stop,
}

#[derive(Subcommand)]
pub enum MemoryCommands {
    /// Allocate one more ballast block
    Allocate,

    /// Release all ballast blocks
    Free,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a migration config file locally
    Check {
        /// Path to the JSON migration config
        path: PathBuf,
    },
}

async fn run(cli: Cli) -> Result<()> {
    let format = cli.format;

    if let Commands::Config(ConfigCommands::Check { path }) = &cli.command {
        return config_check::check_config(path, format);
    }

    let api_url = config::resolve_api_url(cli.api_url, &config::Config::load()?);
    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Status => status::show_status(&client, format).await?,
        Commands::Usage => status::show_usage(&client, format).await?,
        Commands::Load(load_cmd) => match load_cmd {
            LoadCommands::Cpu(CpuCommands::Start { workers }) => {
                load::start_cpu(&client, workers, format).await?;
            }
            LoadCommands::Cpu(CpuCommands::Stop) => load::stop_cpu(&client, format).await?,
            LoadCommands::Memory(MemoryCommands::Allocate) => {
                load::allocate_memory(&client, format).await?;
            }
            LoadCommands::Memory(MemoryCommands::Free) => {
                load::free_memory(&client, format).await?;
            }
            LoadCommands::Stress { timeout } => load::run_stress(&client, timeout, format).await?,
            LoadCommands::Show => load::show_load(&client, format).await?,
        },
        Commands::Config(_) => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
