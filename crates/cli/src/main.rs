//! ratchet CLI — the main entry point.
//!
//! Commands:
//! - `chat`  — Send one prompt, or enter interactive mode
//! - `tools` — List the registered tools and their limits

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ratchet",
    about = "ratchet — budget-bounded tool-calling agent runtime",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat {
        /// Send a single prompt instead of entering interactive mode
        #[arg(short, long)]
        prompt: Option<String>,

        /// Refuse destructive tools and anything not opted into safe mode
        #[arg(long)]
        safe_mode: bool,

        /// Validate and route tool calls without executing them
        #[arg(long)]
        dry_run: bool,

        /// Override the per-conversation tool budget
        #[arg(long)]
        max_tools: Option<u32>,
    },

    /// List registered tools
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat {
            prompt,
            safe_mode,
            dry_run,
            max_tools,
        } => {
            commands::chat::run(
                cli.config.as_deref(),
                prompt,
                commands::chat::Overrides {
                    safe_mode,
                    dry_run,
                    max_tools,
                    show_metrics: cli.verbose,
                },
            )
            .await
        }
        Commands::Tools => commands::tools_cmd::run(),
    }
}
