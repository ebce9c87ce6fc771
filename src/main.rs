use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tether::stream::FeedFormat;

mod cli;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Keep a local AI coding agent running and its session state in sync")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.tether/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a documented default config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Supervise the agent until Ctrl-C
    Run {
        /// Also follow the event feed and print turn phase changes
        #[arg(long)]
        watch: bool,

        /// Agent command line, overriding [agent] (e.g. `-- opencode serve`)
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Follow an event feed without supervising a process
    Watch {
        /// Feed URL, overriding [connection] url
        #[arg(long)]
        url: Option<String>,
    },

    /// Feed a recorded event file through the store and print the final state
    Replay {
        /// Recorded feed (SSE or NDJSON)
        file: PathBuf,

        /// Framing of the file; guessed from the extension when omitted
        #[arg(long)]
        format: Option<FeedFormat>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Init { force } => cli::init::init_command(cli.config, force).await,
        Commands::Run { watch, command } => {
            let config = cli::load_config(cli.config.as_deref())?;
            cli::run::run_command(config, command, watch).await
        }
        Commands::Watch { url } => {
            let config = cli::load_config(cli.config.as_deref())?;
            cli::watch::watch_command(config, url).await
        }
        Commands::Replay { file, format } => {
            let config = cli::load_config(cli.config.as_deref())?;
            cli::replay::replay_command(&config, &file, format).await
        }
    };

    // Leave no agent behind, whatever happened above
    tether::supervisor::registry::kill_all();
    result
}
