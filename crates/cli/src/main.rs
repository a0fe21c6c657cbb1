//! agentloop CLI, the main entry point.
//!
//! Commands:
//! - `run`     Run one session for a message
//! - `memory`  Show stored session summaries and experience
//! - `tools`   List the built-in tools
//! - `config`  Show or validate the effective configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "agentloop",
    about = "agentloop - tool-calling agent sessions",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session for one user message
    Run {
        /// The user message
        #[arg(short, long)]
        message: String,

        /// Reuse a session id so its memory is refreshed
        #[arg(long)]
        session: Option<String>,

        /// Print every event as a JSON line
        #[arg(long)]
        json: bool,
    },

    /// Inspect session memory and the experience log
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// List the tools sessions can call
    Tools,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Live session summaries
    Sessions,
    /// Most recent experience entries
    Experience {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Drop expired session summaries
    Purge,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Check the configuration and report problems
    Validate,
    /// Print a default config file
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Run {
            message,
            session,
            json,
        } => commands::run::run(message, session, json).await?,
        Commands::Memory { action } => match action {
            MemoryAction::Sessions => commands::memory::sessions().await?,
            MemoryAction::Experience { limit } => commands::memory::experience(limit).await?,
            MemoryAction::Purge => commands::memory::purge().await?,
        },
        Commands::Tools => commands::tools::list()?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Validate => commands::config_cmd::validate()?,
            ConfigAction::Init => commands::config_cmd::init()?,
        },
    }

    Ok(())
}
