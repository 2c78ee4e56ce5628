mod commands;
mod configuration;
mod error;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use toolsmith::providers::factory::ProviderType;
use tracing_subscriber::EnvFilter;

use configuration::Overrides;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single task until the model gives a final answer
    Run {
        /// The task to solve
        task: String,

        /// Backend to use (openai or anthropic)
        #[arg(short, long)]
        provider: Option<ProviderType>,

        /// Model to use
        #[arg(short, long)]
        model: Option<String>,

        /// Maximum number of model calls
        #[arg(long)]
        max_steps: Option<usize>,

        /// Let generated tools make HTTP requests
        #[arg(long)]
        allow_network: bool,

        /// Let generated tools read and write files under DIR
        #[arg(long, value_name = "DIR")]
        allow_fs: Option<PathBuf>,

        /// Settings file (defaults to ./toolsmith.toml when present)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Print the version
    Version,
}

fn init_tracing() {
    // logs go to stderr so stdout only carries the answer
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            task,
            provider,
            model,
            max_steps,
            allow_network,
            allow_fs,
            config,
        } => {
            let overrides = Overrides {
                config_file: config,
                provider,
                model,
                max_steps,
                allow_network,
                allow_fs,
            };
            let code = commands::run::execute(&task, overrides).await?;
            std::process::exit(code);
        }
        Command::Version => commands::version::execute(),
    }
}
