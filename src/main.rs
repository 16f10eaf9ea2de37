mod cli;

use anyhow::Result;
use augur::analysis::AnalysisDepth;
use augur::config::AugurConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "augur",
    version,
    about = "Response cache, context window, and streaming delivery for text analysis"
)]
struct Cli {
    /// Config file to use instead of ~/.augur/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream one analysis, printing each chunk as it arrives
    Stream {
        text: String,
        /// quick, standard, or deep
        #[arg(long, default_value = "standard")]
        depth: AnalysisDepth,
        /// Print chunks as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Analyze texts through the cache and context window
    Analyze {
        #[arg(required = true)]
        texts: Vec<String>,
        #[arg(long, default_value = "standard")]
        depth: AnalysisDepth,
    },
    /// Print the cache key for a request
    Key {
        text: String,
        #[arg(long, default_value = "standard")]
        depth: AnalysisDepth,
        /// Request options as a JSON object
        #[arg(long)]
        options: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AugurConfig::load_from(path)?,
        None => AugurConfig::load()?,
    };

    // Log to stderr so stdout stays clean for JSON output.
    let filter = EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Stream { text, depth, json } => {
            cli::stream::stream(&config, &text, depth, json).await?;
        }
        Command::Analyze { texts, depth } => {
            cli::analyze::analyze(&config, &texts, depth).await?;
        }
        Command::Key {
            text,
            depth,
            options,
        } => {
            cli::key(&text, depth, options.as_deref())?;
        }
    }

    Ok(())
}
