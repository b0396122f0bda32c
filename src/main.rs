use clap::{Parser, Subcommand};
use kb_rag::Result;
use kb_rag::commands::{ingest, query, show_status};
use kb_rag::config::{Config, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kb-rag")]
#[command(about = "A local knowledge base with retrieval-augmented question answering")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, the knowledge directory and the index files
    #[arg(long, global = true, default_value = ".")]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest new files from the knowledge directory
    Ingest,
    /// Ask questions against the knowledge base
    Query,
    /// Show index, metadata and seen-files status
    Status,
    /// Configure the embedding and completion servers
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&cli.base_dir)?;
            } else {
                run_interactive_config(&cli.base_dir)?;
            }
        }
        Commands::Ingest => {
            ingest(&Config::load(&cli.base_dir)?)?;
        }
        Commands::Query => {
            query(&Config::load(&cli.base_dir)?)?;
        }
        Commands::Status => {
            show_status(&Config::load(&cli.base_dir)?)?;
        }
    }

    Ok(())
}
