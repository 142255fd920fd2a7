//! # Medical RAG CLI (`medrag`)
//!
//! ## Usage
//!
//! ```bash
//! medrag --config ./config/medrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `medrag serve` | Load (or build) the store and start the HTTP server |
//! | `medrag ingest [--force]` | Rebuild the persisted store from the PDF |
//! | `medrag ask "<question>"` | Answer one question and print it |
//! | `medrag stats` | Show what the persisted store contains |

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use medical_rag::config::{self, Config};
use medical_rag::embedding::create_provider;
use medical_rag::ingest::run_ingest;
use medical_rag::server::run_server;
use medical_rag::service::RagService;
use medical_rag::store::{StorePaths, VectorStore};

/// Medical RAG: answer medical questions from a reference document.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Every section is optional; see `config/medrag.toml`.
#[derive(Parser)]
#[command(name = "medrag", version)]
struct Cli {
    /// Path to configuration file (TOML) [default: ./config/medrag.toml].
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Loads the persisted store, building it from the PDF first if none
    /// exists, then serves `GET /health` and `POST /query`.
    Serve,

    /// Rebuild the vector store from the source PDF.
    Ingest {
        /// Overwrite an existing store.
        #[arg(long)]
        force: bool,
    },

    /// Answer a single question and print the result.
    Ask {
        question: String,
    },

    /// Print chunk count, dimensions and file paths of the persisted store.
    Stats,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => {
            let service = Arc::new(RagService::from_config(&cfg).await?);
            run_server(&cfg.server.bind, service).await?;
        }
        Commands::Ingest { force } => {
            let provider = create_provider(&cfg.embedding)?;
            let report = run_ingest(&cfg, provider.as_ref(), force).await?;
            println!("Ingest complete");
            println!("  chunks:     {}", report.chunks);
            println!("  dimensions: {}", report.dims);
            println!("  index:      {}", report.paths.index.display());
            println!("  records:    {}", report.paths.records.display());
            println!("  elapsed:    {:.1}s", report.elapsed.as_secs_f64());
        }
        Commands::Ask { question } => {
            let service = RagService::from_config(&cfg).await?;
            match service.answer(&question).await {
                Ok(answer) => println!("{}", answer.answer),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Stats => {
            let paths = StorePaths::from_config(&cfg.store);
            match VectorStore::load(&paths)? {
                Some(store) => {
                    let stats = store.stats();
                    println!("Vector store");
                    println!("  chunks:     {}", stats.num_chunks);
                    println!("  dimensions: {}", stats.dims);
                    println!("  index:      {}", paths.index.display());
                    println!("  records:    {}", paths.records.display());
                }
                None => {
                    println!(
                        "No vector store at {} (run `medrag ingest`)",
                        paths.index.display()
                    );
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

const DEFAULT_CONFIG: &str = "./config/medrag.toml";

/// Reads the config file named by `--config`, or the default path.
///
/// Only an absent default file falls back to built-in defaults; a missing
/// `--config` file or an invalid file is an error.
fn load(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return config::load_config(path);
    }
    let path = Path::new(DEFAULT_CONFIG);
    if !path.exists() {
        tracing::info!("no config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    config::load_config(path)
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "medical_rag=debug,medrag=debug"
    } else {
        "medical_rag=info,medrag=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
