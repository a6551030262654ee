use clap::{Parser, Subcommand};
use ringtally::VoteType;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod keygen;
pub mod simulate;
pub mod version;

use config::RingtallyConfig;

#[derive(Parser)]
#[command(name = "ringtally")]
#[command(author = "ringtally contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Anonymous reviewer voting with linkable ring signatures", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a commented default configuration file
    InitConfig {
        /// Where to write it (default: <data_dir>/ringtally/config.toml)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Generate a reviewer keypair
    Keygen {
        /// Derive from this 32-byte hex seed instead of a random one
        #[arg(long)]
        seed: Option<String>,
    },

    /// Run a full voting round against fresh keys and print the tally
    Simulate {
        /// Path to config file (default: <data_dir>/ringtally/config.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of enrolled reviewers
        #[arg(long, default_value_t = 5)]
        reviewers: usize,

        /// Ring size per vote (signer included)
        #[arg(long, default_value_t = 3)]
        ring_size: usize,

        /// Submission genre
        #[arg(long, default_value = "general")]
        genre: String,

        /// Comma-separated votes, e.g. approve,approve,reject
        #[arg(long, value_delimiter = ',', required = true)]
        votes: Vec<VoteType>,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::InitConfig { path, force } => {
            let path = path.unwrap_or_else(config::default_config_path);
            if path.exists() && !force {
                return Err(format!(
                    "config file '{}' already exists (use --force to overwrite)",
                    path.display()
                )
                .into());
            }
            RingtallyConfig::create_default(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        Commands::Keygen { seed } => keygen::execute(seed),
        Commands::Simulate {
            config,
            reviewers,
            ring_size,
            genre,
            votes,
        } => {
            let config = RingtallyConfig::resolve(config.as_deref())?;
            init_logging(&config.logging.level, config.logging.file.as_deref())?;
            simulate::execute(
                &config,
                simulate::SimulateArgs {
                    reviewers,
                    ring_size,
                    genre,
                    votes,
                },
            )
            .await
        }
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `level` when set. Logs go to stderr, or are appended
/// to `file` without ANSI colours.
pub fn init_logging(level: &str, file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| -> Box<dyn std::error::Error> { e })?;
        }
        None => builder
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| -> Box<dyn std::error::Error> { e })?,
    }
    Ok(())
}
