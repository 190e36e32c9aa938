//! Ad cache CLI - inspect and seed the ad SDK disk caches
//!
//! Works on the same namespace directories the SDK uses, configured from
//! the `AD_CACHE_*` environment variables or `--cache-dir`.

mod commands;
mod error;

use crate::commands::Namespace;
use crate::error::Result;
use ad_cache::CacheConfig;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ad-cache")]
#[command(about = "Inspect and seed the ad SDK disk caches", long_about = None)]
struct Cli {
    /// Root cache directory (overrides AD_CACHE_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store the contents of a file under a key
    Put {
        #[arg(value_enum)]
        namespace: Namespace,
        key: String,
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the value stored under a key
    Get {
        #[arg(value_enum)]
        namespace: Namespace,
        key: String,
        /// Write the value to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Print the cached settings hash of an ad unit
    Hash { ad_unit: String },
    /// Print the file backing a cached video
    Path { key: String },
    /// Print namespace statistics as JSON
    Stats {
        #[arg(value_enum)]
        namespace: Namespace,
    },
    /// Delete every entry in a namespace
    Clear {
        #[arg(value_enum)]
        namespace: Namespace,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("ad_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };

    let cli = Cli::parse();

    let mut config = CacheConfig::from_env();
    if let Some(dir) = cli.cache_dir {
        config.root_dir = dir;
    }
    config.validate()?;
    debug!(root = ?config.root_dir, "Using cache root");

    match cli.command {
        Command::Put {
            namespace,
            key,
            file,
        } => commands::put(&config, namespace, &key, &file).await?,
        Command::Get {
            namespace,
            key,
            output,
        } => {
            match output {
                Some(path) => {
                    let copied = commands::export(&config, namespace, &key, &path)?;
                    info!(path = ?path, bytes = copied, "Wrote value");
                }
                None => {
                    let value = commands::get(&config, namespace, &key).await?;
                    std::io::stdout().write_all(&value)?;
                }
            }
        }
        Command::Hash { ad_unit } => println!("{}", commands::hash(&config, &ad_unit)?),
        Command::Path { key } => println!("{}", commands::video_path(&config, &key)?.display()),
        Command::Stats { namespace } => {
            let stats = commands::stats(&config, namespace)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Clear { namespace } => commands::clear(&config, namespace)?,
    }

    Ok(())
}
