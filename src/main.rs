mod cli;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands, ServerArgs, SweepArgs};
use resizebox::config::Config;
use resizebox::observability;
use resizebox::storage::{ArtifactStore, LocalArtifactStore};

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    observability::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => server(args).await?,
        Commands::Sweep(args) => sweep(args).await?,
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<Config, AnyError> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

async fn server(args: ServerArgs) -> Result<(), AnyError> {
    let mut config = load_config(args.config)?;
    if let Some(address) = args.address {
        config.server.bind_addr = address;
    }

    resizebox::api::run(config).await
}

async fn sweep(args: SweepArgs) -> Result<(), AnyError> {
    let config = load_config(args.config)?;
    let root = args.root.unwrap_or(config.storage.root);
    let ttl = args
        .ttl_seconds
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(config.storage.ttl_seconds));

    let store = LocalArtifactStore::open(&root, ttl).await?;
    let stats = store.sweep().await?;

    println!(
        "{}: scanned {}, expired {}, malformed {}, failed {}",
        root.display(),
        stats.scanned,
        stats.expired,
        stats.malformed,
        stats.failed
    );

    Ok(())
}
