mod commands;
mod config;
mod error;

use std::path::PathBuf;

use atemschutz_core::{Catalog, PlacementEngine};
use atemschutz_rocks::RocksStore;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::Command;
use crate::config::{load_config, resolve_store_path};

#[derive(Parser)]
#[command(name = "ats")]
#[command(about = "Track breathing-protection equipment across vehicles and stores", long_about = None)]
struct Cli {
    /// Path to the equipment store
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Configuration file (defaults to ~/.config/atemschutz/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let layout = config.layout()?;
    let catalog = Catalog::standard();

    let store_path = resolve_store_path(cli.store, &config);
    debug!(path = %store_path.display(), "opening store");
    std::fs::create_dir_all(&store_path)?;
    let store = RocksStore::open(&store_path)?;
    let mut engine = PlacementEngine::open(&catalog, &layout, store)?;

    let mut out = std::io::stdout().lock();
    commands::run(&mut engine, cli.command, &mut out)?;

    Ok(())
}
