use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kinoteka::config::{AppConfig, CliConfig, FileConfig};
use kinoteka::sync::{LogObserver, Reconciler, SyncObserver, WatchConfig, WatchEngine};
use kinoteka::SqliteCatalogStore;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite catalog database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// A data root directory to index. Repeatable; order defines each
    /// root's index, which stored items reference.
    #[clap(long = "root", value_parser = parse_path)]
    pub roots: Vec<PathBuf>,

    /// Path to a TOML config file. Values there override CLI flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Run the startup reconciliation and exit without live watching.
    #[clap(long)]
    pub no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(
        &CliConfig {
            db_path: cli_args.db_path,
            data_roots: cli_args.roots,
            watch: !cli_args.no_watch,
        },
        file_config,
    )?;

    info!("Opening catalog database at {:?}...", config.db_path);
    let store = Arc::new(SqliteCatalogStore::new(&config.db_path)?);
    let observer: Arc<dyn SyncObserver> = Arc::new(LogObserver);

    info!(
        "Reconciling {} data root(s) against the catalog...",
        config.data_roots.len()
    );
    let reconciler = Reconciler::new(store.clone(), observer.clone());
    let report = reconciler.run(&config.data_roots).await?;
    info!(
        "Startup sync done: {} added, {} removed, {} duplicates, {} failed",
        report.added_count,
        report.removed_count,
        report.duplicates.len(),
        report.failed.len()
    );

    if !config.watch {
        return Ok(());
    }

    let engine = WatchEngine::new(store, observer, WatchConfig::default());
    engine.start(config.data_roots.clone()).await?;
    info!("Watching for library changes, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    engine.stop().await;
    Ok(())
}
