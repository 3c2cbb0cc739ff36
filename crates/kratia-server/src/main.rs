//! kratia-server binary.
//!
//! Layers `config.toml` (or `--config <path>`) under `KRATIA_*` environment
//! variables, opens the SQLite ledger, bootstraps the Agora and serves the
//! governance API.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use kratia_governance::Governance;
use kratia_server::{ServerConfig, app, bootstrap_agora, spawn_sweeper};
use kratia_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Kratia governance server")]
struct Cli {
  /// TOML configuration file; missing is fine.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg: ServerConfig = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(
      config::Environment::with_prefix("KRATIA")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .and_then(|c| c.try_deserialize())
    .with_context(|| format!("invalid configuration in {:?}", cli.config))?;
  cfg.validate()?;

  let ledger = cfg.ledger_path();
  if let Some(dir) = ledger.parent().filter(|d| !d.as_os_str().is_empty()) {
    tokio::fs::create_dir_all(dir)
      .await
      .with_context(|| format!("cannot create ledger directory {dir:?}"))?;
  }

  let store = SqliteStore::open(&ledger)
    .await
    .with_context(|| format!("cannot open ledger {ledger:?}"))?;
  bootstrap_agora(&store, &cfg.governance).await?;

  let engine = Arc::new(Governance::new(Arc::new(store), cfg.governance.clone()));

  if let Some(secs) = cfg.governance.sweep_interval_secs.filter(|s| *s > 0) {
    tracing::info!(every_secs = secs, "closure sweeper enabled");
    spawn_sweeper(engine.clone(), Duration::from_secs(secs));
  }

  let addr = cfg.bind_addr();
  let listener = tokio::net::TcpListener::bind(&addr)
    .await
    .with_context(|| format!("cannot bind {addr}"))?;
  tracing::info!(%addr, ledger = ?ledger, "kratia-server listening");

  axum::serve(listener, app(engine)).await.context("server error")?;
  Ok(())
}
