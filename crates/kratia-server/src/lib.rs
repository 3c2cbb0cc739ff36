//! Kratia server wiring: configuration, Agora bootstrap, the HTTP app and
//! the optional closure sweeper.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use axum::Router;
use chrono::Utc;
use kratia_core::{
  forum::{Forum, ForumCategory},
  store::{LedgerStore, Write, WriteBatch},
};
use kratia_governance::{Governance, GovernanceConfig};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

/// Votations closed per sweep tick.
const SWEEP_BATCH: usize = 100;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `KRATIA_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub governance: GovernanceConfig,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("kratia.db") }

impl ServerConfig {
  /// `store_path` with a leading `~/` resolved against `$HOME`.
  pub fn ledger_path(&self) -> PathBuf {
    let home = std::env::var_os("HOME");
    match (self.store_path.strip_prefix("~"), home) {
      (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
      _ => self.store_path.clone(),
    }
  }

  pub fn bind_addr(&self) -> String { format!("{}:{}", self.host, self.port) }

  /// Refuse settings the ledger would only reject at the first proposal.
  pub fn validate(&self) -> anyhow::Result<()> {
    let governance = &self.governance;
    anyhow::ensure!(
      governance.quorum_required >= 1,
      "governance.quorum_required must be at least 1"
    );
    anyhow::ensure!(
      governance.minimum_quorum >= 1,
      "governance.minimum_quorum must be at least 1"
    );
    Ok(())
  }
}

// ─── Bootstrap ────────────────────────────────────────────────────────────────

/// Create the governance category and the Agora forum if they are missing.
pub async fn bootstrap_agora<S: LedgerStore>(
  store: &S,
  config: &GovernanceConfig,
) -> anyhow::Result<()> {
  if store
    .get_forum(config.agora_forum_id)
    .await
    .context("failed to look up the Agora")?
    .is_some()
  {
    return Ok(());
  }

  let now = Utc::now();
  let mut batch = WriteBatch::new();
  let category = store
    .get_category(config.agora_category_id)
    .await
    .context("failed to look up the governance category")?;
  if category.is_none() {
    batch.push(Write::InsertCategory(ForumCategory {
      id:          config.agora_category_id,
      name:        "Governance".to_string(),
      description: Some("Community self-government".to_string()),
      created_at:  now,
    }));
  }
  batch.push(Write::InsertForum(Forum {
    id:           config.agora_forum_id,
    category_id:  config.agora_category_id,
    name:         "Agora".to_string(),
    description:  "Proposals and votations of the community".to_string(),
    is_public:    true,
    thread_count: 0,
    post_count:   0,
    created_at:   now,
  }));

  store
    .commit_batch(batch)
    .await
    .context("failed to create the Agora")?;
  tracing::info!(forum = %config.agora_forum_id, "created the Agora forum");
  Ok(())
}

// ─── App ──────────────────────────────────────────────────────────────────────

pub fn app<S>(engine: Arc<Governance<S>>) -> Router
where
  S: LedgerStore + 'static,
{
  kratia_api::api_router(engine).layer(TraceLayer::new_for_http())
}

/// Periodically close overdue votations that nobody has looked at.
pub fn spawn_sweeper<S>(engine: Arc<Governance<S>>, every: Duration) -> JoinHandle<()>
where
  S: LedgerStore + 'static,
{
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    loop {
      ticker.tick().await;
      if let Err(e) = engine.sweep_expired(SWEEP_BATCH).await {
        tracing::warn!("closure sweep failed: {e}");
      }
    }
  })
}
