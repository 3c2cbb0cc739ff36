//! Site-wide reads: the constitution and the member's notifications.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use kratia_core::{notification::Notification, settings::SiteSettings, store::LedgerStore};
use kratia_governance::Governance;
use serde::Deserialize;

use crate::{error::ApiError, session::CurrentMember};

/// `GET /constitution`
pub async fn constitution<S>(
  State(engine): State<Arc<Governance<S>>>,
) -> Result<Json<SiteSettings>, ApiError>
where
  S: LedgerStore + 'static,
{
  Ok(Json(engine.site_settings().await?))
}

#[derive(Debug, Deserialize)]
pub struct NotificationParams {
  pub limit: Option<usize>,
}

/// `GET /notifications[?limit=<n>]`
pub async fn notifications<S>(
  State(engine): State<Arc<Governance<S>>>,
  CurrentMember(member): CurrentMember,
  Query(params): Query<NotificationParams>,
) -> Result<Json<Vec<Notification>>, ApiError>
where
  S: LedgerStore + 'static,
{
  let limit = params.limit.unwrap_or(50).min(200);
  Ok(Json(engine.notifications(member.id, limit).await?))
}
