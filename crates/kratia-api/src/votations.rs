//! Handlers for `/votations` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/votations` | Optional `?status=`, `?type=`, `?limit=`, `?offset=` |
//! | `GET`  | `/votations/{id}` | Closes the votation first if it is due |
//! | `POST` | `/votations/{id}/votes` | Body: `{"choice":"for"}`; needs a member |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use kratia_core::{
  store::{LedgerStore, VotationQuery},
  votation::{Tally, VoteChoice, Votation, VotationStatus, VotationType},
};
use kratia_governance::Governance;
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, session::CurrentMember};

const DEFAULT_PAGE: usize = 50;
const MAX_PAGE: usize = 200;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status: Option<VotationStatus>,
  #[serde(rename = "type")]
  pub kind:   Option<VotationType>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

/// `GET /votations`
pub async fn list<S>(
  State(engine): State<Arc<Governance<S>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Votation>>, ApiError>
where
  S: LedgerStore + 'static,
{
  let query = VotationQuery {
    status:     params.status,
    kind:       params.kind,
    due_before: None,
    limit:      Some(params.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE)),
    offset:     params.offset,
  };
  Ok(Json(engine.list_votations(&query).await?))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /votations/{id}`
pub async fn get_one<S>(
  State(engine): State<Arc<Governance<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Votation>, ApiError>
where
  S: LedgerStore + 'static,
{
  Ok(Json(engine.ensure_closed(id).await?))
}

// ─── Vote ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VoteBody {
  pub choice: VoteChoice,
}

/// `POST /votations/{id}/votes`
pub async fn cast<S>(
  State(engine): State<Arc<Governance<S>>>,
  CurrentMember(member): CurrentMember,
  Path(id): Path<Uuid>,
  Json(body): Json<VoteBody>,
) -> Result<Json<Tally>, ApiError>
where
  S: LedgerStore + 'static,
{
  Ok(Json(engine.cast_vote(&member, id, body.choice).await?))
}
