//! Handlers for `/threads` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/threads/{id}` | Thread, posts and any hosted votation |
//! | `POST` | `/threads/{id}/posts` | Body: `{"content":"..."}`; needs a member |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use kratia_core::{forum::Post, store::LedgerStore};
use kratia_governance::{Governance, ThreadPage};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, session::CurrentMember};

/// `GET /threads/{id}`
pub async fn page<S>(
  State(engine): State<Arc<Governance<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ThreadPage>, ApiError>
where
  S: LedgerStore + 'static,
{
  Ok(Json(engine.thread_page(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ReplyBody {
  pub content: String,
}

/// `POST /threads/{id}/posts`
pub async fn reply<S>(
  State(engine): State<Arc<Governance<S>>>,
  CurrentMember(member): CurrentMember,
  Path(id): Path<Uuid>,
  Json(body): Json<ReplyBody>,
) -> Result<(StatusCode, Json<Post>), ApiError>
where
  S: LedgerStore + 'static,
{
  let post = engine.post_reply(&member, id, &body.content).await?;
  Ok((StatusCode::CREATED, Json(post)))
}
