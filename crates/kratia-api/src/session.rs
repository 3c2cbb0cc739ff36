//! Member context extractor.
//!
//! The acting member is named by the `x-kratia-member` header, standing in
//! for the session collaborator. Resolving it also lifts a sanction that has
//! run out.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use kratia_core::{Error, member::Member, store::LedgerStore};
use kratia_governance::Governance;
use uuid::Uuid;

use crate::error::ApiError;

pub const MEMBER_HEADER: &str = "x-kratia-member";

/// The member on whose behalf the request acts.
pub struct CurrentMember(pub Member);

impl<S> FromRequestParts<Arc<Governance<S>>> for CurrentMember
where
  S: LedgerStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    engine: &Arc<Governance<S>>,
  ) -> Result<Self, Self::Rejection> {
    let raw = parts
      .headers
      .get(MEMBER_HEADER)
      .ok_or_else(|| ApiError::Unauthorized(format!("missing {MEMBER_HEADER} header")))?;
    let id = raw
      .to_str()
      .ok()
      .and_then(|s| Uuid::parse_str(s.trim()).ok())
      .ok_or_else(|| ApiError::BadRequest(format!("{MEMBER_HEADER} must be a UUID")))?;

    match engine.lift_expired_sanction(id).await {
      Ok(member) => Ok(CurrentMember(member)),
      Err(Error::MemberNotFound(_)) => Err(ApiError::Unauthorized(format!("unknown member {id}"))),
      Err(e) => Err(e.into()),
    }
  }
}
