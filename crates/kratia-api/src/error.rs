//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use kratia_core::ErrorKind;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// No member context on a request that acts on someone's behalf.
  #[error("sign in required: {0}")]
  Unauthorized(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Governance(#[from] kratia_core::Error),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, kind, message) = match &self {
      ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized".to_owned(), m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, "bad_request".to_owned(), m.clone()),
      ApiError::Governance(e) => {
        let kind = e.kind();
        let status = match kind {
          ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
          ErrorKind::Forbidden => StatusCode::FORBIDDEN,
          ErrorKind::InvalidState => StatusCode::CONFLICT,
          ErrorKind::NotFound => StatusCode::NOT_FOUND,
          ErrorKind::Infrastructure => StatusCode::SERVICE_UNAVAILABLE,
        };
        let message = if kind == ErrorKind::Infrastructure {
          tracing::error!("request failed: {e}");
          "temporarily unavailable, please retry".to_owned()
        } else {
          e.to_string()
        };
        (status, kind.as_ref().to_owned(), message)
      }
    };
    (status, Json(json!({ "error": message, "kind": kind }))).into_response()
  }
}
