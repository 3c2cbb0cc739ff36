//! Error types for `kratia-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed input; nothing was written.
  #[error("validation failed: {0}")]
  Validation(String),

  /// The acting member is not eligible for the operation.
  #[error("forbidden: {0}")]
  Forbidden(String),

  /// The target document is not in a state that permits the operation.
  #[error("invalid state: {0}")]
  InvalidState(String),

  #[error("member {member_id} has already voted on votation {votation_id}")]
  DuplicateVote { votation_id: Uuid, member_id: Uuid },

  #[error("member {0} cannot vote on their own sanction")]
  SelfVoteForbidden(Uuid),

  #[error("invalid proposal target: {0}")]
  InvalidTarget(String),

  #[error("member not found: {0}")]
  MemberNotFound(Uuid),

  #[error("votation not found: {0}")]
  VotationNotFound(Uuid),

  #[error("thread not found: {0}")]
  ThreadNotFound(Uuid),

  #[error("forum not found: {0}")]
  ForumNotFound(Uuid),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Transaction or batch commit failure. The atomicity contract guarantees
  /// that nothing was written; the caller may retry.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Coarse classification used by callers to map errors to user-facing
/// responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
  Validation,
  Forbidden,
  InvalidState,
  NotFound,
  Infrastructure,
}

impl Error {
  /// Wrap a backend error as an infrastructure failure.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Validation(_) => ErrorKind::Validation,
      Self::Forbidden(_) => ErrorKind::Forbidden,
      Self::InvalidState(_)
      | Self::DuplicateVote { .. }
      | Self::SelfVoteForbidden(_)
      | Self::InvalidTarget(_) => ErrorKind::InvalidState,
      Self::MemberNotFound(_)
      | Self::VotationNotFound(_)
      | Self::ThreadNotFound(_)
      | Self::ForumNotFound(_) => ErrorKind::NotFound,
      Self::Serialization(_) | Self::Store(_) => ErrorKind::Infrastructure,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
