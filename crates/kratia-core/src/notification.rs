//! Notification records emitted to members.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::AsRefStr,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
  VotationConcludedProposer,
  VotationConcludedParticipant,
  NewReplyToThread,
  NewPrivateMessage,
  PostReaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub id:           Uuid,
  pub recipient_id: Uuid,
  pub kind:         NotificationKind,
  /// Kind-specific data, e.g. votation id, title and final status.
  pub payload:      serde_json::Value,
  pub created_at:   DateTime<Utc>,
  pub is_read:      bool,
}

impl Notification {
  pub fn new(
    recipient_id: Uuid,
    kind: NotificationKind,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      recipient_id,
      kind,
      payload,
      created_at,
      is_read: false,
    }
  }
}
