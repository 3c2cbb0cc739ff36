//! Members: registered forum participants and potential voters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a member stands in the community's lifecycle.
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
pub enum MemberStatus {
  Active,
  /// The target of an open sanction votation.
  UnderSanctionProcess,
  /// Suspended by a passed sanction votation until `sanction_end_date`.
  Sanctioned,
  PendingAdmission,
  PendingEmailVerification,
}

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
pub enum Role {
  Visitor,
  Guest,
  User,
  NormalUser,
  Admin,
  Founder,
}

impl Role {
  /// Visitors and guests are anonymous placeholders, not signed-in members.
  pub fn is_authenticated(self) -> bool {
    !matches!(self, Self::Visitor | Self::Guest)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
  pub id:                Uuid,
  pub username:          String,
  /// Registration instant; the account age feeds the karma policy.
  pub created_at:        DateTime<Utc>,
  pub karma:             u32,
  pub status:            MemberStatus,
  /// Has voting rights. Granted by the karma policy or by a passed admission
  /// votation.
  pub can_vote:          bool,
  /// Always set while `status` is [`MemberStatus::Sanctioned`].
  pub sanction_end_date: Option<DateTime<Utc>>,
  pub role:              Role,
  pub is_quarantined:    bool,
  pub total_posts:       u32,
  pub total_threads:     u32,
}

impl Member {
  /// A freshly registered member with no karma and no voting rights.
  pub fn new(username: impl Into<String>, status: MemberStatus) -> Self {
    Self {
      id: Uuid::new_v4(),
      username: username.into(),
      created_at: Utc::now(),
      karma: 0,
      status,
      can_vote: false,
      sanction_end_date: None,
      role: Role::User,
      is_quarantined: status == MemberStatus::PendingAdmission,
      total_posts: 0,
      total_threads: 0,
    }
  }

  /// Whether a sanction is in force at `now`.
  pub fn is_sanctioned_at(&self, now: DateTime<Utc>) -> bool {
    self.status == MemberStatus::Sanctioned
      && self.sanction_end_date.is_none_or(|end| end > now)
  }
}
