//! Votations: time-boxed binding community votes on a proposal.
//!
//! A votation starts `Active` and moves exactly once to one of the terminal
//! `Closed*` statuses. While active, only the tally fields (`options`,
//! `voters`, `total_votes_cast`) change; at closure only `status` and
//! `outcome` change.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

// ─── Status ──────────────────────────────────────────────────────────────────

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
pub enum VotationStatus {
  Active,
  ClosedPassed,
  ClosedFailedQuorum,
  ClosedFailedVote,
  /// Reserved for manually executed outcomes; never produced by closure.
  ClosedExecuted,
  /// Reserved for administrative rejection; never produced by closure.
  ClosedRejected,
}

impl VotationStatus {
  pub fn is_active(self) -> bool { matches!(self, Self::Active) }

  pub fn is_terminal(self) -> bool { !self.is_active() }
}

// ─── Votes ───────────────────────────────────────────────────────────────────

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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VoteChoice {
  For,
  Against,
  Abstain,
}

/// Running per-option counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOptions {
  #[serde(rename = "for")]
  pub in_favor: u32,
  pub against:  u32,
  pub abstain:  u32,
}

impl VoteOptions {
  pub fn record(&mut self, choice: VoteChoice) {
    match choice {
      VoteChoice::For => self.in_favor += 1,
      VoteChoice::Against => self.against += 1,
      VoteChoice::Abstain => self.abstain += 1,
    }
  }

  pub fn sum(&self) -> u32 { self.in_favor + self.against + self.abstain }
}

/// The tally as returned to a voter after a successful cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
  pub options:          VoteOptions,
  pub total_votes_cast: u32,
  pub quorum_required:  u32,
}

// ─── Proposal payloads ───────────────────────────────────────────────────────

/// How long a passed sanction lasts. The concrete end date is fixed when the
/// votation closes, not when it is proposed.
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
pub enum SanctionDuration {
  #[serde(rename = "1_day")]
  #[strum(serialize = "1_day")]
  OneDay,
  #[serde(rename = "3_days")]
  #[strum(serialize = "3_days")]
  ThreeDays,
  #[serde(rename = "1_week")]
  #[strum(serialize = "1_week")]
  OneWeek,
  #[serde(rename = "2_weeks")]
  #[strum(serialize = "2_weeks")]
  TwoWeeks,
  #[serde(rename = "1_month")]
  #[strum(serialize = "1_month")]
  OneMonth,
}

impl SanctionDuration {
  pub fn as_delta(self) -> TimeDelta {
    match self {
      Self::OneDay => TimeDelta::days(1),
      Self::ThreeDays => TimeDelta::days(3),
      Self::OneWeek => TimeDelta::weeks(1),
      Self::TwoWeeks => TimeDelta::weeks(2),
      Self::OneMonth => TimeDelta::days(30),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanctionProposal {
  pub target_user_id:    Uuid,
  pub target_username:   String,
  pub sanction_duration: SanctionDuration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleChangeProposal {
  pub proposed_constitution_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewForumProposal {
  pub proposed_forum_name:        String,
  pub proposed_forum_description: String,
  pub proposed_forum_category_id: Uuid,
  pub proposed_forum_is_public:   bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionProposal {
  pub target_user_id:  Uuid,
  pub target_username: String,
}

/// The discriminant stored alongside the payload.
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
pub enum VotationType {
  Sanction,
  RuleChange,
  NewForumProposal,
  AdmissionRequest,
  ForumManagement,
  Other,
}

/// The type-specific part of a votation. The variant name serves as the
/// `type` discriminant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Proposal {
  Sanction(SanctionProposal),
  RuleChange(RuleChangeProposal),
  NewForumProposal(NewForumProposal),
  AdmissionRequest(AdmissionProposal),
  ForumManagement,
  Other,
}

impl Proposal {
  pub fn kind(&self) -> VotationType {
    match self {
      Self::Sanction(_) => VotationType::Sanction,
      Self::RuleChange(_) => VotationType::RuleChange,
      Self::NewForumProposal(_) => VotationType::NewForumProposal,
      Self::AdmissionRequest(_) => VotationType::AdmissionRequest,
      Self::ForumManagement => VotationType::ForumManagement,
      Self::Other => VotationType::Other,
    }
  }

  /// The member a sanction or admission is about, if any.
  pub fn target_member(&self) -> Option<Uuid> {
    match self {
      Self::Sanction(p) => Some(p.target_user_id),
      Self::AdmissionRequest(p) => Some(p.target_user_id),
      _ => None,
    }
  }

  /// Serialise the inner payload (without the type tag) for storage.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    let full = serde_json::to_value(self)?;
    Ok(full.get("payload").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Rebuild from a stored discriminant and payload.
  pub fn from_parts(kind: VotationType, payload: serde_json::Value) -> Result<Self> {
    let wrapped = if payload.is_null() {
      serde_json::json!({ "type": kind.as_ref() })
    } else {
      serde_json::json!({ "type": kind.as_ref(), "payload": payload })
    };
    Ok(serde_json::from_value(wrapped)?)
  }
}

// ─── Votation ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Votation {
  pub id:                Uuid,
  pub title:             String,
  /// The proposer's justification.
  pub description:       String,
  pub proposer_id:       Uuid,
  pub proposer_username: String,
  pub created_at:        DateTime<Utc>,
  pub deadline:          DateTime<Utc>,
  pub status:            VotationStatus,
  pub proposal:          Proposal,
  pub options:           VoteOptions,
  /// One entry per member; the key uniqueness is what enforces one vote per
  /// member.
  pub voters:            BTreeMap<Uuid, VoteChoice>,
  pub total_votes_cast:  u32,
  pub quorum_required:   u32,
  pub related_thread_id: Uuid,
  /// Human-readable summary, set only at closure.
  pub outcome:           Option<String>,
}

impl Votation {
  pub fn kind(&self) -> VotationType { self.proposal.kind() }

  /// Active and past its deadline: closure should run.
  pub fn is_due(&self, now: DateTime<Utc>) -> bool {
    self.status.is_active() && self.deadline <= now
  }

  pub fn has_voted(&self, member_id: Uuid) -> bool {
    self.voters.contains_key(&member_id)
  }

  /// Whether `member_id` is the target of this sanction votation.
  pub fn is_sanction_target(&self, member_id: Uuid) -> bool {
    matches!(&self.proposal, Proposal::Sanction(p) if p.target_user_id == member_id)
  }

  /// Record `choice` for `member_id` in all three tally fields together.
  /// Callers must have checked eligibility first.
  pub fn record_vote(&mut self, member_id: Uuid, choice: VoteChoice) {
    self.options.record(choice);
    self.voters.insert(member_id, choice);
    self.total_votes_cast += 1;
  }

  /// `options` sum, `voters` size and `total_votes_cast` agree.
  pub fn tally_is_conserved(&self) -> bool {
    let voters = u32::try_from(self.voters.len()).unwrap_or(u32::MAX);
    self.options.sum() == self.total_votes_cast && voters == self.total_votes_cast
  }

  pub fn tally(&self) -> Tally {
    Tally {
      options:          self.options,
      total_votes_cast: self.total_votes_cast,
      quorum_required:  self.quorum_required,
    }
  }
}
