//! Eligibility and karma policy.
//!
//! Pure predicates over a member (and a votation). The same checks gate the
//! UI and are re-run inside the vote transaction; UI gating alone is never
//! trusted.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  member::{Member, MemberStatus},
  votation::Votation,
};

/// Signed in, holding voting rights, and in good standing.
pub fn can_propose(member: &Member) -> bool {
  member.role.is_authenticated()
    && member.can_vote
    && member.status == MemberStatus::Active
}

/// Explain why `member` may not vote on `votation` at `now`, or `Ok(())`.
///
/// A sanction target is always refused with [`Error::SelfVoteForbidden`],
/// even though their `under_sanction_process` status would also fail the
/// proposer check.
pub fn check_vote(member: &Member, votation: &Votation, now: DateTime<Utc>) -> Result<()> {
  if votation.is_sanction_target(member.id) {
    return Err(Error::SelfVoteForbidden(member.id));
  }
  if !can_propose(member) {
    return Err(Error::Forbidden(format!(
      "member {} does not hold voting rights",
      member.id
    )));
  }
  if !votation.status.is_active() {
    return Err(Error::InvalidState(format!(
      "votation {} is {}",
      votation.id, votation.status
    )));
  }
  if votation.deadline <= now {
    return Err(Error::InvalidState(format!(
      "voting on votation {} ended at {}",
      votation.id, votation.deadline
    )));
  }
  if votation.has_voted(member.id) {
    return Err(Error::DuplicateVote {
      votation_id: votation.id,
      member_id:   member.id,
    });
  }
  Ok(())
}

pub fn can_vote(member: &Member, votation: &Votation, now: DateTime<Utc>) -> bool {
  check_vote(member, votation, now).is_ok()
}

/// Members on trial may still post in their own defence; sanctioned members
/// may not post until the sanction lapses.
pub fn can_post(member: &Member, now: DateTime<Utc>) -> bool {
  member.role.is_authenticated()
    && !member.is_sanctioned_at(now)
    && matches!(
      member.status,
      MemberStatus::Active | MemberStatus::UnderSanctionProcess
    )
}

// ─── Karma ───────────────────────────────────────────────────────────────────

/// When accumulated activity grants voting rights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KarmaPolicy {
  /// Karma granted for issuing a proposal.
  pub proposal_reward:          u32,
  /// Karma granted for each reply.
  pub reply_reward:             u32,
  /// Minimum karma for voting rights.
  pub voting_threshold:         u32,
  pub minimum_account_age_days: u32,
}

impl Default for KarmaPolicy {
  fn default() -> Self {
    Self {
      proposal_reward:          5,
      reply_reward:             1,
      voting_threshold:         50,
      minimum_account_age_days: 7,
    }
  }
}

impl KarmaPolicy {
  /// Members registered at or before this instant are old enough to vote.
  pub fn registered_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
    now - TimeDelta::days(i64::from(self.minimum_account_age_days))
  }

  /// Whether `member` should be promoted to voting rights at `now`.
  pub fn qualifies(&self, member: &Member, now: DateTime<Utc>) -> bool {
    member.status == MemberStatus::Active
      && member.karma >= self.voting_threshold
      && member.created_at <= self.registered_before(now)
  }
}
