//! Sanction expiry.

use chrono::{DateTime, Utc};
use kratia_core::{
  Error, Result,
  member::{Member, MemberStatus},
  store::{BatchOutcome, LedgerStore, Precondition, Write, WriteBatch},
};
use uuid::Uuid;

use crate::Governance;

impl<S: LedgerStore> Governance<S> {
  /// Load a member, returning them to `active` first if their sanction has
  /// run out. Sanctions lapse lazily, like votations.
  pub async fn lift_expired_sanction(&self, member_id: Uuid) -> Result<Member> {
    self.lift_expired_sanction_as_of(member_id, Utc::now()).await
  }

  pub async fn lift_expired_sanction_as_of(
    &self,
    member_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Member> {
    let member = self.member(member_id).await?;
    let expired = member.status == MemberStatus::Sanctioned
      && member.sanction_end_date.is_some_and(|end| end <= now);
    if !expired {
      return Ok(member);
    }

    let mut batch = WriteBatch::new().require(Precondition::MemberStatusIs {
      member_id,
      status: MemberStatus::Sanctioned,
    });
    batch.push(Write::LiftSanction(member_id));

    if let BatchOutcome::Committed = self.store.commit_batch(batch).await.map_err(Error::store)? {
      tracing::info!(member = %member_id, "sanction expired and was lifted");
    }
    self.member(member_id).await
  }
}
