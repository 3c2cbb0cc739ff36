//! Vote casting.

use chrono::Utc;
use kratia_core::{
  Error, Result,
  eligibility::check_vote,
  member::Member,
  store::LedgerStore,
  votation::{Tally, VoteChoice},
};
use uuid::Uuid;

use crate::Governance;

impl<S: LedgerStore> Governance<S> {
  /// Record `member`'s vote and return the updated tally.
  ///
  /// Eligibility, deadline included, is checked inside the store
  /// transaction against the stored votation, so two concurrent casts can
  /// never both increment from the same read and no vote commits after the
  /// deadline. Any refusal leaves the tally untouched.
  pub async fn cast_vote(
    &self,
    member: &Member,
    votation_id: Uuid,
    choice: VoteChoice,
  ) -> Result<Tally> {
    let voter = member.clone();

    let outcome = self
      .store
      .transact_votation(votation_id, move |votation| {
        check_vote(&voter, votation, Utc::now())?;
        votation.record_vote(voter.id, choice);
        Ok(votation.tally())
      })
      .await
      .map_err(Error::store)?;

    match outcome {
      Ok(tally) => {
        tracing::info!(
          votation = %votation_id,
          member = %member.id,
          %choice,
          total = tally.total_votes_cast,
          "vote cast"
        );
        Ok(tally)
      }
      Err(err) => {
        tracing::debug!(votation = %votation_id, member = %member.id, "vote refused: {err}");
        Err(err)
      }
    }
  }
}
