//! Votation closure.
//!
//! Closure is triggered by reads: anything that surfaces a votation calls
//! [`Governance::ensure_closed`], which closes it if it is active and past
//! its deadline. The status transition, the type-specific side effect, the
//! thread lock and the conclusion notifications are one batch guarded by
//! [`Precondition::VotationActive`], so racing readers apply it at most once.
//! The batch also pins the tally it was decided on with
//! [`Precondition::VotationTallyIs`]; a vote landing in between forces a
//! fresh read and a fresh decision.

use chrono::{DateTime, Utc};
use kratia_core::{
  Error, ErrorKind, Result,
  forum::Forum,
  member::MemberStatus,
  store::{BatchOutcome, LedgerStore, Precondition, VotationQuery, Write, WriteBatch},
  votation::{Proposal, Votation, VotationStatus},
};
use uuid::Uuid;

use crate::{Governance, notify};

/// Fresh decisions attempted when votes keep landing during closure. Once
/// exhausted the votation stays active for the next reader.
const CLOSE_ATTEMPTS: usize = 5;

/// The terminal status a due votation closes with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
  pub status:  VotationStatus,
  /// Human-readable summary of the branch taken.
  pub outcome: String,
}

/// Decide how `votation` closes at `now`.
///
/// The quorum gate comes first: without quorum the result is
/// `ClosedFailedQuorum` whatever the split. With quorum, strictly more
/// votes for than against passes; abstentions are not compared and ties
/// fail.
pub fn evaluate(votation: &Votation, minimum_quorum: u32, now: DateTime<Utc>) -> Decision {
  let required = votation.quorum_required.max(minimum_quorum);
  let o = votation.options;
  let counts = format!("{} for, {} against, {} abstaining", o.in_favor, o.against, o.abstain);

  if votation.total_votes_cast < required {
    return Decision {
      status:  VotationStatus::ClosedFailedQuorum,
      outcome: format!(
        "Quorum not reached: {} of {required} required votes cast ({counts}).",
        votation.total_votes_cast
      ),
    };
  }

  if o.in_favor > o.against {
    let mut outcome = format!("Passed with {counts}.");
    if let Some(effect) = effect_summary(&votation.proposal, now) {
      outcome.push(' ');
      outcome.push_str(&effect);
    }
    Decision { status: VotationStatus::ClosedPassed, outcome }
  } else {
    Decision {
      status:  VotationStatus::ClosedFailedVote,
      outcome: format!("Rejected with {counts}."),
    }
  }
}

fn effect_summary(proposal: &Proposal, now: DateTime<Utc>) -> Option<String> {
  match proposal {
    Proposal::Sanction(p) => Some(format!(
      "{} is sanctioned until {}.",
      p.target_username,
      (now + p.sanction_duration.as_delta()).format("%Y-%m-%d %H:%M UTC")
    )),
    Proposal::RuleChange(_) => Some("The constitution has been updated.".to_owned()),
    Proposal::NewForumProposal(p) => {
      Some(format!("Forum \"{}\" has been created.", p.proposed_forum_name))
    }
    Proposal::AdmissionRequest(p) => Some(format!("{} has been admitted.", p.target_username)),
    Proposal::ForumManagement | Proposal::Other => None,
  }
}

/// Everything a closure writes, minus notifications.
fn closure_batch(votation: &Votation, decision: &Decision, now: DateTime<Utc>) -> WriteBatch {
  let mut batch = WriteBatch::new()
    .require(Precondition::VotationActive(votation.id))
    .require(Precondition::VotationTallyIs {
      votation_id:      votation.id,
      total_votes_cast: votation.total_votes_cast,
    });
  batch.push(Write::CloseVotation {
    votation_id: votation.id,
    status:      decision.status,
    outcome:     decision.outcome.clone(),
  });

  let passed = decision.status == VotationStatus::ClosedPassed;
  match &votation.proposal {
    Proposal::Sanction(p) if passed => batch.push(Write::SanctionMember {
      member_id: p.target_user_id,
      until:     now + p.sanction_duration.as_delta(),
    }),
    Proposal::Sanction(p) => batch.push(Write::RestoreMemberStatus {
      member_id: p.target_user_id,
      from:      MemberStatus::UnderSanctionProcess,
      to:        MemberStatus::Active,
    }),
    Proposal::RuleChange(p) if passed => batch.push(Write::UpdateConstitution {
      text: p.proposed_constitution_text.clone(),
      at:   now,
    }),
    Proposal::AdmissionRequest(p) if passed => {
      batch.push(Write::AdmitMember(p.target_user_id))
    }
    Proposal::NewForumProposal(p) if passed => batch.push(Write::InsertForum(Forum {
      id:           Uuid::new_v4(),
      category_id:  p.proposed_forum_category_id,
      name:         p.proposed_forum_name.clone(),
      description:  p.proposed_forum_description.clone(),
      is_public:    p.proposed_forum_is_public,
      thread_count: 0,
      post_count:   0,
      created_at:   now,
    })),
    _ => {}
  }

  batch.push(Write::LockThread(votation.related_thread_id));
  batch
}

impl<S: LedgerStore> Governance<S> {
  /// Return the votation, closing it first if it is due.
  ///
  /// Idempotent: once closed, further calls only read. An infrastructure
  /// failure leaves the votation active and is returned as
  /// [`Error::Store`]; the next call retries.
  pub async fn ensure_closed(&self, votation_id: Uuid) -> Result<Votation> {
    self.ensure_closed_as_of(votation_id, Utc::now()).await
  }

  pub async fn ensure_closed_as_of(
    &self,
    votation_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Votation> {
    let votation = self.stored_votation(votation_id).await?;
    if !votation.is_due(now) {
      return Ok(votation);
    }
    self.close(&votation, now).await?;
    self.stored_votation(votation_id).await
  }

  /// Close every due votation, up to `limit`, and return how many this call
  /// closed. Failures are logged and left for the next sweep or read.
  pub async fn sweep_expired(&self, limit: usize) -> Result<usize> {
    let now = Utc::now();
    let query = VotationQuery {
      status: Some(VotationStatus::Active),
      due_before: Some(now),
      limit: Some(limit),
      ..Default::default()
    };
    let due = self.store.list_votations(&query).await.map_err(Error::store)?;

    let mut closed = 0;
    for votation in &due {
      match self.close(votation, now).await {
        Ok(true) => closed += 1,
        Ok(false) => {}
        Err(err) => tracing::warn!(votation = %votation.id, "sweep could not close votation: {err}"),
      }
    }
    if closed > 0 {
      tracing::info!(closed, "sweep closed expired votations");
    }
    Ok(closed)
  }

  /// Like [`Self::ensure_closed_as_of`] on an already loaded votation, but
  /// an infrastructure failure degrades to the stored (still active) copy.
  /// For read paths that should render even when closure has to wait.
  pub(crate) async fn settle(&self, votation: Votation, now: DateTime<Utc>) -> Result<Votation> {
    if !votation.is_due(now) {
      return Ok(votation);
    }
    match self.close(&votation, now).await {
      Ok(_) => self.stored_votation(votation.id).await,
      Err(err) if err.kind() == ErrorKind::Infrastructure => Ok(votation),
      Err(err) => Err(err),
    }
  }

  /// Close `votation`. `Ok(true)` if this call committed the closure,
  /// `Ok(false)` if another closure got there first.
  pub(crate) async fn close(&self, votation: &Votation, now: DateTime<Utc>) -> Result<bool> {
    let mut current = votation.clone();
    for _ in 0..CLOSE_ATTEMPTS {
      match self.try_close(&current, now).await? {
        BatchOutcome::Committed => return Ok(true),
        BatchOutcome::Rejected(Precondition::VotationTallyIs { .. }) => {
          current = self.stored_votation(votation.id).await?;
          if current.status.is_terminal() {
            return Ok(false);
          }
          tracing::debug!(
            votation = %votation.id,
            total = current.total_votes_cast,
            "tally moved during closure, deciding again"
          );
        }
        BatchOutcome::Rejected(_) => {
          tracing::debug!(votation = %votation.id, "votation already closed by a concurrent reader");
          return Ok(false);
        }
      }
    }
    tracing::warn!(votation = %votation.id, "tally kept moving, closure left for the next read");
    Ok(false)
  }

  /// Decide on `votation` as read and commit that decision if the stored
  /// votation still matches it.
  async fn try_close(&self, votation: &Votation, now: DateTime<Utc>) -> Result<BatchOutcome> {
    let decision = evaluate(votation, self.config.minimum_quorum, now);
    let notifications = notify::votation_concluded(votation, &decision, now);

    let mut batch = closure_batch(votation, &decision, now);
    for notification in &notifications {
      batch.push(Write::InsertNotification(notification.clone()));
    }

    let outcome = match self.store.commit_batch(batch).await {
      Ok(outcome) => outcome,
      Err(err) => {
        tracing::warn!(
          votation = %votation.id,
          "closure failed, votation stays active until the next read: {err}"
        );
        return Err(Error::store(err));
      }
    };

    if outcome.is_committed() {
      tracing::info!(
        votation = %votation.id,
        kind = %votation.kind(),
        status = %decision.status,
        votes_for = votation.options.in_favor,
        votes_against = votation.options.against,
        votes_abstain = votation.options.abstain,
        "votation closed"
      );
      for notification in &notifications {
        self.notifier.notify(notification);
      }
    }
    Ok(outcome)
  }
}
