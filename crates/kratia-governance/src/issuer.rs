//! Proposal issuance.
//!
//! Every proposal becomes a votation plus a companion thread in the Agora
//! with a seed post, committed as one batch together with the Agora
//! counters and the proposer's karma. Neither half is ever visible alone.

use std::collections::BTreeMap;

use chrono::Utc;
use kratia_core::{
  Error, Result,
  eligibility::can_propose,
  forum::{Post, Thread},
  member::{Member, MemberStatus},
  store::{BatchOutcome, LedgerStore, Precondition, Write, WriteBatch},
  votation::{
    AdmissionProposal, NewForumProposal, Proposal, RuleChangeProposal, SanctionDuration,
    SanctionProposal, VoteOptions, Votation, VotationStatus,
  },
};
use serde::Serialize;
use uuid::Uuid;

use crate::{Governance, validate};

/// Identifiers of a freshly issued votation and its thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalReceipt {
  pub votation_id: Uuid,
  pub thread_id:   Uuid,
}

/// A validated proposal ready to be issued.
struct Draft {
  title:         String,
  justification: String,
  proposal:      Proposal,
  /// Extra lines appended to the seed post after the justification.
  details:       Vec<String>,
  preconditions: Vec<Precondition>,
  writes:        Vec<Write>,
}

fn ensure_can_propose(member: &Member) -> Result<()> {
  if can_propose(member) {
    Ok(())
  } else {
    Err(Error::Forbidden(format!(
      "member {} may not issue proposals",
      member.id
    )))
  }
}

impl<S: LedgerStore> Governance<S> {
  /// Put `target_id` on trial. The target is marked
  /// `under_sanction_process` in the issuance batch.
  pub async fn propose_sanction(
    &self,
    proposer: &Member,
    target_id: Uuid,
    duration: SanctionDuration,
    justification: &str,
  ) -> Result<ProposalReceipt> {
    ensure_can_propose(proposer)?;
    let justification =
      validate::text("justification", justification, &self.config.limits.justification)?;

    if target_id == proposer.id {
      return Err(Error::InvalidTarget(
        "a member cannot propose a sanction against themselves".into(),
      ));
    }
    let target = self.member(target_id).await?;
    match target.status {
      MemberStatus::Active => {}
      MemberStatus::Sanctioned | MemberStatus::UnderSanctionProcess => {
        return Err(Error::InvalidTarget(format!(
          "{} is already sanctioned or under a sanction process",
          target.username
        )));
      }
      other => {
        return Err(Error::InvalidTarget(format!(
          "{} cannot be sanctioned while {other}",
          target.username
        )));
      }
    }

    let draft = Draft {
      title: format!("Sanction for {}", target.username),
      justification,
      details: vec![format!(
        "Proposed sanction: {duration} for {}.",
        target.username
      )],
      proposal: Proposal::Sanction(SanctionProposal {
        target_user_id:    target.id,
        target_username:   target.username.clone(),
        sanction_duration: duration,
      }),
      preconditions: vec![Precondition::MemberStatusIs {
        member_id: target.id,
        status:    MemberStatus::Active,
      }],
      writes: vec![Write::SetMemberStatus {
        member_id: target.id,
        status:    MemberStatus::UnderSanctionProcess,
      }],
    };
    self.issue(proposer, draft).await
  }

  /// Propose replacing the constitution with `full_text`.
  pub async fn propose_rule_change(
    &self,
    proposer: &Member,
    title: &str,
    justification: &str,
    full_text: &str,
  ) -> Result<ProposalReceipt> {
    ensure_can_propose(proposer)?;
    let limits = &self.config.limits;
    let title = validate::text("title", title, &limits.title)?;
    let justification = validate::text("justification", justification, &limits.justification)?;
    let full_text = validate::text("constitution text", full_text, &limits.constitution_text)?;

    let draft = Draft {
      title,
      justification,
      details: vec![format!("Proposed constitution:\n\n{full_text}")],
      proposal: Proposal::RuleChange(RuleChangeProposal {
        proposed_constitution_text: full_text,
      }),
      preconditions: Vec::new(),
      writes: Vec::new(),
    };
    self.issue(proposer, draft).await
  }

  pub async fn propose_new_forum(
    &self,
    proposer: &Member,
    name: &str,
    description: &str,
    category_id: Uuid,
    is_public: bool,
    justification: &str,
  ) -> Result<ProposalReceipt> {
    ensure_can_propose(proposer)?;
    let limits = &self.config.limits;
    let name = validate::text("forum name", name, &limits.forum_name)?;
    let description = validate::text("forum description", description, &limits.forum_description)?;
    let justification = validate::text("justification", justification, &limits.justification)?;

    let category = self
      .store
      .get_category(category_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::Validation(format!("category {category_id} does not exist")))?;

    let visibility = if is_public { "public" } else { "members only" };
    let draft = Draft {
      title: format!("New forum: {name}"),
      justification,
      details: vec![
        format!("Proposed forum: {name} ({visibility}) in {}.", category.name),
        description.clone(),
      ],
      proposal: Proposal::NewForumProposal(NewForumProposal {
        proposed_forum_name:        name,
        proposed_forum_description: description,
        proposed_forum_category_id: category.id,
        proposed_forum_is_public:   is_public,
      }),
      preconditions: Vec::new(),
      writes: Vec::new(),
    };
    self.issue(proposer, draft).await
  }

  /// Sponsor a `pending_admission` applicant for full membership.
  pub async fn propose_admission(
    &self,
    sponsor: &Member,
    applicant_id: Uuid,
    justification: &str,
  ) -> Result<ProposalReceipt> {
    ensure_can_propose(sponsor)?;
    let justification =
      validate::text("justification", justification, &self.config.limits.justification)?;

    if applicant_id == sponsor.id {
      return Err(Error::InvalidTarget("a member cannot sponsor themselves".into()));
    }
    let applicant = self.member(applicant_id).await?;
    if applicant.status != MemberStatus::PendingAdmission {
      return Err(Error::InvalidTarget(format!(
        "{} is not awaiting admission",
        applicant.username
      )));
    }

    let draft = Draft {
      title: format!("Admission of {}", applicant.username),
      justification,
      details: vec![format!("Applicant: {}.", applicant.username)],
      proposal: Proposal::AdmissionRequest(AdmissionProposal {
        target_user_id:  applicant.id,
        target_username: applicant.username.clone(),
      }),
      preconditions: vec![Precondition::MemberStatusIs {
        member_id: applicant.id,
        status:    MemberStatus::PendingAdmission,
      }],
      writes: Vec::new(),
    };
    self.issue(sponsor, draft).await
  }

  async fn issue(&self, proposer: &Member, draft: Draft) -> Result<ProposalReceipt> {
    let now = Utc::now();
    let agora = self.config.agora_forum_id;
    if self.store.get_forum(agora).await.map_err(Error::store)?.is_none() {
      return Err(Error::ForumNotFound(agora));
    }

    let votation_id = Uuid::new_v4();
    let thread_id = Uuid::new_v4();
    let kind = draft.proposal.kind();

    let mut seed = draft.justification.clone();
    for line in &draft.details {
      seed.push_str("\n\n");
      seed.push_str(line);
    }

    let votation = Votation {
      id:                votation_id,
      title:             draft.title.clone(),
      description:       draft.justification,
      proposer_id:       proposer.id,
      proposer_username: proposer.username.clone(),
      created_at:        now,
      deadline:          now + self.config.voting_window(),
      status:            VotationStatus::Active,
      proposal:          draft.proposal,
      options:           VoteOptions::default(),
      voters:            BTreeMap::new(),
      total_votes_cast:  0,
      quorum_required:   self.config.quorum_required,
      related_thread_id: thread_id,
      outcome:           None,
    };
    let thread = Thread {
      id:                  thread_id,
      forum_id:            agora,
      author_id:           proposer.id,
      title:               draft.title,
      created_at:          now,
      last_reply_at:       now,
      reply_count:         0,
      is_locked:           false,
      is_sticky:           false,
      related_votation_id: Some(votation_id),
    };
    let post = Post {
      id:         Uuid::new_v4(),
      thread_id,
      author_id:  proposer.id,
      content:    seed,
      created_at: now,
    };

    let proposer_active = Precondition::MemberStatusIs {
      member_id: proposer.id,
      status:    MemberStatus::Active,
    };
    let mut batch = WriteBatch::new().require(proposer_active.clone());
    for precondition in draft.preconditions {
      batch = batch.require(precondition);
    }
    batch.push(Write::InsertVotation(votation));
    batch.push(Write::InsertThread(thread));
    batch.push(Write::InsertPost(post));
    batch.push(Write::IncrementForumCounters { forum_id: agora, threads: 1, posts: 1 });
    batch.push(Write::IncrementMemberActivity {
      member_id: proposer.id,
      karma:     self.config.karma.proposal_reward,
      posts:     1,
      threads:   1,
    });
    batch.push(Write::PromoteIfQualified {
      member_id:         proposer.id,
      karma_threshold:   self.config.karma.voting_threshold,
      registered_before: self.config.karma.registered_before(now),
    });
    for write in draft.writes {
      batch.push(write);
    }

    match self.store.commit_batch(batch).await.map_err(Error::store)? {
      BatchOutcome::Committed => {
        tracing::info!(
          votation = %votation_id,
          thread = %thread_id,
          %kind,
          proposer = %proposer.id,
          "proposal issued"
        );
        Ok(ProposalReceipt { votation_id, thread_id })
      }
      BatchOutcome::Rejected(failed) if failed == proposer_active => Err(Error::Forbidden(
        format!("member {} is no longer in good standing", proposer.id),
      )),
      BatchOutcome::Rejected(failed) => {
        tracing::debug!(?failed, "proposal target changed before issuance");
        Err(Error::InvalidTarget(
          "the proposal target changed status; please reload and try again".into(),
        ))
      }
    }
  }
}
