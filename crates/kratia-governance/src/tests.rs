//! Engine tests against an in-memory `SqliteStore`.

use std::{
  io,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
};

use chrono::{DateTime, TimeDelta, Utc};
use kratia_core::{
  Error, ErrorKind,
  eligibility::can_post,
  forum::{Forum, ForumCategory, Post, Thread},
  member::{Member, MemberStatus},
  notification::{Notification, NotificationKind},
  settings::SiteSettings,
  store::{BatchOutcome, LedgerStore, VotationQuery, Write, WriteBatch},
  votation::{SanctionDuration, VoteChoice, Votation, VotationStatus},
};
use kratia_store_sqlite::SqliteStore;
use uuid::Uuid;

use crate::{Governance, GovernanceConfig, Notifier, ProposalReceipt};

// ─── Fixtures ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder(Mutex<Vec<Notification>>);

impl Notifier for Recorder {
  fn notify(&self, notification: &Notification) {
    self.0.lock().unwrap().push(notification.clone());
  }
}

impl Recorder {
  fn count(&self) -> usize { self.0.lock().unwrap().len() }
}

struct Harness {
  engine:   Governance<SqliteStore>,
  recorder: Arc<Recorder>,
}

impl Harness {
  fn store(&self) -> &SqliteStore { self.engine.store() }
}

async fn harness() -> Harness { harness_with(GovernanceConfig::default()).await }

/// A store with the Agora bootstrapped, and an engine recording
/// notifications.
async fn harness_with(config: GovernanceConfig) -> Harness {
  let store = bootstrapped(&config).await;
  let recorder = Arc::new(Recorder::default());
  let engine = Governance::new(Arc::new(store), config).with_notifier(recorder.clone());
  Harness { engine, recorder }
}

async fn bootstrapped(config: &GovernanceConfig) -> SqliteStore {
  let store = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store");
  let now = Utc::now();

  let mut batch = WriteBatch::new();
  batch.push(Write::InsertCategory(ForumCategory {
    id:          config.agora_category_id,
    name:        "Governance".into(),
    description: None,
    created_at:  now,
  }));
  batch.push(Write::InsertForum(Forum {
    id:           config.agora_forum_id,
    category_id:  config.agora_category_id,
    name:         "Agora".into(),
    description:  "Where the community votes".into(),
    is_public:    true,
    thread_count: 0,
    post_count:   0,
    created_at:   now,
  }));
  assert!(store.commit_batch(batch).await.unwrap().is_committed());
  store
}

/// A long-standing member with voting rights.
async fn voter(h: &Harness, name: &str) -> Member { put_voter(h.store(), name).await }

async fn put_voter<S: LedgerStore>(store: &S, name: &str) -> Member {
  let mut m = Member::new(name, MemberStatus::Active);
  m.can_vote = true;
  m.karma = 60;
  m.created_at = Utc::now() - TimeDelta::days(30);
  store.put_member(&m).await.unwrap();
  m
}

async fn voters(h: &Harness, prefix: &str, n: usize) -> Vec<Member> {
  let mut out = Vec::with_capacity(n);
  for i in 0..n {
    out.push(voter(h, &format!("{prefix}{i}")).await);
  }
  out
}

async fn reload(h: &Harness, m: &Member) -> Member {
  h.store().get_member(m.id).await.unwrap().unwrap()
}

async fn agora(h: &Harness) -> Forum {
  let id = h.engine.config().agora_forum_id;
  h.store().get_forum(id).await.unwrap().unwrap()
}

/// After every votation issued now has run out of time.
fn after_deadline() -> DateTime<Utc> { Utc::now() + TimeDelta::hours(73) }

const JUSTIFICATION: &str = "This has been discussed at length in the open threads.";
const CONSTITUTION: &str = "Article 1: every member has one vote.";

async fn rule_change(h: &Harness, proposer: &Member) -> ProposalReceipt {
  h.engine
    .propose_rule_change(proposer, "Simplify article one", JUSTIFICATION, CONSTITUTION)
    .await
    .unwrap()
}

async fn cast_all(h: &Harness, members: &[Member], votation_id: Uuid, choice: VoteChoice) {
  for m in members {
    h.engine.cast_vote(m, votation_id, choice).await.unwrap();
  }
}

// ─── Issuance ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn issuance_writes_votation_thread_and_counters_together() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;

  let receipt = rule_change(&h, &alice).await;

  let votation = h.store().get_votation(receipt.votation_id).await.unwrap().unwrap();
  assert_eq!(votation.status, VotationStatus::Active);
  assert_eq!(votation.related_thread_id, receipt.thread_id);
  assert_eq!(votation.quorum_required, 5);
  assert_eq!(votation.deadline - votation.created_at, TimeDelta::hours(72));
  assert_eq!(votation.total_votes_cast, 0);

  let thread = h.store().get_thread(receipt.thread_id).await.unwrap().unwrap();
  assert_eq!(thread.related_votation_id, Some(receipt.votation_id));
  assert_eq!(thread.forum_id, h.engine.config().agora_forum_id);
  let posts = h.store().list_posts(receipt.thread_id).await.unwrap();
  assert_eq!(posts.len(), 1);
  assert!(posts[0].content.starts_with(JUSTIFICATION));
  assert!(posts[0].content.contains(CONSTITUTION));

  let forum = agora(&h).await;
  assert_eq!((forum.thread_count, forum.post_count), (1, 1));

  let alice = reload(&h, &alice).await;
  assert_eq!(alice.karma, 65);
  assert_eq!((alice.total_posts, alice.total_threads), (1, 1));
}

#[tokio::test]
async fn member_without_voting_rights_cannot_propose() {
  let h = harness().await;
  let mut newcomer = Member::new("newcomer", MemberStatus::Active);
  newcomer.created_at = Utc::now() - TimeDelta::days(30);
  h.store().put_member(&newcomer).await.unwrap();

  let err = h
    .engine
    .propose_rule_change(&newcomer, "Simplify article one", JUSTIFICATION, CONSTITUTION)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));

  let forum = agora(&h).await;
  assert_eq!((forum.thread_count, forum.post_count), (0, 0));
}

#[tokio::test]
async fn malformed_payloads_fail_validation() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;

  let err = h
    .engine
    .propose_rule_change(&alice, "Hi", JUSTIFICATION, CONSTITUTION)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));

  let err = h
    .engine
    .propose_rule_change(&alice, "Simplify article one", "too short", CONSTITUTION)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));

  let err = h
    .engine
    .propose_new_forum(&alice, "Gardening", "Plants and soil talk", Uuid::new_v4(), true, JUSTIFICATION)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(msg) if msg.contains("category")));

  assert_eq!(agora(&h).await.thread_count, 0);
}

#[tokio::test]
async fn sanction_marks_target_on_trial() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let mallory = voter(&h, "mallory").await;

  h.engine
    .propose_sanction(&alice, mallory.id, SanctionDuration::OneWeek, JUSTIFICATION)
    .await
    .unwrap();

  assert_eq!(reload(&h, &mallory).await.status, MemberStatus::UnderSanctionProcess);
}

#[tokio::test]
async fn sanction_target_must_be_someone_else_in_good_standing() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let bob = voter(&h, "bob").await;
  let mallory = voter(&h, "mallory").await;

  let err = h
    .engine
    .propose_sanction(&alice, alice.id, SanctionDuration::OneDay, JUSTIFICATION)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidTarget(_)));

  h.engine
    .propose_sanction(&alice, mallory.id, SanctionDuration::OneDay, JUSTIFICATION)
    .await
    .unwrap();
  let err = h
    .engine
    .propose_sanction(&bob, mallory.id, SanctionDuration::OneDay, JUSTIFICATION)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidTarget(_)));

  let err = h
    .engine
    .propose_sanction(&alice, Uuid::new_v4(), SanctionDuration::OneDay, JUSTIFICATION)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::MemberNotFound(_)));

  // Only the one successful sanction reached the Agora.
  assert_eq!(agora(&h).await.thread_count, 1);
}

#[tokio::test]
async fn admission_requires_pending_applicant() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let bob = voter(&h, "bob").await;

  let err = h
    .engine
    .propose_admission(&alice, bob.id, JUSTIFICATION)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidTarget(_)));
}

// ─── Voting ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cast_vote_returns_updated_tally() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let receipt = rule_change(&h, &alice).await;

  let tally = h
    .engine
    .cast_vote(&alice, receipt.votation_id, VoteChoice::Abstain)
    .await
    .unwrap();
  assert_eq!(tally.options.abstain, 1);
  assert_eq!(tally.total_votes_cast, 1);
  assert_eq!(tally.quorum_required, 5);
}

#[tokio::test]
async fn duplicate_vote_is_rejected_and_tally_unchanged() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let receipt = rule_change(&h, &alice).await;

  h.engine
    .cast_vote(&alice, receipt.votation_id, VoteChoice::For)
    .await
    .unwrap();
  let err = h
    .engine
    .cast_vote(&alice, receipt.votation_id, VoteChoice::Against)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateVote { member_id, .. } if member_id == alice.id));

  let v = h.store().get_votation(receipt.votation_id).await.unwrap().unwrap();
  assert_eq!(v.options.in_favor, 1);
  assert_eq!(v.options.against, 0);
  assert_eq!(v.total_votes_cast, 1);
}

#[tokio::test]
async fn sanction_target_cannot_vote_on_own_sanction() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let mallory = voter(&h, "mallory").await;
  let receipt = h
    .engine
    .propose_sanction(&alice, mallory.id, SanctionDuration::OneDay, JUSTIFICATION)
    .await
    .unwrap();

  // Both the stale and the fresh copy of the target are refused the same way.
  for target in [mallory.clone(), reload(&h, &mallory).await] {
    let err = h
      .engine
      .cast_vote(&target, receipt.votation_id, VoteChoice::Against)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::SelfVoteForbidden(id) if id == mallory.id));
  }

  let v = h.store().get_votation(receipt.votation_id).await.unwrap().unwrap();
  assert_eq!(v.total_votes_cast, 0);
}

#[tokio::test]
async fn vote_on_missing_votation_is_not_found() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let err = h
    .engine
    .cast_vote(&alice, Uuid::new_v4(), VoteChoice::For)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::VotationNotFound(_)));
}

#[tokio::test]
async fn vote_on_closed_votation_is_invalid_state() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let bob = voter(&h, "bob").await;
  let receipt = rule_change(&h, &alice).await;
  h.engine
    .ensure_closed_as_of(receipt.votation_id, after_deadline())
    .await
    .unwrap();

  let err = h
    .engine
    .cast_vote(&bob, receipt.votation_id, VoteChoice::For)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn concurrent_votes_conserve_tally() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let receipt = rule_change(&h, &alice).await;
  let crowd = voters(&h, "voter", 24).await;

  let mut handles = Vec::new();
  for (i, m) in crowd.into_iter().enumerate() {
    let engine = h.engine.clone();
    let choice = [VoteChoice::For, VoteChoice::Against, VoteChoice::Abstain][i % 3];
    handles.push(tokio::spawn(async move {
      engine.cast_vote(&m, receipt.votation_id, choice).await
    }));
  }
  for handle in handles {
    handle.await.unwrap().unwrap();
  }

  let v = h.store().get_votation(receipt.votation_id).await.unwrap().unwrap();
  assert_eq!(v.total_votes_cast, 24);
  assert_eq!((v.options.in_favor, v.options.against, v.options.abstain), (8, 8, 8));
  assert!(v.tally_is_conserved());
}

#[tokio::test]
async fn concurrent_duplicate_votes_succeed_once() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let receipt = rule_change(&h, &alice).await;

  let mut handles = Vec::new();
  for _ in 0..8 {
    let engine = h.engine.clone();
    let m = alice.clone();
    handles.push(tokio::spawn(async move {
      engine.cast_vote(&m, receipt.votation_id, VoteChoice::For).await
    }));
  }
  let mut ok = 0;
  for handle in handles {
    match handle.await.unwrap() {
      Ok(_) => ok += 1,
      Err(err) => assert!(matches!(err, Error::DuplicateVote { .. })),
    }
  }
  assert_eq!(ok, 1);

  let v = h.store().get_votation(receipt.votation_id).await.unwrap().unwrap();
  assert_eq!(v.total_votes_cast, 1);
  assert!(v.tally_is_conserved());
}

// ─── Closure ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ensure_closed_before_deadline_is_a_read() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let receipt = rule_change(&h, &alice).await;

  let v = h.engine.ensure_closed(receipt.votation_id).await.unwrap();
  assert_eq!(v.status, VotationStatus::Active);
  assert!(v.outcome.is_none());
  assert_eq!(h.recorder.count(), 0);
}

#[tokio::test]
async fn sanction_passes() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let mallory = voter(&h, "mallory").await;
  let receipt = h
    .engine
    .propose_sanction(&alice, mallory.id, SanctionDuration::OneWeek, JUSTIFICATION)
    .await
    .unwrap();

  let crowd = voters(&h, "v", 8).await;
  cast_all(&h, &crowd[..6], receipt.votation_id, VoteChoice::For).await;
  cast_all(&h, &crowd[6..], receipt.votation_id, VoteChoice::Against).await;

  let now = after_deadline();
  let v = h.engine.ensure_closed_as_of(receipt.votation_id, now).await.unwrap();
  assert_eq!(v.status, VotationStatus::ClosedPassed);
  assert!(v.outcome.as_deref().is_some_and(|o| o.contains("6 for, 2 against")));

  let mallory = reload(&h, &mallory).await;
  assert_eq!(mallory.status, MemberStatus::Sanctioned);
  let end = mallory.sanction_end_date.unwrap();
  assert!((end - (now + TimeDelta::weeks(1))).abs() < TimeDelta::seconds(1));

  let thread = h.store().get_thread(receipt.thread_id).await.unwrap().unwrap();
  assert!(thread.is_locked);
}

#[tokio::test]
async fn failed_sanction_releases_target() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let mallory = voter(&h, "mallory").await;
  let receipt = h
    .engine
    .propose_sanction(&alice, mallory.id, SanctionDuration::OneDay, JUSTIFICATION)
    .await
    .unwrap();

  let crowd = voters(&h, "v", 5).await;
  cast_all(&h, &crowd, receipt.votation_id, VoteChoice::Against).await;

  let v = h
    .engine
    .ensure_closed_as_of(receipt.votation_id, after_deadline())
    .await
    .unwrap();
  assert_eq!(v.status, VotationStatus::ClosedFailedVote);

  let mallory = reload(&h, &mallory).await;
  assert_eq!(mallory.status, MemberStatus::Active);
  assert!(mallory.sanction_end_date.is_none());
}

#[tokio::test]
async fn rule_change_fails_vote() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let receipt = rule_change(&h, &alice).await;
  let before = h.store().site_settings().await.unwrap();

  let crowd = voters(&h, "v", 9).await;
  cast_all(&h, &crowd[..3], receipt.votation_id, VoteChoice::For).await;
  cast_all(&h, &crowd[3..8], receipt.votation_id, VoteChoice::Against).await;
  cast_all(&h, &crowd[8..], receipt.votation_id, VoteChoice::Abstain).await;

  let v = h
    .engine
    .ensure_closed_as_of(receipt.votation_id, after_deadline())
    .await
    .unwrap();
  assert_eq!(v.status, VotationStatus::ClosedFailedVote);

  let after = h.store().site_settings().await.unwrap();
  assert_eq!(after.constitution_text, before.constitution_text);
  assert!(after.last_updated.is_none());
}

#[tokio::test]
async fn rule_change_passes_and_rewrites_constitution() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let receipt = rule_change(&h, &alice).await;
  let crowd = voters(&h, "v", 5).await;
  cast_all(&h, &crowd, receipt.votation_id, VoteChoice::For).await;

  h.engine
    .ensure_closed_as_of(receipt.votation_id, after_deadline())
    .await
    .unwrap();

  let settings = h.store().site_settings().await.unwrap();
  assert_eq!(settings.constitution_text, CONSTITUTION);
  assert!(settings.last_updated.is_some());
}

#[tokio::test]
async fn quorum_not_met_despite_majority() {
  let config = GovernanceConfig { quorum_required: 10, ..Default::default() };
  let h = harness_with(config).await;
  let alice = voter(&h, "alice").await;
  let receipt = rule_change(&h, &alice).await;
  let crowd = voters(&h, "v", 4).await;
  cast_all(&h, &crowd, receipt.votation_id, VoteChoice::For).await;

  let v = h
    .engine
    .ensure_closed_as_of(receipt.votation_id, after_deadline())
    .await
    .unwrap();
  assert_eq!(v.status, VotationStatus::ClosedFailedQuorum);
  assert!(v.outcome.as_deref().is_some_and(|o| o.contains("4 of 10")));
  assert!(h.store().site_settings().await.unwrap().last_updated.is_none());
}

#[tokio::test]
async fn new_forum_is_created_exactly_once() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let category = ForumCategory {
    id:          Uuid::new_v4(),
    name:        "Hobbies".into(),
    description: Some("Life outside the forum".into()),
    created_at:  Utc::now(),
  };
  let mut batch = WriteBatch::new();
  batch.push(Write::InsertCategory(category.clone()));
  h.store().commit_batch(batch).await.unwrap();

  let receipt = h
    .engine
    .propose_new_forum(
      &alice,
      "Gardening",
      "Plants, soil and patience",
      category.id,
      false,
      JUSTIFICATION,
    )
    .await
    .unwrap();
  let crowd = voters(&h, "v", 5).await;
  cast_all(&h, &crowd, receipt.votation_id, VoteChoice::For).await;

  let now = after_deadline();
  let first = h.engine.ensure_closed_as_of(receipt.votation_id, now).await.unwrap();
  let second = h.engine.ensure_closed_as_of(receipt.votation_id, now).await.unwrap();
  assert_eq!(first.status, VotationStatus::ClosedPassed);
  assert_eq!(first, second);

  let forums = h.store().list_forums(category.id).await.unwrap();
  assert_eq!(forums.len(), 1);
  let forum = &forums[0];
  assert_eq!(forum.name, "Gardening");
  assert_eq!(forum.description, "Plants, soil and patience");
  assert!(!forum.is_public);
  assert_eq!((forum.thread_count, forum.post_count), (0, 0));
}

#[tokio::test]
async fn admission_passes_and_admits_applicant() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let applicant = Member::new("carol", MemberStatus::PendingAdmission);
  h.store().put_member(&applicant).await.unwrap();

  let receipt = h
    .engine
    .propose_admission(&alice, applicant.id, JUSTIFICATION)
    .await
    .unwrap();
  let crowd = voters(&h, "v", 5).await;
  cast_all(&h, &crowd, receipt.votation_id, VoteChoice::For).await;
  h.engine
    .ensure_closed_as_of(receipt.votation_id, after_deadline())
    .await
    .unwrap();

  let carol = reload(&h, &applicant).await;
  assert_eq!(carol.status, MemberStatus::Active);
  assert!(carol.can_vote);
  assert!(!carol.is_quarantined);
}

#[tokio::test]
async fn stale_admission_does_not_undo_a_later_sanction() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let applicant = Member::new("carol", MemberStatus::PendingAdmission);
  h.store().put_member(&applicant).await.unwrap();

  let first = h
    .engine
    .propose_admission(&alice, applicant.id, JUSTIFICATION)
    .await
    .unwrap();
  let second = h
    .engine
    .propose_admission(&alice, applicant.id, JUSTIFICATION)
    .await
    .unwrap();
  let crowd = voters(&h, "v", 5).await;
  cast_all(&h, &crowd, first.votation_id, VoteChoice::For).await;
  cast_all(&h, &crowd, second.votation_id, VoteChoice::For).await;

  let now = after_deadline();
  h.engine.ensure_closed_as_of(first.votation_id, now).await.unwrap();
  assert_eq!(reload(&h, &applicant).await.status, MemberStatus::Active);

  let sanction = h
    .engine
    .propose_sanction(&alice, applicant.id, SanctionDuration::OneMonth, JUSTIFICATION)
    .await
    .unwrap();
  cast_all(&h, &crowd, sanction.votation_id, VoteChoice::For).await;
  h.engine.ensure_closed_as_of(sanction.votation_id, now).await.unwrap();
  let sanctioned = reload(&h, &applicant).await;
  assert_eq!(sanctioned.status, MemberStatus::Sanctioned);

  let stale = h.engine.ensure_closed_as_of(second.votation_id, now).await.unwrap();
  assert_eq!(stale.status, VotationStatus::ClosedPassed);
  assert_eq!(reload(&h, &applicant).await, sanctioned);
}

#[tokio::test]
async fn closure_is_idempotent() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let mallory = voter(&h, "mallory").await;
  let receipt = h
    .engine
    .propose_sanction(&alice, mallory.id, SanctionDuration::OneDay, JUSTIFICATION)
    .await
    .unwrap();
  let crowd = voters(&h, "v", 5).await;
  cast_all(&h, &crowd, receipt.votation_id, VoteChoice::For).await;

  let now = after_deadline();
  let first = h.engine.ensure_closed_as_of(receipt.votation_id, now).await.unwrap();
  let sanctioned = reload(&h, &mallory).await;
  let notified = h.recorder.count();

  let later = now + TimeDelta::hours(1);
  let second = h.engine.ensure_closed_as_of(receipt.votation_id, later).await.unwrap();
  assert_eq!(first, second);
  assert_eq!(reload(&h, &mallory).await, sanctioned);
  assert_eq!(h.recorder.count(), notified);
  assert_eq!(h.store().list_notifications(alice.id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn racing_closures_apply_once() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let receipt = rule_change(&h, &alice).await;
  let crowd = voters(&h, "v", 5).await;
  cast_all(&h, &crowd, receipt.votation_id, VoteChoice::For).await;

  let now = after_deadline();
  let mut handles = Vec::new();
  for _ in 0..6 {
    let engine = h.engine.clone();
    handles.push(tokio::spawn(async move {
      engine.ensure_closed_as_of(receipt.votation_id, now).await
    }));
  }
  for handle in handles {
    let v = handle.await.unwrap().unwrap();
    assert_eq!(v.status, VotationStatus::ClosedPassed);
  }

  // Proposer plus five participants, once.
  assert_eq!(h.recorder.count(), 6);
}

#[tokio::test]
async fn vote_landing_during_closure_is_counted() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let receipt = rule_change(&h, &alice).await;
  let crowd = voters(&h, "v", 5).await;
  cast_all(&h, &crowd[..4], receipt.votation_id, VoteChoice::For).await;

  // Closure decides on four votes; the fifth commits before its batch does.
  let snapshot = h.engine.stored_votation(receipt.votation_id).await.unwrap();
  h.engine
    .cast_vote(&crowd[4], receipt.votation_id, VoteChoice::For)
    .await
    .unwrap();
  assert!(h.engine.close(&snapshot, after_deadline()).await.unwrap());

  let v = h.store().get_votation(receipt.votation_id).await.unwrap().unwrap();
  assert_eq!(v.status, VotationStatus::ClosedPassed);
  assert_eq!(v.total_votes_cast, 5);
  assert!(v.outcome.unwrap().starts_with("Passed with 5 for"));
  assert_eq!(h.store().site_settings().await.unwrap().constitution_text, CONSTITUTION);
  assert_eq!(h.recorder.count(), 6);
}

#[tokio::test]
async fn conclusion_notifies_proposer_and_participants() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let receipt = rule_change(&h, &alice).await;
  let crowd = voters(&h, "v", 5).await;
  h.engine
    .cast_vote(&alice, receipt.votation_id, VoteChoice::For)
    .await
    .unwrap();
  cast_all(&h, &crowd, receipt.votation_id, VoteChoice::For).await;

  h.engine
    .ensure_closed_as_of(receipt.votation_id, after_deadline())
    .await
    .unwrap();

  let to_alice = h.store().list_notifications(alice.id, 10).await.unwrap();
  assert_eq!(to_alice.len(), 1);
  assert_eq!(to_alice[0].kind, NotificationKind::VotationConcludedProposer);
  assert_eq!(to_alice[0].payload["status"], "closed_passed");

  for m in &crowd {
    let listed = h.store().list_notifications(m.id, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].kind, NotificationKind::VotationConcludedParticipant);
  }
}

#[tokio::test]
async fn sweep_closes_due_votations() {
  let config = GovernanceConfig { voting_window_hours: 0, ..Default::default() };
  let h = harness_with(config).await;
  let alice = voter(&h, "alice").await;
  let first = rule_change(&h, &alice).await;
  let second = rule_change(&h, &alice).await;

  assert_eq!(h.engine.sweep_expired(10).await.unwrap(), 2);
  assert_eq!(h.engine.sweep_expired(10).await.unwrap(), 0);

  for receipt in [first, second] {
    let v = h.store().get_votation(receipt.votation_id).await.unwrap().unwrap();
    assert_eq!(v.status, VotationStatus::ClosedFailedQuorum);
  }
}

#[tokio::test]
async fn listing_closes_due_votations() {
  let config = GovernanceConfig { voting_window_hours: 0, ..Default::default() };
  let h = harness_with(config).await;
  let alice = voter(&h, "alice").await;
  rule_change(&h, &alice).await;

  let listed = h.engine.list_votations(&VotationQuery::default()).await.unwrap();
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0].status, VotationStatus::ClosedFailedQuorum);
}

// ─── Threads & replies ───────────────────────────────────────────────────────

#[tokio::test]
async fn thread_page_triggers_closure() {
  let config = GovernanceConfig { voting_window_hours: 0, ..Default::default() };
  let h = harness_with(config).await;
  let alice = voter(&h, "alice").await;
  let receipt = rule_change(&h, &alice).await;

  let page = h.engine.thread_page(receipt.thread_id).await.unwrap();
  assert!(page.thread.is_locked);
  assert_eq!(page.posts.len(), 1);
  let v = page.votation.unwrap();
  assert_eq!(v.id, receipt.votation_id);
  assert!(v.status.is_terminal());
}

#[tokio::test]
async fn reply_updates_counters_and_notifies_author() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let bob = voter(&h, "bob").await;
  let receipt = rule_change(&h, &alice).await;

  let post = h
    .engine
    .post_reply(&bob, receipt.thread_id, "  I support this change.  ")
    .await
    .unwrap();
  assert_eq!(post.content, "I support this change.");

  let thread = h.store().get_thread(receipt.thread_id).await.unwrap().unwrap();
  assert_eq!(thread.reply_count, 1);
  assert_eq!(agora(&h).await.post_count, 2);

  let bob = reload(&h, &bob).await;
  assert_eq!((bob.karma, bob.total_posts), (61, 1));

  let to_alice = h.store().list_notifications(alice.id, 10).await.unwrap();
  assert_eq!(to_alice.len(), 1);
  assert_eq!(to_alice[0].kind, NotificationKind::NewReplyToThread);
  assert_eq!(to_alice[0].payload["postId"], post.id.to_string());

  // Replying in your own thread notifies nobody.
  h.engine
    .post_reply(&alice, receipt.thread_id, "Thanks for the support.")
    .await
    .unwrap();
  assert_eq!(h.store().list_notifications(alice.id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn reply_to_locked_thread_is_refused() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let receipt = rule_change(&h, &alice).await;
  h.engine
    .ensure_closed_as_of(receipt.votation_id, after_deadline())
    .await
    .unwrap();

  let err = h
    .engine
    .post_reply(&alice, receipt.thread_id, "One more thing")
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));
  assert_eq!(agora(&h).await.post_count, 1);
}

#[tokio::test]
async fn reply_promotes_author_past_threshold() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let receipt = rule_change(&h, &alice).await;

  let mut dave = Member::new("dave", MemberStatus::Active);
  dave.karma = 49;
  dave.created_at = Utc::now() - TimeDelta::days(10);
  h.store().put_member(&dave).await.unwrap();

  h.engine
    .post_reply(&dave, receipt.thread_id, "Long-time lurker, first post.")
    .await
    .unwrap();

  let dave = reload(&h, &dave).await;
  assert_eq!(dave.karma, 50);
  assert!(dave.can_vote);
}

#[tokio::test]
async fn young_account_is_not_promoted() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let receipt = rule_change(&h, &alice).await;

  let mut erin = Member::new("erin", MemberStatus::Active);
  erin.karma = 80;
  h.store().put_member(&erin).await.unwrap();

  h.engine
    .post_reply(&erin, receipt.thread_id, "Hello everyone.")
    .await
    .unwrap();
  assert!(!reload(&h, &erin).await.can_vote);
}

#[tokio::test]
async fn member_on_trial_may_still_reply() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let mallory = voter(&h, "mallory").await;
  let receipt = h
    .engine
    .propose_sanction(&alice, mallory.id, SanctionDuration::OneDay, JUSTIFICATION)
    .await
    .unwrap();

  let mallory = reload(&h, &mallory).await;
  h.engine
    .post_reply(&mallory, receipt.thread_id, "In my defence, I was provoked.")
    .await
    .unwrap();
}

// ─── Sanction expiry ─────────────────────────────────────────────────────────

#[tokio::test]
async fn expired_sanction_is_lifted_on_load() {
  let h = harness().await;
  let mut mallory = Member::new("mallory", MemberStatus::Sanctioned);
  mallory.sanction_end_date = Some(Utc::now() + TimeDelta::days(1));
  h.store().put_member(&mallory).await.unwrap();

  let still = h.engine.lift_expired_sanction(mallory.id).await.unwrap();
  assert_eq!(still.status, MemberStatus::Sanctioned);
  assert!(!can_post(&still, Utc::now()));

  let later = Utc::now() + TimeDelta::days(2);
  let lifted = h
    .engine
    .lift_expired_sanction_as_of(mallory.id, later)
    .await
    .unwrap();
  assert_eq!(lifted.status, MemberStatus::Active);
  assert!(lifted.sanction_end_date.is_none());
}

#[tokio::test]
async fn sanctioned_member_cannot_reply() {
  let h = harness().await;
  let alice = voter(&h, "alice").await;
  let receipt = rule_change(&h, &alice).await;
  let mut mallory = Member::new("mallory", MemberStatus::Sanctioned);
  mallory.sanction_end_date = Some(Utc::now() + TimeDelta::days(1));
  h.store().put_member(&mallory).await.unwrap();

  let err = h
    .engine
    .post_reply(&mallory, receipt.thread_id, "Let me back in")
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));
}

// ─── Store failures ──────────────────────────────────────────────────────────

/// Delegates to an in-memory `SqliteStore` but can be told to fail every
/// batch commit, as a lost connection would.
struct FlakyStore {
  inner:        SqliteStore,
  fail_commits: AtomicBool,
}

impl FlakyStore {
  fn fail_commits(&self, fail: bool) { self.fail_commits.store(fail, Ordering::SeqCst); }
}

type Flaky<T> = std::result::Result<T, io::Error>;

impl LedgerStore for FlakyStore {
  type Error = io::Error;

  async fn get_member(&self, id: Uuid) -> Flaky<Option<Member>> {
    self.inner.get_member(id).await.map_err(io::Error::other)
  }

  async fn put_member(&self, member: &Member) -> Flaky<()> {
    self.inner.put_member(member).await.map_err(io::Error::other)
  }

  async fn get_votation(&self, id: Uuid) -> Flaky<Option<Votation>> {
    self.inner.get_votation(id).await.map_err(io::Error::other)
  }

  async fn list_votations(&self, query: &VotationQuery) -> Flaky<Vec<Votation>> {
    self.inner.list_votations(query).await.map_err(io::Error::other)
  }

  async fn transact_votation<F, T>(&self, id: Uuid, f: F) -> Flaky<kratia_core::Result<T>>
  where
    F: FnOnce(&mut Votation) -> kratia_core::Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self.inner.transact_votation(id, f).await.map_err(io::Error::other)
  }

  async fn get_thread(&self, id: Uuid) -> Flaky<Option<Thread>> {
    self.inner.get_thread(id).await.map_err(io::Error::other)
  }

  async fn list_posts(&self, thread_id: Uuid) -> Flaky<Vec<Post>> {
    self.inner.list_posts(thread_id).await.map_err(io::Error::other)
  }

  async fn get_forum(&self, id: Uuid) -> Flaky<Option<Forum>> {
    self.inner.get_forum(id).await.map_err(io::Error::other)
  }

  async fn list_forums(&self, category_id: Uuid) -> Flaky<Vec<Forum>> {
    self.inner.list_forums(category_id).await.map_err(io::Error::other)
  }

  async fn get_category(&self, id: Uuid) -> Flaky<Option<ForumCategory>> {
    self.inner.get_category(id).await.map_err(io::Error::other)
  }

  async fn site_settings(&self) -> Flaky<SiteSettings> {
    self.inner.site_settings().await.map_err(io::Error::other)
  }

  async fn list_notifications(&self, recipient_id: Uuid, limit: usize) -> Flaky<Vec<Notification>> {
    self
      .inner
      .list_notifications(recipient_id, limit)
      .await
      .map_err(io::Error::other)
  }

  async fn commit_batch(&self, batch: WriteBatch) -> Flaky<BatchOutcome> {
    if self.fail_commits.load(Ordering::SeqCst) {
      return Err(io::Error::new(io::ErrorKind::BrokenPipe, "ledger connection lost"));
    }
    self.inner.commit_batch(batch).await.map_err(io::Error::other)
  }
}

#[tokio::test]
async fn failed_closure_commit_leaves_votation_for_the_next_read() {
  let config = GovernanceConfig { voting_window_hours: 0, ..Default::default() };
  let store = Arc::new(FlakyStore {
    inner:        bootstrapped(&config).await,
    fail_commits: AtomicBool::new(false),
  });
  let engine = Governance::new(store.clone(), config);
  let alice = put_voter(&*store, "alice").await;
  let receipt = engine
    .propose_rule_change(&alice, "Simplify article one", JUSTIFICATION, CONSTITUTION)
    .await
    .unwrap();

  store.fail_commits(true);
  let err = engine.ensure_closed(receipt.votation_id).await.unwrap_err();
  assert!(matches!(err, Error::Store(_)));
  assert_eq!(err.kind(), ErrorKind::Infrastructure);

  let v = store.get_votation(receipt.votation_id).await.unwrap().unwrap();
  assert_eq!(v.status, VotationStatus::Active);
  assert!(v.outcome.is_none());
  let thread = store.get_thread(receipt.thread_id).await.unwrap().unwrap();
  assert!(!thread.is_locked);
  assert!(store.list_notifications(alice.id, 10).await.unwrap().is_empty());

  // Rendering reads fall back to the stored copy.
  let page = engine.thread_page(receipt.thread_id).await.unwrap();
  assert_eq!(page.votation.unwrap().status, VotationStatus::Active);
  assert!(!page.thread.is_locked);
  let listed = engine.list_votations(&VotationQuery::default()).await.unwrap();
  assert_eq!(listed[0].status, VotationStatus::Active);

  store.fail_commits(false);
  let v = engine.ensure_closed(receipt.votation_id).await.unwrap();
  assert_eq!(v.status, VotationStatus::ClosedFailedQuorum);
  let thread = store.get_thread(receipt.thread_id).await.unwrap().unwrap();
  assert!(thread.is_locked);
  assert_eq!(store.list_notifications(alice.id, 10).await.unwrap().len(), 1);
}
