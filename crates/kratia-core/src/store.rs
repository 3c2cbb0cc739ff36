//! The `LedgerStore` trait and the write-batch vocabulary.
//!
//! The trait is implemented by storage backends (e.g. `kratia-store-sqlite`).
//! The governance engine depends on this abstraction, never on a concrete
//! backend. Two atomic primitives carry every mutation:
//!
//! - [`LedgerStore::transact_votation`]: a per-document read-modify-write,
//!   used for vote casting.
//! - [`LedgerStore::commit_batch`]: an all-or-nothing multi-document write
//!   guarded by [`Precondition`]s, used for issuance, closure and replies.
//!   A precondition is a compare-and-swap on the current stored state.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  forum::{Forum, ForumCategory, Post, Thread},
  member::{Member, MemberStatus},
  notification::Notification,
  settings::SiteSettings,
  votation::{Votation, VotationStatus, VotationType},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`LedgerStore::list_votations`]. Results are ordered by
/// deadline, soonest first.
#[derive(Debug, Clone, Default)]
pub struct VotationQuery {
  pub status:     Option<VotationStatus>,
  pub kind:       Option<VotationType>,
  /// Only votations whose deadline is at or before this instant.
  pub due_before: Option<DateTime<Utc>>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}

// ─── Batches ─────────────────────────────────────────────────────────────────

/// A condition checked against the stored state inside the batch's
/// transaction. If any fails, nothing in the batch is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
  VotationActive(Uuid),
  /// The stored tally has not moved since the votation was read.
  VotationTallyIs { votation_id: Uuid, total_votes_cast: u32 },
  MemberStatusIs { member_id: Uuid, status: MemberStatus },
  ThreadUnlocked(Uuid),
}

/// A single logical write. Counter changes are increments, never absolute
/// values, so that independent flows touching the same member interleave
/// safely.
#[derive(Debug, Clone)]
pub enum Write {
  InsertVotation(Votation),
  InsertThread(Thread),
  InsertPost(Post),
  InsertForum(Forum),
  InsertCategory(ForumCategory),
  InsertNotification(Notification),

  /// Move an active votation to a terminal status. Only affects a votation
  /// that is still active.
  CloseVotation {
    votation_id: Uuid,
    status:      VotationStatus,
    outcome:     String,
  },
  /// Idempotent; a locked thread stays locked.
  LockThread(Uuid),

  IncrementForumCounters { forum_id: Uuid, threads: u32, posts: u32 },
  IncrementThreadReplies { thread_id: Uuid, at: DateTime<Utc> },
  IncrementMemberActivity {
    member_id: Uuid,
    karma:     u32,
    posts:     u32,
    threads:   u32,
  },
  /// Grant voting rights if the member, as stored at commit time, is active,
  /// has at least `karma_threshold` karma and registered at or before
  /// `registered_before`.
  PromoteIfQualified {
    member_id:         Uuid,
    karma_threshold:   u32,
    registered_before: DateTime<Utc>,
  },

  SetMemberStatus { member_id: Uuid, status: MemberStatus },
  /// Set `to` only if the member's status is still `from`; otherwise no-op.
  RestoreMemberStatus {
    member_id: Uuid,
    from:      MemberStatus,
    to:        MemberStatus,
  },
  SanctionMember { member_id: Uuid, until: DateTime<Utc> },
  /// Return a sanctioned member to active and clear the end date.
  LiftSanction(Uuid),
  /// Active, voting rights, out of quarantine, regular user role. Only
  /// affects a member still `pending_admission`; otherwise a no-op.
  AdmitMember(Uuid),

  UpdateConstitution { text: String, at: DateTime<Utc> },
}

#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
  pub preconditions: Vec<Precondition>,
  pub writes:        Vec<Write>,
}

impl WriteBatch {
  pub fn new() -> Self { Self::default() }

  pub fn require(mut self, precondition: Precondition) -> Self {
    self.preconditions.push(precondition);
    self
  }

  pub fn push(&mut self, write: Write) { self.writes.push(write); }

  pub fn is_empty(&self) -> bool { self.writes.is_empty() }
}

/// What happened to a batch that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
  Committed,
  /// The first failed precondition; nothing was written.
  Rejected(Precondition),
}

impl BatchOutcome {
  pub fn is_committed(&self) -> bool { matches!(self, Self::Committed) }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Kratia ledger backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait LedgerStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Members ───────────────────────────────────────────────────────────

  fn get_member(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Member>, Self::Error>> + Send + '_;

  /// Insert or replace a member. Used by the signup and admin collaborators;
  /// governance flows mutate members only through batches.
  fn put_member<'a>(
    &'a self,
    member: &'a Member,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Votations ─────────────────────────────────────────────────────────

  fn get_votation(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Votation>, Self::Error>> + Send + '_;

  fn list_votations<'a>(
    &'a self,
    query: &'a VotationQuery,
  ) -> impl Future<Output = Result<Vec<Votation>, Self::Error>> + Send + 'a;

  /// Atomically read, modify and write back a votation.
  ///
  /// `f` runs against the stored document inside a transaction. If it
  /// returns `Ok`, the tally fields (`options`, `voters`,
  /// `total_votes_cast`) are persisted and the transaction commits; if it
  /// returns `Err`, the transaction rolls back and the error is handed back
  /// as the inner result. A missing votation yields an inner
  /// [`crate::Error::VotationNotFound`]. The outer error is reserved for
  /// backend failures.
  fn transact_votation<F, T>(
    &self,
    id: Uuid,
    f: F,
  ) -> impl Future<Output = Result<crate::Result<T>, Self::Error>> + Send + '_
  where
    F: FnOnce(&mut Votation) -> crate::Result<T> + Send + 'static,
    T: Send + 'static;

  // ── Forum content ─────────────────────────────────────────────────────

  fn get_thread(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Thread>, Self::Error>> + Send + '_;

  /// All posts in a thread, oldest first.
  fn list_posts(
    &self,
    thread_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Post>, Self::Error>> + Send + '_;

  fn get_forum(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Forum>, Self::Error>> + Send + '_;

  /// Forums in a category, oldest first.
  fn list_forums(
    &self,
    category_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Forum>, Self::Error>> + Send + '_;

  fn get_category(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<ForumCategory>, Self::Error>> + Send + '_;

  // ── Settings & notifications ──────────────────────────────────────────

  fn site_settings(
    &self,
  ) -> impl Future<Output = Result<SiteSettings, Self::Error>> + Send + '_;

  /// A member's notifications, newest first.
  fn list_notifications(
    &self,
    recipient_id: Uuid,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Notification>, Self::Error>> + Send + '_;

  // ── Batches ───────────────────────────────────────────────────────────

  /// Check every precondition and apply every write in one transaction.
  fn commit_batch(
    &self,
    batch: WriteBatch,
  ) -> impl Future<Output = Result<BatchOutcome, Self::Error>> + Send + '_;
}
