//! Notification records and the delivery seam.
//!
//! Records are built here and persisted inside the same batch as the event
//! that causes them, so a notification exists iff its event committed.
//! Once committed they are handed to a [`Notifier`] for live delivery.

use chrono::{DateTime, Utc};
use kratia_core::{
  forum::{Post, Thread},
  member::Member,
  notification::{Notification, NotificationKind},
  votation::Votation,
};
use serde_json::json;

use crate::closure::Decision;

/// Fire-and-forget delivery of committed notifications.
pub trait Notifier: Send + Sync {
  fn notify(&self, notification: &Notification);
}

/// Emits every notification as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
  fn notify(&self, notification: &Notification) {
    tracing::info!(
      recipient = %notification.recipient_id,
      kind = %notification.kind,
      payload = %notification.payload,
      "notification"
    );
  }
}

/// One record for the proposer and one for each other voter.
pub(crate) fn votation_concluded(
  votation: &Votation,
  decision: &Decision,
  at: DateTime<Utc>,
) -> Vec<Notification> {
  let payload = json!({
    "votationId": votation.id,
    "threadId": votation.related_thread_id,
    "title": votation.title,
    "status": decision.status,
    "outcome": decision.outcome,
  });

  let proposer = Notification::new(
    votation.proposer_id,
    NotificationKind::VotationConcludedProposer,
    payload.clone(),
    at,
  );
  let participants = votation
    .voters
    .keys()
    .filter(|voter| **voter != votation.proposer_id)
    .map(|voter| {
      Notification::new(
        *voter,
        NotificationKind::VotationConcludedParticipant,
        payload.clone(),
        at,
      )
    });

  std::iter::once(proposer).chain(participants).collect()
}

/// Tell the thread author about a reply, unless they wrote it.
pub(crate) fn new_reply(thread: &Thread, post: &Post, author: &Member) -> Option<Notification> {
  (thread.author_id != author.id).then(|| {
    Notification::new(
      thread.author_id,
      NotificationKind::NewReplyToThread,
      json!({
        "threadId": thread.id,
        "threadTitle": thread.title,
        "postId": post.id,
        "authorId": author.id,
        "authorUsername": author.username,
      }),
      post.created_at,
    )
  })
}
