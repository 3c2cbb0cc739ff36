//! Thread reads and replies.

use chrono::Utc;
use kratia_core::{
  Error, Result,
  eligibility::can_post,
  forum::{Post, Thread},
  member::Member,
  store::{BatchOutcome, LedgerStore, Precondition, VotationQuery, Write, WriteBatch},
  votation::Votation,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{Governance, notify, validate};

/// A thread with its posts and, for Agora threads, the votation it hosts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadPage {
  pub thread:   Thread,
  pub posts:    Vec<Post>,
  pub votation: Option<Votation>,
}

impl<S: LedgerStore> Governance<S> {
  /// Load a thread page. A due votation attached to the thread is closed
  /// before the page is read, so a freshly closed thread already shows as
  /// locked.
  pub async fn thread_page(&self, thread_id: Uuid) -> Result<ThreadPage> {
    let now = Utc::now();
    let thread = self.thread(thread_id).await?;

    let votation = match thread.related_votation_id {
      Some(votation_id) => {
        let stored = self.stored_votation(votation_id).await?;
        Some(self.settle(stored, now).await?)
      }
      None => None,
    };

    let thread = self.thread(thread_id).await?;
    let posts = self.store.list_posts(thread_id).await.map_err(Error::store)?;
    Ok(ThreadPage { thread, posts, votation })
  }

  /// List votations, closing the due ones on the way out. A listing
  /// filtered on `active` may therefore contain votations that closed
  /// during this call.
  pub async fn list_votations(&self, query: &VotationQuery) -> Result<Vec<Votation>> {
    let now = Utc::now();
    let stored = self.store.list_votations(query).await.map_err(Error::store)?;
    let mut votations = Vec::with_capacity(stored.len());
    for votation in stored {
      votations.push(self.settle(votation, now).await?);
    }
    Ok(votations)
  }

  /// Append a reply to an unlocked thread.
  pub async fn post_reply(&self, author: &Member, thread_id: Uuid, content: &str) -> Result<Post> {
    let now = Utc::now();
    if !can_post(author, now) {
      return Err(Error::Forbidden(format!("member {} may not post", author.id)));
    }
    let content = validate::text("reply", content, &self.config.limits.reply)?;

    let thread = self.thread(thread_id).await?;
    if thread.is_locked {
      return Err(Error::InvalidState(format!("thread {thread_id} is locked")));
    }

    let post = Post {
      id: Uuid::new_v4(),
      thread_id,
      author_id: author.id,
      content,
      created_at: now,
    };
    let notification = notify::new_reply(&thread, &post, author);

    let author_unchanged = Precondition::MemberStatusIs {
      member_id: author.id,
      status:    author.status,
    };
    let mut batch = WriteBatch::new()
      .require(Precondition::ThreadUnlocked(thread_id))
      .require(author_unchanged.clone());
    batch.push(Write::InsertPost(post.clone()));
    batch.push(Write::IncrementThreadReplies { thread_id, at: now });
    batch.push(Write::IncrementForumCounters {
      forum_id: thread.forum_id,
      threads:  0,
      posts:    1,
    });
    batch.push(Write::IncrementMemberActivity {
      member_id: author.id,
      karma:     self.config.karma.reply_reward,
      posts:     1,
      threads:   0,
    });
    batch.push(Write::PromoteIfQualified {
      member_id:         author.id,
      karma_threshold:   self.config.karma.voting_threshold,
      registered_before: self.config.karma.registered_before(now),
    });
    if let Some(n) = &notification {
      batch.push(Write::InsertNotification(n.clone()));
    }

    match self.store.commit_batch(batch).await.map_err(Error::store)? {
      BatchOutcome::Committed => {
        tracing::debug!(thread = %thread_id, post = %post.id, author = %author.id, "reply posted");
        if let Some(n) = &notification {
          self.notifier.notify(n);
        }
        Ok(post)
      }
      BatchOutcome::Rejected(failed) if failed == author_unchanged => Err(Error::Forbidden(
        format!("member {} may not post", author.id),
      )),
      BatchOutcome::Rejected(_) => {
        Err(Error::InvalidState(format!("thread {thread_id} is locked")))
      }
    }
  }

  async fn thread(&self, id: Uuid) -> Result<Thread> {
    self
      .store
      .get_thread(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ThreadNotFound(id))
  }
}
