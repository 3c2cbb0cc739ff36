//! [`SqliteStore`], the SQLite implementation of [`LedgerStore`].

use std::{collections::BTreeSet, path::Path};

use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use kratia_core::{
  forum::{Forum, ForumCategory, Post, Thread},
  member::{Member, MemberStatus, Role},
  notification::Notification,
  settings::SiteSettings,
  store::{BatchOutcome, LedgerStore, Precondition, VotationQuery, Write, WriteBatch},
  votation::{Votation, VotationStatus},
};

use crate::{
  encode::{
    CATEGORY_COLUMNS, FORUM_COLUMNS, MEMBER_COLUMNS, NOTIFICATION_COLUMNS, POST_COLUMNS,
    RawCategory, RawForum, RawMember, RawNotification, RawPost, RawThread, RawVotation,
    THREAD_COLUMNS, VOTATION_COLUMNS, decode_dt, encode_dt, encode_uuid,
  },
  error::into_call_error,
  schema::SCHEMA,
  Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Kratia ledger backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Synchronous helpers (run on the connection thread) ─────────────────────

fn query_votation(conn: &Connection, id: &str) -> rusqlite::Result<Option<RawVotation>> {
  let raw = conn
    .query_row(
      &format!("SELECT {VOTATION_COLUMNS} FROM votations WHERE votation_id = ?1"),
      rusqlite::params![id],
      RawVotation::from_row,
    )
    .optional()?;

  let Some(mut raw) = raw else {
    return Ok(None);
  };
  raw.votes = query_votes(conn, id)?;
  Ok(Some(raw))
}

fn query_votes(conn: &Connection, votation_id: &str) -> rusqlite::Result<Vec<(String, String)>> {
  let mut stmt =
    conn.prepare_cached("SELECT member_id, choice FROM votes WHERE votation_id = ?1")?;
  stmt
    .query_map(rusqlite::params![votation_id], |row| Ok((row.get(0)?, row.get(1)?)))?
    .collect()
}

fn precondition_holds(conn: &Connection, precondition: &Precondition) -> rusqlite::Result<bool> {
  match precondition {
    Precondition::VotationActive(id) => {
      let status: Option<String> = conn
        .query_row(
          "SELECT status FROM votations WHERE votation_id = ?1",
          rusqlite::params![encode_uuid(*id)],
          |r| r.get(0),
        )
        .optional()?;
      Ok(status.as_deref() == Some(VotationStatus::Active.as_ref()))
    }
    Precondition::VotationTallyIs { votation_id, total_votes_cast } => {
      let stored: Option<u32> = conn
        .query_row(
          "SELECT total_votes_cast FROM votations WHERE votation_id = ?1",
          rusqlite::params![encode_uuid(*votation_id)],
          |r| r.get(0),
        )
        .optional()?;
      Ok(stored == Some(*total_votes_cast))
    }
    Precondition::MemberStatusIs { member_id, status } => {
      let stored: Option<String> = conn
        .query_row(
          "SELECT status FROM members WHERE member_id = ?1",
          rusqlite::params![encode_uuid(*member_id)],
          |r| r.get(0),
        )
        .optional()?;
      Ok(stored.as_deref() == Some(status.as_ref()))
    }
    Precondition::ThreadUnlocked(id) => {
      let locked: Option<bool> = conn
        .query_row(
          "SELECT is_locked FROM threads WHERE thread_id = ?1",
          rusqlite::params![encode_uuid(*id)],
          |r| r.get(0),
        )
        .optional()?;
      Ok(locked == Some(false))
    }
  }
}

fn insert_votation(conn: &Connection, v: &Votation) -> tokio_rusqlite::Result<()> {
  let id_str = encode_uuid(v.id);
  let payload = v.proposal.to_json().map_err(into_call_error)?.to_string();
  conn.execute(
    &format!(
      "INSERT INTO votations ({VOTATION_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
    ),
    rusqlite::params![
      id_str,
      v.title,
      v.description,
      encode_uuid(v.proposer_id),
      v.proposer_username,
      encode_dt(v.created_at),
      encode_dt(v.deadline),
      v.status.as_ref(),
      v.kind().as_ref(),
      payload,
      v.options.in_favor,
      v.options.against,
      v.options.abstain,
      v.total_votes_cast,
      v.quorum_required,
      encode_uuid(v.related_thread_id),
      v.outcome,
    ],
  )?;
  for (member, choice) in &v.voters {
    conn.execute(
      "INSERT INTO votes (votation_id, member_id, choice) VALUES (?1, ?2, ?3)",
      rusqlite::params![id_str, encode_uuid(*member), choice.as_ref()],
    )?;
  }
  Ok(())
}

/// Apply one write. Returns the violated guard if a compare-and-swap write
/// found the document in an unexpected state.
fn apply_write(conn: &Connection, write: Write) -> tokio_rusqlite::Result<Option<Precondition>> {
  match write {
    Write::InsertVotation(v) => insert_votation(conn, &v)?,

    Write::InsertThread(t) => {
      conn.execute(
        &format!(
          "INSERT INTO threads ({THREAD_COLUMNS})
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        ),
        rusqlite::params![
          encode_uuid(t.id),
          encode_uuid(t.forum_id),
          encode_uuid(t.author_id),
          t.title,
          encode_dt(t.created_at),
          encode_dt(t.last_reply_at),
          t.reply_count,
          t.is_locked,
          t.is_sticky,
          t.related_votation_id.map(encode_uuid),
        ],
      )?;
    }

    Write::InsertPost(p) => {
      conn.execute(
        &format!("INSERT INTO posts ({POST_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
        rusqlite::params![
          encode_uuid(p.id),
          encode_uuid(p.thread_id),
          encode_uuid(p.author_id),
          p.content,
          encode_dt(p.created_at),
        ],
      )?;
    }

    Write::InsertForum(f) => {
      conn.execute(
        &format!(
          "INSERT INTO forums ({FORUM_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ),
        rusqlite::params![
          encode_uuid(f.id),
          encode_uuid(f.category_id),
          f.name,
          f.description,
          f.is_public,
          f.thread_count,
          f.post_count,
          encode_dt(f.created_at),
        ],
      )?;
    }

    Write::InsertCategory(c) => {
      conn.execute(
        &format!("INSERT INTO categories ({CATEGORY_COLUMNS}) VALUES (?1, ?2, ?3, ?4)"),
        rusqlite::params![
          encode_uuid(c.id),
          c.name,
          c.description,
          encode_dt(c.created_at),
        ],
      )?;
    }

    Write::InsertNotification(n) => {
      conn.execute(
        &format!(
          "INSERT INTO notifications ({NOTIFICATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        ),
        rusqlite::params![
          encode_uuid(n.id),
          encode_uuid(n.recipient_id),
          n.kind.as_ref(),
          n.payload.to_string(),
          encode_dt(n.created_at),
          n.is_read,
        ],
      )?;
    }

    Write::CloseVotation { votation_id, status, outcome } => {
      let changed = conn.execute(
        "UPDATE votations SET status = ?2, outcome = ?3
         WHERE votation_id = ?1 AND status = 'active'",
        rusqlite::params![encode_uuid(votation_id), status.as_ref(), outcome],
      )?;
      if changed == 0 {
        return Ok(Some(Precondition::VotationActive(votation_id)));
      }
    }

    Write::LockThread(id) => {
      conn.execute(
        "UPDATE threads SET is_locked = 1 WHERE thread_id = ?1",
        rusqlite::params![encode_uuid(id)],
      )?;
    }

    Write::IncrementForumCounters { forum_id, threads, posts } => {
      conn.execute(
        "UPDATE forums SET thread_count = thread_count + ?2, post_count = post_count + ?3
         WHERE forum_id = ?1",
        rusqlite::params![encode_uuid(forum_id), threads, posts],
      )?;
    }

    Write::IncrementThreadReplies { thread_id, at } => {
      conn.execute(
        "UPDATE threads SET reply_count = reply_count + 1, last_reply_at = ?2
         WHERE thread_id = ?1",
        rusqlite::params![encode_uuid(thread_id), encode_dt(at)],
      )?;
    }

    Write::IncrementMemberActivity { member_id, karma, posts, threads } => {
      conn.execute(
        "UPDATE members SET karma = karma + ?2, total_posts = total_posts + ?3,
                            total_threads = total_threads + ?4
         WHERE member_id = ?1",
        rusqlite::params![encode_uuid(member_id), karma, posts, threads],
      )?;
    }

    Write::PromoteIfQualified { member_id, karma_threshold, registered_before } => {
      conn.execute(
        "UPDATE members SET can_vote = 1
         WHERE member_id = ?1 AND status = 'active' AND can_vote = 0
           AND karma >= ?2 AND created_at <= ?3",
        rusqlite::params![
          encode_uuid(member_id),
          karma_threshold,
          encode_dt(registered_before),
        ],
      )?;
    }

    Write::SetMemberStatus { member_id, status } => {
      conn.execute(
        "UPDATE members SET status = ?2 WHERE member_id = ?1",
        rusqlite::params![encode_uuid(member_id), status.as_ref()],
      )?;
    }

    Write::RestoreMemberStatus { member_id, from, to } => {
      conn.execute(
        "UPDATE members SET status = ?3 WHERE member_id = ?1 AND status = ?2",
        rusqlite::params![encode_uuid(member_id), from.as_ref(), to.as_ref()],
      )?;
    }

    Write::SanctionMember { member_id, until } => {
      conn.execute(
        "UPDATE members SET status = ?2, sanction_end_date = ?3 WHERE member_id = ?1",
        rusqlite::params![
          encode_uuid(member_id),
          MemberStatus::Sanctioned.as_ref(),
          encode_dt(until),
        ],
      )?;
    }

    Write::LiftSanction(member_id) => {
      conn.execute(
        "UPDATE members SET status = ?2, sanction_end_date = NULL
         WHERE member_id = ?1 AND status = 'sanctioned'",
        rusqlite::params![encode_uuid(member_id), MemberStatus::Active.as_ref()],
      )?;
    }

    Write::AdmitMember(member_id) => {
      conn.execute(
        "UPDATE members SET status = ?2, can_vote = 1, is_quarantined = 0, role = ?3
         WHERE member_id = ?1 AND status = ?4",
        rusqlite::params![
          encode_uuid(member_id),
          MemberStatus::Active.as_ref(),
          Role::User.as_ref(),
          MemberStatus::PendingAdmission.as_ref(),
        ],
      )?;
    }

    Write::UpdateConstitution { text, at } => {
      conn.execute(
        "UPDATE site_settings SET constitution_text = ?1, last_updated = ?2
         WHERE settings_id = 1",
        rusqlite::params![text, encode_dt(at)],
      )?;
    }
  }
  Ok(None)
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

impl LedgerStore for SqliteStore {
  type Error = crate::Error;

  // ── Members ───────────────────────────────────────────────────────────────

  async fn get_member(&self, id: Uuid) -> Result<Option<Member>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawMember> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE member_id = ?1"),
            rusqlite::params![id_str],
            RawMember::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawMember::into_member).transpose()
  }

  async fn put_member(&self, member: &Member) -> Result<()> {
    let m = member.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO members ({MEMBER_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(member_id) DO UPDATE SET
               username          = excluded.username,
               created_at        = excluded.created_at,
               karma             = excluded.karma,
               status            = excluded.status,
               can_vote          = excluded.can_vote,
               sanction_end_date = excluded.sanction_end_date,
               role              = excluded.role,
               is_quarantined    = excluded.is_quarantined,
               total_posts       = excluded.total_posts,
               total_threads     = excluded.total_threads"
          ),
          rusqlite::params![
            encode_uuid(m.id),
            m.username,
            encode_dt(m.created_at),
            m.karma,
            m.status.as_ref(),
            m.can_vote,
            m.sanction_end_date.map(encode_dt),
            m.role.as_ref(),
            m.is_quarantined,
            m.total_posts,
            m.total_threads,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Votations ─────────────────────────────────────────────────────────────

  async fn get_votation(&self, id: Uuid) -> Result<Option<Votation>> {
    let id_str = encode_uuid(id);

    let raw = self
      .conn
      .call(move |conn| Ok(query_votation(conn, &id_str)?))
      .await?;

    raw.map(RawVotation::into_votation).transpose()
  }

  async fn list_votations(&self, query: &VotationQuery) -> Result<Vec<Votation>> {
    let status_str = query.status.map(|s| s.as_ref().to_owned());
    let kind_str   = query.kind.map(|k| k.as_ref().to_owned());
    let due_str    = query.due_before.map(encode_dt);
    let limit_val  = query.limit.unwrap_or(100) as i64;
    let offset_val = query.offset.unwrap_or(0) as i64;

    let raws: Vec<RawVotation> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {VOTATION_COLUMNS} FROM votations
           WHERE (?1 IS NULL OR status = ?1)
             AND (?2 IS NULL OR votation_type = ?2)
             AND (?3 IS NULL OR deadline <= ?3)
           ORDER BY deadline ASC
           LIMIT ?4 OFFSET ?5"
        );

        let mut rows = {
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map(
              rusqlite::params![status_str, kind_str, due_str, limit_val, offset_val],
              RawVotation::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        for raw in &mut rows {
          raw.votes = query_votes(conn, &raw.votation_id)?;
        }
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVotation::into_votation).collect()
  }

  async fn transact_votation<F, T>(&self, id: Uuid, f: F) -> Result<kratia_core::Result<T>>
  where
    F: FnOnce(&mut Votation) -> kratia_core::Result<T> + Send + 'static,
    T: Send + 'static,
  {
    let id_str = encode_uuid(id);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(raw) = query_votation(&tx, &id_str)? else {
          return Ok(Err(kratia_core::Error::VotationNotFound(id)));
        };
        let mut votation = raw.into_votation().map_err(into_call_error)?;
        let voted_before: BTreeSet<Uuid> = votation.voters.keys().copied().collect();

        // Dropping `tx` on the error path rolls back.
        let value = match f(&mut votation) {
          Ok(value) => value,
          Err(e) => return Ok(Err(e)),
        };

        for (member, choice) in &votation.voters {
          if !voted_before.contains(member) {
            tx.execute(
              "INSERT INTO votes (votation_id, member_id, choice) VALUES (?1, ?2, ?3)",
              rusqlite::params![id_str, encode_uuid(*member), choice.as_ref()],
            )?;
          }
        }
        tx.execute(
          "UPDATE votations
           SET votes_for = ?2, votes_against = ?3, votes_abstain = ?4, total_votes_cast = ?5
           WHERE votation_id = ?1",
          rusqlite::params![
            id_str,
            votation.options.in_favor,
            votation.options.against,
            votation.options.abstain,
            votation.total_votes_cast,
          ],
        )?;

        tx.commit()?;
        Ok(Ok(value))
      })
      .await?;

    Ok(outcome)
  }

  // ── Forum content ─────────────────────────────────────────────────────────

  async fn get_thread(&self, id: Uuid) -> Result<Option<Thread>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawThread> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {THREAD_COLUMNS} FROM threads WHERE thread_id = ?1"),
            rusqlite::params![id_str],
            RawThread::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawThread::into_thread).transpose()
  }

  async fn list_posts(&self, thread_id: Uuid) -> Result<Vec<Post>> {
    let id_str = encode_uuid(thread_id);

    let raws: Vec<RawPost> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {POST_COLUMNS} FROM posts WHERE thread_id = ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawPost::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPost::into_post).collect()
  }

  async fn get_forum(&self, id: Uuid) -> Result<Option<Forum>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawForum> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {FORUM_COLUMNS} FROM forums WHERE forum_id = ?1"),
            rusqlite::params![id_str],
            RawForum::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawForum::into_forum).transpose()
  }

  async fn list_forums(&self, category_id: Uuid) -> Result<Vec<Forum>> {
    let id_str = encode_uuid(category_id);

    let raws: Vec<RawForum> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {FORUM_COLUMNS} FROM forums WHERE category_id = ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawForum::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawForum::into_forum).collect()
  }

  async fn get_category(&self, id: Uuid) -> Result<Option<ForumCategory>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawCategory> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE category_id = ?1"),
            rusqlite::params![id_str],
            RawCategory::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawCategory::into_category).transpose()
  }

  // ── Settings & notifications ──────────────────────────────────────────────

  async fn site_settings(&self) -> Result<SiteSettings> {
    let (text, updated): (String, Option<String>) = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT constitution_text, last_updated FROM site_settings WHERE settings_id = 1",
          [],
          |r| Ok((r.get(0)?, r.get(1)?)),
        )?)
      })
      .await?;

    Ok(SiteSettings {
      constitution_text: text,
      last_updated:      updated.as_deref().map(decode_dt).transpose()?,
    })
  }

  async fn list_notifications(&self, recipient_id: Uuid, limit: usize) -> Result<Vec<Notification>> {
    let id_str    = encode_uuid(recipient_id);
    let limit_val = limit as i64;

    let raws: Vec<RawNotification> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {NOTIFICATION_COLUMNS} FROM notifications
           WHERE recipient_id = ?1
           ORDER BY created_at DESC
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, limit_val], RawNotification::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawNotification::into_notification).collect()
  }

  // ── Batches ───────────────────────────────────────────────────────────────

  async fn commit_batch(&self, batch: WriteBatch) -> Result<BatchOutcome> {
    let WriteBatch { preconditions, writes } = batch;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for precondition in preconditions {
          if !precondition_holds(&tx, &precondition)? {
            return Ok(BatchOutcome::Rejected(precondition));
          }
        }
        for write in writes {
          if let Some(violated) = apply_write(&tx, write)? {
            return Ok(BatchOutcome::Rejected(violated));
          }
        }

        tx.commit()?;
        Ok(BatchOutcome::Committed)
      })
      .await?;

    Ok(outcome)
  }
}
