//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that lexicographic order is chronological.
//! Enums are stored as their snake_case names. UUIDs are stored as
//! hyphenated lowercase strings.

use std::{collections::BTreeMap, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use kratia_core::{
  forum::{Forum, ForumCategory, Post, Thread},
  member::Member,
  notification::Notification,
  votation::{Proposal, VoteChoice, VoteOptions, Votation},
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

fn decode_opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

/// Parse a stored enum name back into its variant.
pub fn decode_enum<E: FromStr>(what: &'static str, s: &str) -> Result<E> {
  s.parse().map_err(|_| Error::UnknownValue {
    what,
    value: s.to_owned(),
  })
}

// ─── Members ─────────────────────────────────────────────────────────────────

pub const MEMBER_COLUMNS: &str = "member_id, username, created_at, karma, status, can_vote,
  sanction_end_date, role, is_quarantined, total_posts, total_threads";

pub struct RawMember {
  pub member_id:         String,
  pub username:          String,
  pub created_at:        String,
  pub karma:             u32,
  pub status:            String,
  pub can_vote:          bool,
  pub sanction_end_date: Option<String>,
  pub role:              String,
  pub is_quarantined:    bool,
  pub total_posts:       u32,
  pub total_threads:     u32,
}

impl RawMember {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      member_id:         row.get(0)?,
      username:          row.get(1)?,
      created_at:        row.get(2)?,
      karma:             row.get(3)?,
      status:            row.get(4)?,
      can_vote:          row.get(5)?,
      sanction_end_date: row.get(6)?,
      role:              row.get(7)?,
      is_quarantined:    row.get(8)?,
      total_posts:       row.get(9)?,
      total_threads:     row.get(10)?,
    })
  }

  pub fn into_member(self) -> Result<Member> {
    Ok(Member {
      id:                decode_uuid(&self.member_id)?,
      username:          self.username,
      created_at:        decode_dt(&self.created_at)?,
      karma:             self.karma,
      status:            decode_enum("member status", &self.status)?,
      can_vote:          self.can_vote,
      sanction_end_date: decode_opt_dt(self.sanction_end_date.as_deref())?,
      role:              decode_enum("role", &self.role)?,
      is_quarantined:    self.is_quarantined,
      total_posts:       self.total_posts,
      total_threads:     self.total_threads,
    })
  }
}

// ─── Votations ───────────────────────────────────────────────────────────────

pub const VOTATION_COLUMNS: &str = "votation_id, title, description, proposer_id,
  proposer_username, created_at, deadline, status, votation_type, payload_json,
  votes_for, votes_against, votes_abstain, total_votes_cast, quorum_required,
  related_thread_id, outcome";

/// Raw strings read from a `votations` row plus its `votes` rows.
pub struct RawVotation {
  pub votation_id:       String,
  pub title:             String,
  pub description:       String,
  pub proposer_id:       String,
  pub proposer_username: String,
  pub created_at:        String,
  pub deadline:          String,
  pub status:            String,
  pub votation_type:     String,
  pub payload_json:      String,
  pub votes_for:         u32,
  pub votes_against:     u32,
  pub votes_abstain:     u32,
  pub total_votes_cast:  u32,
  pub quorum_required:   u32,
  pub related_thread_id: String,
  pub outcome:           Option<String>,
  /// `(member_id, choice)` pairs from the `votes` table.
  pub votes:             Vec<(String, String)>,
}

impl RawVotation {
  /// Reads the votation columns; `votes` is filled in separately.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      votation_id:       row.get(0)?,
      title:             row.get(1)?,
      description:       row.get(2)?,
      proposer_id:       row.get(3)?,
      proposer_username: row.get(4)?,
      created_at:        row.get(5)?,
      deadline:          row.get(6)?,
      status:            row.get(7)?,
      votation_type:     row.get(8)?,
      payload_json:      row.get(9)?,
      votes_for:         row.get(10)?,
      votes_against:     row.get(11)?,
      votes_abstain:     row.get(12)?,
      total_votes_cast:  row.get(13)?,
      quorum_required:   row.get(14)?,
      related_thread_id: row.get(15)?,
      outcome:           row.get(16)?,
      votes:             Vec::new(),
    })
  }

  pub fn into_votation(self) -> Result<Votation> {
    let kind = decode_enum("votation type", &self.votation_type)?;
    let payload: serde_json::Value = serde_json::from_str(&self.payload_json)?;
    let proposal = Proposal::from_parts(kind, payload)?;

    let voters = self
      .votes
      .iter()
      .map(|(member, choice)| {
        Ok((decode_uuid(member)?, decode_enum("vote choice", choice)?))
      })
      .collect::<Result<BTreeMap<Uuid, VoteChoice>>>()?;

    Ok(Votation {
      id: decode_uuid(&self.votation_id)?,
      title: self.title,
      description: self.description,
      proposer_id: decode_uuid(&self.proposer_id)?,
      proposer_username: self.proposer_username,
      created_at: decode_dt(&self.created_at)?,
      deadline: decode_dt(&self.deadline)?,
      status: decode_enum("votation status", &self.status)?,
      proposal,
      options: VoteOptions {
        in_favor: self.votes_for,
        against:  self.votes_against,
        abstain:  self.votes_abstain,
      },
      voters,
      total_votes_cast: self.total_votes_cast,
      quorum_required: self.quorum_required,
      related_thread_id: decode_uuid(&self.related_thread_id)?,
      outcome: self.outcome,
    })
  }
}

// ─── Forum content ───────────────────────────────────────────────────────────

pub const CATEGORY_COLUMNS: &str = "category_id, name, description, created_at";

pub struct RawCategory {
  pub category_id: String,
  pub name:        String,
  pub description: Option<String>,
  pub created_at:  String,
}

impl RawCategory {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      category_id: row.get(0)?,
      name:        row.get(1)?,
      description: row.get(2)?,
      created_at:  row.get(3)?,
    })
  }

  pub fn into_category(self) -> Result<ForumCategory> {
    Ok(ForumCategory {
      id:          decode_uuid(&self.category_id)?,
      name:        self.name,
      description: self.description,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

pub const FORUM_COLUMNS: &str = "forum_id, category_id, name, description, is_public,
  thread_count, post_count, created_at";

pub struct RawForum {
  pub forum_id:     String,
  pub category_id:  String,
  pub name:         String,
  pub description:  String,
  pub is_public:    bool,
  pub thread_count: u32,
  pub post_count:   u32,
  pub created_at:   String,
}

impl RawForum {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      forum_id:     row.get(0)?,
      category_id:  row.get(1)?,
      name:         row.get(2)?,
      description:  row.get(3)?,
      is_public:    row.get(4)?,
      thread_count: row.get(5)?,
      post_count:   row.get(6)?,
      created_at:   row.get(7)?,
    })
  }

  pub fn into_forum(self) -> Result<Forum> {
    Ok(Forum {
      id:           decode_uuid(&self.forum_id)?,
      category_id:  decode_uuid(&self.category_id)?,
      name:         self.name,
      description:  self.description,
      is_public:    self.is_public,
      thread_count: self.thread_count,
      post_count:   self.post_count,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

pub const THREAD_COLUMNS: &str = "thread_id, forum_id, author_id, title, created_at,
  last_reply_at, reply_count, is_locked, is_sticky, related_votation_id";

pub struct RawThread {
  pub thread_id:           String,
  pub forum_id:            String,
  pub author_id:           String,
  pub title:               String,
  pub created_at:          String,
  pub last_reply_at:       String,
  pub reply_count:         u32,
  pub is_locked:           bool,
  pub is_sticky:           bool,
  pub related_votation_id: Option<String>,
}

impl RawThread {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      thread_id:           row.get(0)?,
      forum_id:            row.get(1)?,
      author_id:           row.get(2)?,
      title:               row.get(3)?,
      created_at:          row.get(4)?,
      last_reply_at:       row.get(5)?,
      reply_count:         row.get(6)?,
      is_locked:           row.get(7)?,
      is_sticky:           row.get(8)?,
      related_votation_id: row.get(9)?,
    })
  }

  pub fn into_thread(self) -> Result<Thread> {
    Ok(Thread {
      id:                  decode_uuid(&self.thread_id)?,
      forum_id:            decode_uuid(&self.forum_id)?,
      author_id:           decode_uuid(&self.author_id)?,
      title:               self.title,
      created_at:          decode_dt(&self.created_at)?,
      last_reply_at:       decode_dt(&self.last_reply_at)?,
      reply_count:         self.reply_count,
      is_locked:           self.is_locked,
      is_sticky:           self.is_sticky,
      related_votation_id: decode_opt_uuid(self.related_votation_id.as_deref())?,
    })
  }
}

pub const POST_COLUMNS: &str = "post_id, thread_id, author_id, content, created_at";

pub struct RawPost {
  pub post_id:    String,
  pub thread_id:  String,
  pub author_id:  String,
  pub content:    String,
  pub created_at: String,
}

impl RawPost {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      post_id:    row.get(0)?,
      thread_id:  row.get(1)?,
      author_id:  row.get(2)?,
      content:    row.get(3)?,
      created_at: row.get(4)?,
    })
  }

  pub fn into_post(self) -> Result<Post> {
    Ok(Post {
      id:         decode_uuid(&self.post_id)?,
      thread_id:  decode_uuid(&self.thread_id)?,
      author_id:  decode_uuid(&self.author_id)?,
      content:    self.content,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

// ─── Notifications ───────────────────────────────────────────────────────────

pub const NOTIFICATION_COLUMNS: &str =
  "notification_id, recipient_id, kind, payload_json, created_at, is_read";

pub struct RawNotification {
  pub notification_id: String,
  pub recipient_id:    String,
  pub kind:            String,
  pub payload_json:    String,
  pub created_at:      String,
  pub is_read:         bool,
}

impl RawNotification {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      notification_id: row.get(0)?,
      recipient_id:    row.get(1)?,
      kind:            row.get(2)?,
      payload_json:    row.get(3)?,
      created_at:      row.get(4)?,
      is_read:         row.get(5)?,
    })
  }

  pub fn into_notification(self) -> Result<Notification> {
    Ok(Notification {
      id:           decode_uuid(&self.notification_id)?,
      recipient_id: decode_uuid(&self.recipient_id)?,
      kind:         decode_enum("notification kind", &self.kind)?,
      payload:      serde_json::from_str(&self.payload_json)?,
      created_at:   decode_dt(&self.created_at)?,
      is_read:      self.is_read,
    })
  }
}
