//! Forum content entities. The governance core only creates and locks these;
//! browsing and editing them belongs to the surrounding application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumCategory {
  pub id:          Uuid,
  pub name:        String,
  pub description: Option<String>,
  pub created_at:  DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forum {
  pub id:           Uuid,
  pub category_id:  Uuid,
  pub name:         String,
  pub description:  String,
  pub is_public:    bool,
  pub thread_count: u32,
  pub post_count:   u32,
  pub created_at:   DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
  pub id:                  Uuid,
  pub forum_id:            Uuid,
  pub author_id:           Uuid,
  pub title:               String,
  pub created_at:          DateTime<Utc>,
  pub last_reply_at:       DateTime<Utc>,
  pub reply_count:         u32,
  /// One-way: votation threads are locked at closure and never unlocked.
  pub is_locked:           bool,
  pub is_sticky:           bool,
  /// Back-reference for threads created alongside a votation in the Agora.
  pub related_votation_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
  pub id:         Uuid,
  pub thread_id:  Uuid,
  pub author_id:  Uuid,
  pub content:    String,
  pub created_at: DateTime<Utc>,
}
