//! Governance policy knobs, deserialised from the `[governance]` table of
//! the server configuration. Every field has a default.

use std::ops::RangeInclusive;

use chrono::TimeDelta;
use kratia_core::eligibility::KarmaPolicy;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
  /// How long a votation stays open after issuance.
  pub voting_window_hours: u32,
  /// Stamped on every new votation as `quorum_required`.
  pub quorum_required:     u32,
  /// Floor applied at closure regardless of the stored `quorum_required`.
  pub minimum_quorum:      u32,
  /// The governance forum where votation threads live.
  pub agora_forum_id:      Uuid,
  pub agora_category_id:   Uuid,
  /// When set, the server closes overdue votations on this interval in
  /// addition to read-triggered closure.
  pub sweep_interval_secs: Option<u64>,
  pub limits:              Limits,
  pub karma:               KarmaPolicy,
}

impl Default for GovernanceConfig {
  fn default() -> Self {
    Self {
      voting_window_hours: 72,
      quorum_required:     5,
      minimum_quorum:      3,
      agora_forum_id:      Uuid::from_u128(0x6167_6f72_6100_4000_8000_0000_0000_0001),
      agora_category_id:   Uuid::from_u128(0x6167_6f72_6100_4000_8000_0000_0000_0002),
      sweep_interval_secs: None,
      limits:              Limits::default(),
      karma:               KarmaPolicy::default(),
    }
  }
}

impl GovernanceConfig {
  pub fn voting_window(&self) -> TimeDelta {
    TimeDelta::hours(i64::from(self.voting_window_hours))
  }
}

/// Inclusive character-count bounds for user-supplied text.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
  pub title:             RangeInclusive<usize>,
  pub justification:     RangeInclusive<usize>,
  pub constitution_text: RangeInclusive<usize>,
  pub forum_name:        RangeInclusive<usize>,
  pub forum_description: RangeInclusive<usize>,
  pub reply:             RangeInclusive<usize>,
}

impl Default for Limits {
  fn default() -> Self {
    Self {
      title:             5..=150,
      justification:     20..=5000,
      constitution_text: 20..=50_000,
      forum_name:        3..=100,
      forum_description: 10..=1000,
      reply:             1..=10_000,
    }
  }
}
