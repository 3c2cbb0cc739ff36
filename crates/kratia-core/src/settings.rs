//! The singleton site settings document holding the constitution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSettings {
  pub constitution_text: String,
  /// Set whenever a rule-change votation overwrites the text.
  pub last_updated:      Option<DateTime<Utc>>,
}
