//! Payload validation shared by the proposal and reply flows.

use std::ops::RangeInclusive;

use kratia_core::{Error, Result};

/// Trim `value` and check its character count against `bounds`.
pub fn text(field: &str, value: &str, bounds: &RangeInclusive<usize>) -> Result<String> {
  let trimmed = value.trim();
  let len = trimmed.chars().count();
  if !bounds.contains(&len) {
    return Err(Error::Validation(format!(
      "{field} must be between {} and {} characters (got {len})",
      bounds.start(),
      bounds.end()
    )));
  }
  Ok(trimmed.to_owned())
}
