//! Unread counting and watermark advancement. Pure functions.

use crate::models::{Eligibility, Record};

/// Number of eligible records newer than `watermark`.
pub fn compute_unread(snapshot: &[Record], watermark: i64, eligibility: Eligibility) -> u64 {
    snapshot
        .iter()
        .filter(|r| r.id > watermark && eligibility.admits(r))
        .count() as u64
}

/// Watermark after acknowledging `snapshot`: the highest eligible id, never below `current`.
///
/// An empty or fully filtered snapshot leaves `current` untouched.
pub fn compute_new_watermark(snapshot: &[Record], current: i64, eligibility: Eligibility) -> i64 {
    snapshot
        .iter()
        .filter(|r| eligibility.admits(r))
        .map(|r| r.id)
        .fold(current, i64::max)
}
