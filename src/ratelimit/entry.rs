//! Fixed-window rate limit entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-client state of a fixed window counter.
///
/// The client id is the key of the surrounding store, so it is not repeated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitEntry {
    /// Actions observed in the current window
    pub count: u32,
    /// Instant after which the window is considered expired
    pub window_reset_at: DateTime<Utc>,
}

impl RateLimitEntry {
    /// A fresh entry whose window starts at `now`.
    pub fn new(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 0,
            window_reset_at: reset_instant(now, window),
        }
    }

    /// Whether the window has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.window_reset_at
    }

    /// Reset the count and advance the window if it has expired.
    ///
    /// Returns `true` if a reset happened.
    pub fn refresh(&mut self, now: DateTime<Utc>, window: Duration) -> bool {
        if self.is_expired(now) {
            *self = Self::new(now, window);
            true
        } else {
            false
        }
    }

    /// Check whether one more action fits under `limit`.
    pub fn has_capacity(&self, limit: u32) -> bool {
        self.count < limit
    }

    /// Count one action.
    pub fn increment(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    /// Remaining actions in this window.
    pub fn remaining(&self, limit: u32) -> u32 {
        limit.saturating_sub(self.count)
    }

    /// Get the duration until the current window resets.
    pub fn duration_until_reset(&self, now: DateTime<Utc>) -> Duration {
        (self.window_reset_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

fn reset_instant(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::TimeDelta::from_std(window)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
