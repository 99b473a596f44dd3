//! Immutable snapshot of one successful feed fetch.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::feed::CalendarEvent;

/// Version of the snapshot layout.
///
/// Increment it whenever [`CacheSnapshot`] or [`CalendarEvent`] changes shape
/// so stale cache files are discarded instead of misread.
pub const SCHEMA_VERSION: u32 = 1;

/// Last-known-good calendar, as fetched at `fetched_at`.
///
/// A snapshot is never mutated; a new fetch produces a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// When the events were downloaded
    pub fetched_at: DateTime<Utc>,
    /// Url the events were downloaded from
    pub source: String,
    // If this field is missing in the JSON (old cache), it defaults to 0.
    #[serde(default)]
    pub schema_version: u32,
    /// Normalized events, in feed order
    pub events: Vec<CalendarEvent>,
}

impl CacheSnapshot {
    /// Creates a snapshot at the current schema version.
    pub fn new(fetched_at: DateTime<Utc>, source: &str, events: Vec<CalendarEvent>) -> Self {
        CacheSnapshot {
            fetched_at,
            source: source.to_owned(),
            schema_version: SCHEMA_VERSION,
            events,
        }
    }

    /// Age of the snapshot at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }

    /// Whether the snapshot is at least `ttl` old at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) >= ttl
    }
}

impl fmt::Display for CacheSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "fetched_at={}, source={}, schema_version={}, events={}",
            self.fetched_at,
            self.source,
            self.schema_version,
            self.events.len()
        )
    }
}
