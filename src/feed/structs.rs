//! Normalized data structures for calendar events.
//!
//! This module defines the validated, UTC-normalized representation of a
//! calendar entry produced by the [`EventNormalizer`](crate::feed::EventNormalizer)
//! and consumed by the cache, the diff engine and the alert scheduler.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Severity category of a calendar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Impact {
    High,
    Medium,
    Low,
    Holiday,
}

impl Impact {
    /// Parses the impact label used by the feed.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Returns `None` for any label outside the four known categories.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Impact::High),
            "medium" => Some(Impact::Medium),
            "low" => Some(Impact::Low),
            "holiday" => Some(Impact::Holiday),
            _ => None,
        }
    }

    /// Sort weight used when ordering events by impact first.
    pub fn weight(&self) -> u8 {
        match self {
            Impact::High => 0,
            Impact::Medium => 1,
            Impact::Low => 2,
            Impact::Holiday => 3,
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            Impact::High => "High",
            Impact::Medium => "Medium",
            Impact::Low => "Low",
            Impact::Holiday => "Holiday",
        };
        write!(f, "{}", label)
    }
}

/// Time of day of an event as announced by the feed.
///
/// Only [`EventTime::Clock`] carries an instant. `Tentative` and `AllDay`
/// are explicit markers and never produce alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTime {
    /// Fixed clock time.
    Clock {
        /// Time string exactly as the feed gave it, kept for presentation.
        display: String,
        /// Start of the event in UTC.
        at: DateTime<Utc>,
    },
    /// The feed has not settled on a time yet.
    Tentative,
    /// The event spans the whole day.
    AllDay,
}

impl EventTime {
    /// Display string of the time, as used in the identity key.
    pub fn display(&self) -> &str {
        match self {
            EventTime::Clock { display, .. } => display,
            EventTime::Tentative => "Tentative",
            EventTime::AllDay => "All Day",
        }
    }
}

/// Identity of an event across fetches.
///
/// Built from the date, the time as given, the currency and the event name.
/// Two events of the same snapshot never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub date: NaiveDate,
    pub time: String,
    pub currency: String,
    pub title: String,
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.date, self.time, self.currency, self.title
        )
    }
}

/// A validated calendar entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Calendar date of the event in the feed's timezone
    pub date: NaiveDate,
    /// Clock time or non-clock marker
    pub time: EventTime,
    /// Currency code the event relates to (e.g. `USD`)
    pub currency: String,
    pub impact: Impact,
    /// Event name
    pub title: String,
    pub actual: Option<String>,
    pub forecast: Option<String>,
    pub previous: Option<String>,
}

impl CalendarEvent {
    /// Returns the identity key of the event.
    pub fn key(&self) -> EventKey {
        EventKey {
            date: self.date,
            time: self.time.display().to_owned(),
            currency: self.currency.clone(),
            title: self.title.clone(),
        }
    }

    /// Start instant of the event, if it has a fixed clock time.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        match &self.time {
            EventTime::Clock { at, .. } => Some(*at),
            EventTime::Tentative | EventTime::AllDay => None,
        }
    }
}

impl fmt::Display for CalendarEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} [{}] {}",
            self.date,
            self.time.display(),
            self.currency,
            self.impact,
            self.title
        )
    }
}
