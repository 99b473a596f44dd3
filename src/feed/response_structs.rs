//! Response structures for the calendar feed.
//!
//! The feed is a JSON array of loosely-typed records. Every field is optional
//! here so the normalizer can report exactly which required field is missing.
//! Fields not listed are ignored.

use serde::Deserialize;
use std::fmt;

/// One calendar record as published by the feed.
///
/// The Forex Factory JSON feed looks like:
/// ```text
/// {
///   "title": "CPI m/m",
///   "country": "USD",
///   "date": "2025-10-01T08:30:00-04:00",
///   "impact": "High",
///   "forecast": "0.3%",
///   "previous": "0.2%"
/// }
/// ```
/// Other exports split the date and the time (`"date": "10-01-2025"`,
/// `"time": "8:30am"`), which is why `time` is accepted too.
#[derive(Deserialize, Debug, Default)]
pub struct RawEvent {
    /// Event name.
    #[serde(alias = "event")]
    pub title: Option<String>,
    /// Currency code the event relates to.
    #[serde(alias = "currency")]
    pub country: Option<String>,
    /// Date, either a bare date or an RFC 3339 timestamp.
    pub date: Option<String>,
    /// Optional time of day, `Tentative` or `All Day`.
    pub time: Option<String>,
    /// Impact label.
    pub impact: Option<String>,
    pub actual: Option<String>,
    pub forecast: Option<String>,
    pub previous: Option<String>,
}

impl fmt::Display for RawEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "title={:?}, country={:?}, date={:?}, time={:?}, impact={:?}",
            self.title, self.country, self.date, self.time, self.impact
        )
    }
}
