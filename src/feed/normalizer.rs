//! Validation and normalization of the calendar payload.
//!
//! This module provides the [`EventNormalizer`] which turns the raw feed
//! payload into validated [`CalendarEvent`] records with UTC start instants.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::{debug, warn};
use serde_json::Value;

use crate::feed::response_structs::RawEvent;
use crate::feed::{CalendarEvent, EventTime, Impact, SchemaError};

/// Accepted formats of a bare date.
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m-%d-%Y"];
/// Accepted formats of a clock time, 12-hour first.
const TIME_FORMATS: [&str; 2] = ["%I:%M%p", "%H:%M"];
/// Accepted formats of a timestamp without offset.
const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Converts feed payloads into normalized events.
///
/// Dates and times without an explicit offset are interpreted in the feed's
/// stated timezone.
///
/// # Examples
///
/// ```
/// # use fxnews::feed::{EventNormalizer, SchemaError};
/// # fn main() -> Result<(), SchemaError> {
/// let normalizer = EventNormalizer::new(chrono_tz::America::New_York);
/// let events = normalizer.normalize(r#"[{"title": "GDP", "country": "USD", "date": "2025-10-01T08:30:00-04:00", "impact": "High"}]"#)?;
/// assert_eq!(events.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct EventNormalizer {
    /// Timezone of the feed
    timezone: Tz,
}

impl EventNormalizer {
    /// Create a new [EventNormalizer].
    ///
    /// # Arguments
    ///
    /// * `timezone` - Timezone the feed expresses local dates and times in.
    pub fn new(timezone: Tz) -> Self {
        EventNormalizer { timezone }
    }

    /// Validates the payload and converts it into events.
    ///
    /// The payload must be a JSON array of objects, each carrying `date`,
    /// `country`, `title` and `impact` strings. Unknown fields are ignored.
    /// Records with an impact label outside the four known categories are
    /// skipped with a warning. Events sharing an identity key are collapsed
    /// onto the first one.
    ///
    /// # Returns
    ///
    /// The events sorted by date, start instant and title, or the first
    /// [`SchemaError`] encountered.
    pub fn normalize(&self, payload: &str) -> Result<Vec<CalendarEvent>, SchemaError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| SchemaError::InvalidJson(e.to_string()))?;

        let Value::Array(records) = value else {
            return Err(SchemaError::NotAnArray);
        };

        let mut events = Vec::with_capacity(records.len());
        let mut seen_keys = HashSet::new();

        for (index, record) in records.into_iter().enumerate() {
            if !record.is_object() {
                return Err(SchemaError::InvalidRecord {
                    index,
                    reason: "not a JSON object".to_owned(),
                });
            }

            let raw: RawEvent =
                serde_json::from_value(record).map_err(|e| SchemaError::InvalidRecord {
                    index,
                    reason: e.to_string(),
                })?;
            debug!("normalize raw event {}", raw);

            let Some(event) = self.convert_event(index, raw)? else {
                continue;
            };

            if !seen_keys.insert(event.key()) {
                warn!(
                    "duplicate event {} at index {}, keeping the first occurrence",
                    event.key(),
                    index
                );
                continue;
            }

            events.push(event);
        }

        events.sort_by(|a, b| {
            (a.date, a.start(), &a.title).cmp(&(b.date, b.start(), &b.title))
        });

        debug!("normalized {} events", events.len());

        Ok(events)
    }

    /// Converts one raw record into a [`CalendarEvent`].
    ///
    /// Returns `None` when the impact label is unknown.
    fn convert_event(
        &self,
        index: usize,
        raw: RawEvent,
    ) -> Result<Option<CalendarEvent>, SchemaError> {
        let date_value = required(index, "date", raw.date)?;
        let currency = required(index, "country", raw.country)?;
        let title = required(index, "title", raw.title)?;
        let impact_value = required(index, "impact", raw.impact)?;

        let Some(impact) = Impact::from_label(&impact_value) else {
            warn!(
                "skip event {} {} at index {}: unknown impact {:?}",
                currency, title, index, impact_value
            );
            return Ok(None);
        };

        let (date, time) = self.resolve_time(index, &date_value, raw.time.as_deref())?;

        Ok(Some(CalendarEvent {
            date,
            time,
            currency: currency.to_ascii_uppercase(),
            impact,
            title,
            actual: free_text(raw.actual),
            forecast: free_text(raw.forecast),
            previous: free_text(raw.previous),
        }))
    }

    /// Resolves the calendar date and the time of an event.
    fn resolve_time(
        &self,
        index: usize,
        date_value: &str,
        time_value: Option<&str>,
    ) -> Result<(NaiveDate, EventTime), SchemaError> {
        if let Some(time_value) = time_value {
            let date = parse_date(index, date_value)?;
            let time = match time_value.trim().to_ascii_lowercase().as_str() {
                "tentative" => EventTime::Tentative,
                "all day" | "all-day" => EventTime::AllDay,
                _ => {
                    let clock = parse_clock(time_value).ok_or(SchemaError::InvalidField {
                        index,
                        field: "time",
                        value: time_value.to_owned(),
                    })?;
                    let at = self.to_utc(index, date.and_time(clock), time_value)?;
                    EventTime::Clock {
                        display: time_value.to_owned(),
                        at,
                    }
                }
            };
            return Ok((date, time));
        }

        // Forex Factory JSON form: a full timestamp carrying its own offset
        if let Ok(timestamp) = DateTime::parse_from_rfc3339(date_value) {
            let display = date_value
                .splitn(2, ['T', 't', ' '])
                .nth(1)
                .unwrap_or_default()
                .to_owned();
            return Ok((
                timestamp.date_naive(),
                EventTime::Clock {
                    display,
                    at: timestamp.with_timezone(&Utc),
                },
            ));
        }

        if let Some(naive) = NAIVE_DATETIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(date_value, format).ok())
        {
            let display = date_value
                .split_once('T')
                .map(|(_, time)| time.to_owned())
                .unwrap_or_default();
            let at = self.to_utc(index, naive, date_value)?;
            return Ok((naive.date(), EventTime::Clock { display, at }));
        }

        Ok((parse_date(index, date_value)?, EventTime::AllDay))
    }

    /// Interprets a local date and time in the feed's timezone.
    ///
    /// Ambiguous times (DST fall back) resolve to the earliest instant, times
    /// falling in a DST gap are rejected.
    fn to_utc(
        &self,
        index: usize,
        local: NaiveDateTime,
        value: &str,
    ) -> Result<DateTime<Utc>, SchemaError> {
        self.timezone
            .from_local_datetime(&local)
            .earliest()
            .map(|at| at.with_timezone(&Utc))
            .ok_or(SchemaError::InvalidField {
                index,
                field: "time",
                value: value.to_owned(),
            })
    }
}

/// Returns the trimmed value of a required field, or a [`SchemaError::MissingField`].
fn required(
    index: usize,
    field: &'static str,
    value: Option<String>,
) -> Result<String, SchemaError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_owned()),
        _ => Err(SchemaError::MissingField { index, field }),
    }
}

/// Normalizes an optional free-text value, blank values become `None`.
fn free_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Parses the date part of a date or timestamp string.
fn parse_date(index: usize, value: &str) -> Result<NaiveDate, SchemaError> {
    let date_part = value.split(['T', ' ']).next().unwrap_or_default();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(date_part, format).ok())
        .ok_or(SchemaError::InvalidField {
            index,
            field: "date",
            value: value.to_owned(),
        })
}

/// Parses a clock time such as `8:30am`, `1:05 PM` or `13:45`.
fn parse_clock(value: &str) -> Option<NaiveTime> {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(&compact, format).ok())
}
