//! Filtering, sorting and grouping of normalized events.
//!
//! These helpers never mutate their input; presentation layers call them on
//! the immutable event list returned by the engine.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;

use crate::feed::{CalendarEvent, Impact};

/// Criteria narrowing an event list.
///
/// Empty criteria match everything. Every non-empty criterion must match for
/// an event to be kept.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Impacts to keep
    pub impacts: HashSet<Impact>,
    /// Currency codes to keep, compared case-insensitively
    pub currencies: HashSet<String>,
    /// Inclusive lower date bound
    pub start: Option<NaiveDate>,
    /// Inclusive upper date bound
    pub end: Option<NaiveDate>,
    /// Case-insensitive text searched in the title, currency, impact and values
    pub search: String,
}

impl EventFilter {
    /// Keeps only the given impacts.
    pub fn with_impacts(mut self, impacts: &[Impact]) -> Self {
        self.impacts = impacts.iter().copied().collect();
        self
    }

    /// Keeps only the given currencies.
    pub fn with_currencies(mut self, currencies: &[&str]) -> Self {
        self.currencies = currencies
            .iter()
            .map(|currency| currency.trim().to_ascii_uppercase())
            .filter(|currency| !currency.is_empty())
            .collect();
        self
    }

    /// Keeps only events dated within `start..=end`.
    pub fn with_date_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Keeps only events containing `search`.
    pub fn with_search(mut self, search: &str) -> Self {
        self.search = search.trim().to_lowercase();
        self
    }

    /// Whether `event` satisfies every criterion.
    pub fn matches(&self, event: &CalendarEvent) -> bool {
        if !self.impacts.is_empty() && !self.impacts.contains(&event.impact) {
            return false;
        }
        if !self.currencies.is_empty()
            && !self
                .currencies
                .contains(&event.currency.to_ascii_uppercase())
        {
            return false;
        }
        if self.start.is_some_and(|start| event.date < start) {
            return false;
        }
        if self.end.is_some_and(|end| event.date > end) {
            return false;
        }
        self.search.is_empty() || self.matches_search(event)
    }

    /// Returns the matching events, in input order.
    pub fn apply(&self, events: &[CalendarEvent]) -> Vec<CalendarEvent> {
        events
            .iter()
            .filter(|event| self.matches(event))
            .cloned()
            .collect()
    }

    fn matches_search(&self, event: &CalendarEvent) -> bool {
        let impact = event.impact.to_string();
        [
            Some(event.title.as_str()),
            Some(event.currency.as_str()),
            Some(impact.as_str()),
            event.actual.as_deref(),
            event.forecast.as_deref(),
            event.previous.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|haystack| haystack.to_lowercase().contains(&self.search))
    }
}

/// Sorts events chronologically, or by impact first when `by_impact_first`.
///
/// Events without a clock time sort at the start of their day.
pub fn sort_events(events: &[CalendarEvent], by_impact_first: bool) -> Vec<CalendarEvent> {
    let mut sorted = events.to_vec();
    if by_impact_first {
        sorted.sort_by(|a, b| {
            (a.impact.weight(), a.date, a.start()).cmp(&(b.impact.weight(), b.date, b.start()))
        });
    } else {
        sorted.sort_by(|a, b| (a.date, a.start()).cmp(&(b.date, b.start())));
    }
    sorted
}

/// Groups events by calendar date, each day sorted by time, impact and title.
pub fn group_events_by_day(events: &[CalendarEvent]) -> BTreeMap<NaiveDate, Vec<CalendarEvent>> {
    let mut buckets: BTreeMap<NaiveDate, Vec<CalendarEvent>> = BTreeMap::new();
    for event in events {
        buckets.entry(event.date).or_default().push(event.clone());
    }

    for day_events in buckets.values_mut() {
        day_events.sort_by(|a, b| {
            (a.start(), a.impact.weight(), a.title.to_lowercase()).cmp(&(
                b.start(),
                b.impact.weight(),
                b.title.to_lowercase(),
            ))
        });
    }

    buckets
}
