//! Change detection between two fetch cycles.
//!
//! This module provides the [`DiffEngine`] which classifies every event of two
//! snapshots by identity key, and the resulting [`SnapshotDiff`].

use std::{collections::BTreeMap, fmt};

use crate::feed::{CalendarEvent, EventKey};

/// Field of an event whose value may change between fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventField {
    Actual,
    Forecast,
    Previous,
    Impact,
}

impl fmt::Display for EventField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            EventField::Actual => "actual",
            EventField::Forecast => "forecast",
            EventField::Previous => "previous",
            EventField::Impact => "impact",
        };
        write!(f, "{}", name)
    }
}

/// Classification of one identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Only in the new snapshot
    Added,
    /// Only in the old snapshot
    Removed,
    /// In both, with the listed fields differing
    Changed(Vec<EventField>),
    Unchanged,
}

/// Counts of each change class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub unchanged: usize,
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} changed, {} unchanged",
            self.added, self.removed, self.changed, self.unchanged
        )
    }
}

/// Result of comparing two snapshots, ordered by identity key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    changes: BTreeMap<EventKey, Change>,
}

impl SnapshotDiff {
    /// Classification of `key`, if it appears in either snapshot.
    pub fn get(&self, key: &EventKey) -> Option<&Change> {
        self.changes.get(key)
    }

    /// Every classified key, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&EventKey, &Change)> {
        self.changes.iter()
    }

    pub fn added(&self) -> impl Iterator<Item = &EventKey> {
        self.keys_where(|change| matches!(change, Change::Added))
    }

    pub fn removed(&self) -> impl Iterator<Item = &EventKey> {
        self.keys_where(|change| matches!(change, Change::Removed))
    }

    /// Keys whose values changed, with the differing fields.
    pub fn changed(&self) -> impl Iterator<Item = (&EventKey, &[EventField])> {
        self.changes.iter().filter_map(|(key, change)| match change {
            Change::Changed(fields) => Some((key, fields.as_slice())),
            _ => None,
        })
    }

    pub fn unchanged(&self) -> impl Iterator<Item = &EventKey> {
        self.keys_where(|change| matches!(change, Change::Unchanged))
    }

    /// Counts of each class.
    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for change in self.changes.values() {
            match change {
                Change::Added => summary.added += 1,
                Change::Removed => summary.removed += 1,
                Change::Changed(_) => summary.changed += 1,
                Change::Unchanged => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Whether anything was added, removed or changed.
    pub fn has_changes(&self) -> bool {
        self.changes
            .values()
            .any(|change| !matches!(change, Change::Unchanged))
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn keys_where(&self, predicate: fn(&Change) -> bool) -> impl Iterator<Item = &EventKey> {
        self.changes
            .iter()
            .filter(move |(_, change)| predicate(change))
            .map(|(key, _)| key)
    }
}

/// Compares event lists by identity key.
pub struct DiffEngine;

impl DiffEngine {
    /// Classifies every key of `old` and `new`.
    ///
    /// Swapping the arguments swaps `Added` and `Removed` and leaves the
    /// `Changed` fields untouched.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use fxnews::{cache::CacheSnapshot, diff::DiffEngine};
    /// # fn example(previous: &CacheSnapshot, current: &CacheSnapshot) {
    /// let diff = DiffEngine::diff(&previous.events, &current.events);
    /// println!("{}", diff.summary());
    /// # }
    /// ```
    pub fn diff(old: &[CalendarEvent], new: &[CalendarEvent]) -> SnapshotDiff {
        let old_by_key: BTreeMap<EventKey, &CalendarEvent> =
            old.iter().map(|event| (event.key(), event)).collect();
        let new_by_key: BTreeMap<EventKey, &CalendarEvent> =
            new.iter().map(|event| (event.key(), event)).collect();

        let mut changes = BTreeMap::new();

        for (key, old_event) in &old_by_key {
            let change = match new_by_key.get(key) {
                None => Change::Removed,
                Some(new_event) => {
                    let fields = changed_fields(old_event, new_event);
                    if fields.is_empty() {
                        Change::Unchanged
                    } else {
                        Change::Changed(fields)
                    }
                }
            };
            changes.insert(key.clone(), change);
        }

        for key in new_by_key.keys() {
            if !old_by_key.contains_key(key) {
                changes.insert(key.clone(), Change::Added);
            }
        }

        SnapshotDiff { changes }
    }
}

fn changed_fields(old: &CalendarEvent, new: &CalendarEvent) -> Vec<EventField> {
    let mut fields = Vec::new();
    if old.actual != new.actual {
        fields.push(EventField::Actual);
    }
    if old.forecast != new.forecast {
        fields.push(EventField::Forecast);
    }
    if old.previous != new.previous {
        fields.push(EventField::Previous);
    }
    if old.impact != new.impact {
        fields.push(EventField::Impact);
    }
    fields
}
