//! Alert entries derived from calendar events.
//!
//! This module provides the [`AlertEntry`] struct tracking one reminder for
//! one event, identified by the event key and the reminder offset.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feed::{EventKey, Impact};

/// Identity of an alert: the event it reminds of and how early it fires.
///
/// Ids are stable across refreshes as long as the event keeps its key, which
/// lets a rebuild carry user-driven state (snooze, dismiss) over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlertId {
    /// Identity key of the event
    pub key: EventKey,
    /// Minutes before the event start
    pub offset: u32,
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (-{}min)", self.key, self.offset)
    }
}

/// Lifecycle state of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertState {
    /// Armed, waiting for its computed fire time
    Pending,
    /// Sent to the notification sink
    Fired,
    /// Armed again at a user-chosen time
    Snoozed,
    /// Silenced by the user, never fires again
    Dismissed,
}

impl AlertState {
    /// Whether the state is waiting for a deadline.
    pub fn is_armed(&self) -> bool {
        matches!(self, AlertState::Pending | AlertState::Snoozed)
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// `Dismissed` is terminal and every other state may be dismissed.
    ///
    /// # Examples
    ///
    /// ```
    /// # use fxnews::alerts::AlertState;
    /// assert!(AlertState::Pending.can_transition_to(AlertState::Fired));
    /// assert!(AlertState::Fired.can_transition_to(AlertState::Snoozed));
    /// assert!(!AlertState::Dismissed.can_transition_to(AlertState::Pending));
    /// ```
    pub fn can_transition_to(&self, next: AlertState) -> bool {
        match (self, next) {
            (AlertState::Dismissed, _) => false,
            (_, AlertState::Dismissed) => true,
            (AlertState::Pending, AlertState::Fired)
            | (AlertState::Pending, AlertState::Snoozed)
            | (AlertState::Snoozed, AlertState::Fired)
            | (AlertState::Fired, AlertState::Snoozed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            AlertState::Pending => "pending",
            AlertState::Fired => "fired",
            AlertState::Snoozed => "snoozed",
            AlertState::Dismissed => "dismissed",
        };
        write!(f, "{}", label)
    }
}

/// One reminder for one event.
///
/// `fire_at` is always strictly before `event_start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEntry {
    pub id: AlertId,
    /// Start of the event in UTC
    pub event_start: DateTime<Utc>,
    /// Impact of the event, for presentation
    pub impact: Impact,
    /// When the alert fires
    pub fire_at: DateTime<Utc>,
    pub state: AlertState,
}

impl fmt::Display for AlertEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} [{}] fires at {} ({}), event starts at {}",
            self.id, self.impact, self.fire_at, self.state, self.event_start
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn create_test_id(offset: u32) -> AlertId {
        AlertId {
            key: EventKey {
                date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
                time: "8:30am".to_owned(),
                currency: "USD".to_owned(),
                title: "Non-Farm Payrolls".to_owned(),
            },
            offset,
        }
    }

    #[test]
    fn test_allowed_transitions() {
        assert!(AlertState::Pending.can_transition_to(AlertState::Fired));
        assert!(AlertState::Pending.can_transition_to(AlertState::Snoozed));
        assert!(AlertState::Snoozed.can_transition_to(AlertState::Fired));
        assert!(AlertState::Fired.can_transition_to(AlertState::Snoozed));
        assert!(AlertState::Pending.can_transition_to(AlertState::Dismissed));
        assert!(AlertState::Snoozed.can_transition_to(AlertState::Dismissed));
        assert!(AlertState::Fired.can_transition_to(AlertState::Dismissed));
    }

    #[test]
    fn test_forbidden_transitions() {
        assert!(!AlertState::Fired.can_transition_to(AlertState::Pending));
        assert!(!AlertState::Snoozed.can_transition_to(AlertState::Pending));
        assert!(!AlertState::Dismissed.can_transition_to(AlertState::Pending));
        assert!(!AlertState::Dismissed.can_transition_to(AlertState::Snoozed));
        assert!(!AlertState::Dismissed.can_transition_to(AlertState::Dismissed));
    }

    #[test]
    fn test_only_pending_and_snoozed_are_armed() {
        assert!(AlertState::Pending.is_armed());
        assert!(AlertState::Snoozed.is_armed());
        assert!(!AlertState::Fired.is_armed());
        assert!(!AlertState::Dismissed.is_armed());
    }

    #[test]
    fn test_alert_ids_differ_by_offset() {
        assert_ne!(create_test_id(30), create_test_id(15));
        assert_eq!(create_test_id(30), create_test_id(30));
        assert_eq!(
            create_test_id(30).to_string(),
            "2025-10-01 8:30am USD Non-Farm Payrolls (-30min)"
        );
    }
}
