//! Alert scheduling ahead of calendar events.
//!
//! This module derives timed reminders from the current event list and fires
//! them through a notification sink. The system consists of four main
//! components:
//!
//! - [`AlertEntry`]: A single reminder for one event at one offset
//! - [`AlertQueue`]: Pure alert state (rebuild, snooze, dismiss, due alerts)
//! - [`AlertScheduler`]: Wraps the queue with the background worker waiting on deadlines
//! - [`NotificationSink`]: Receives fired alerts
//!
//! # Architecture
//!
//! The queue keeps every entry by [`AlertId`] plus an ordered index of armed
//! deadlines. Each refresh rebuilds the queue from the new events while
//! keeping the state users changed. The scheduler worker sleeps until the
//! earliest deadline and is woken early whenever the queue changes.
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use fxnews::alerts::{AlertScheduler, AlertSettings, NotificationSink};
//! use fxnews::feed::CalendarEvent;
//!
//! # async fn example(events: Vec<CalendarEvent>, sink: Arc<dyn NotificationSink>) {
//! let scheduler = Arc::new(AlertScheduler::new(
//!     AlertSettings::default(),
//!     sink,
//!     CancellationToken::new(),
//! ));
//! tokio::spawn(Arc::clone(&scheduler).run());
//!
//! scheduler.rebuild(&events).await;
//! for entry in scheduler.pending_alerts().await {
//!     println!("{}", entry);
//! }
//! # }
//! ```

mod alert;
mod alert_queue;
mod alert_scheduler;
mod sink;

pub use crate::alerts::alert::{AlertEntry, AlertId, AlertState};
pub use crate::alerts::alert_queue::{AlertQueue, SnoozeOutcome};
pub use crate::alerts::alert_scheduler::AlertScheduler;
#[cfg(test)]
pub use crate::alerts::sink::MockNotificationSink;
pub use crate::alerts::sink::{ChannelSink, NotificationSink, NotifyError};

use std::collections::HashSet;

use thiserror::Error;

use crate::feed::Impact;

/// Minimum gap kept between a snoozed alert and the event start, in minutes.
pub const SNOOZE_MARGIN_MINUTES: i64 = 1;

/// Errors raised by alert configuration and user actions on alerts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("alert offset must be a positive number of minutes, got {0}")]
    InvalidOffset(i64),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("no alert {0}")]
    UnknownAlert(AlertId),

    #[error("alert {id} cannot go from {from} to {to}")]
    InvalidTransition {
        id: AlertId,
        from: AlertState,
        to: AlertState,
    },
}

/// Which events get alerts and how early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSettings {
    /// Master switch; when off, rebuilds produce no alerts
    pub enabled: bool,
    /// Minutes before the event start, descending and without duplicates
    pub offsets: Vec<u32>,
    /// Impacts alerts are generated for
    pub impacts: HashSet<Impact>,
    pub snooze_default_minutes: u32,
}

impl Default for AlertSettings {
    fn default() -> Self {
        AlertSettings {
            enabled: true,
            offsets: vec![60, 30, 15, 5],
            impacts: HashSet::from([Impact::High]),
            snooze_default_minutes: 5,
        }
    }
}
