//! Alert state without any clock or task.
//!
//! Every operation takes `now` explicitly, which keeps the reconciliation,
//! snooze and dismiss rules deterministic.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

use crate::{
    alerts::{
        AlertEntry, AlertId, AlertSettings, AlertState, SNOOZE_MARGIN_MINUTES, SchedulingError,
    },
    feed::CalendarEvent,
};

/// Result of a snooze request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnoozeOutcome {
    /// The alert is armed again at the given time.
    Snoozed(DateTime<Utc>),
    /// The event starts too soon to defer the alert, it must be sent now.
    FireNow(AlertEntry),
}

/// Every alert entry plus the ordered set of armed deadlines.
///
/// Only `Pending` and `Snoozed` entries appear in the deadline index.
#[derive(Debug, Default)]
pub struct AlertQueue {
    entries: HashMap<AlertId, AlertEntry>,
    schedule: BTreeSet<(DateTime<Utc>, AlertId)>,
}

impl AlertQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes the entries from `events`.
    ///
    /// An entry is kept for each event with a clock time after `now` whose
    /// impact is enabled, once per offset. Entries the user or the worker
    /// already touched (`Fired`, `Snoozed`, `Dismissed`) keep their state and
    /// fire time. New entries whose fire time has already passed are not
    /// created. Entries of events that vanished or started are dropped.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use chrono::Utc;
    /// # use fxnews::{alerts::{AlertQueue, AlertSettings}, feed::CalendarEvent};
    /// # fn example(events: Vec<CalendarEvent>) {
    /// let mut queue = AlertQueue::new();
    /// queue.rebuild(&events, Utc::now(), &AlertSettings::default());
    /// # }
    /// ```
    pub fn rebuild(&mut self, events: &[CalendarEvent], now: DateTime<Utc>, settings: &AlertSettings) {
        let mut entries = HashMap::new();

        if settings.enabled {
            for event in events {
                if !settings.impacts.contains(&event.impact) {
                    continue;
                }
                // Tentative and all-day events have nothing to count down to
                let Some(start) = event.start() else {
                    continue;
                };
                if start <= now {
                    continue;
                }

                let key = event.key();
                for &offset in &settings.offsets {
                    let id = AlertId {
                        key: key.clone(),
                        offset,
                    };

                    if let Some(mut existing) = self.entries.remove(&id) {
                        // The feed may revise the impact of a known event
                        existing.impact = event.impact;
                        entries.insert(id, existing);
                        continue;
                    }

                    let fire_at = start - Duration::minutes(i64::from(offset));
                    if fire_at < now {
                        debug!("reminder window already passed for alert {}", id);
                        continue;
                    }

                    entries.insert(
                        id.clone(),
                        AlertEntry {
                            id,
                            event_start: start,
                            impact: event.impact,
                            fire_at,
                            state: AlertState::Pending,
                        },
                    );
                }
            }
        }

        let dropped = self.entries.len();
        self.entries = entries;
        self.schedule = self
            .entries
            .values()
            .filter(|entry| entry.state.is_armed())
            .map(|entry| (entry.fire_at, entry.id.clone()))
            .collect();

        info!(
            "rebuilt alert queue: {} entries, {} armed, {} dropped",
            self.entries.len(),
            self.schedule.len(),
            dropped
        );
    }

    /// Defers an alert by `minutes` from `now`.
    ///
    /// The new fire time never goes past one minute before the event start.
    /// When that bound is not in the future the alert is marked fired and
    /// returned as [`SnoozeOutcome::FireNow`] for immediate dispatch.
    ///
    /// # Errors
    ///
    /// - `InvalidValue` when `minutes` is zero
    /// - `UnknownAlert` when `id` is not in the queue
    /// - `InvalidTransition` when the alert is neither pending nor fired
    pub fn snooze(
        &mut self,
        id: &AlertId,
        minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<SnoozeOutcome, SchedulingError> {
        if minutes == 0 {
            return Err(SchedulingError::InvalidValue {
                field: "minutes",
                reason: "snooze duration must be at least one minute".to_owned(),
            });
        }

        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| SchedulingError::UnknownAlert(id.clone()))?;

        if !entry.state.can_transition_to(AlertState::Snoozed) {
            return Err(SchedulingError::InvalidTransition {
                id: id.clone(),
                from: entry.state,
                to: AlertState::Snoozed,
            });
        }

        let requested = now + Duration::minutes(i64::from(minutes));
        let latest = entry.event_start - Duration::minutes(SNOOZE_MARGIN_MINUTES);
        let fire_at = requested.min(latest);

        self.schedule.remove(&(entry.fire_at, id.clone()));

        if fire_at <= now {
            entry.state = AlertState::Fired;
            info!("alert {} cannot be snoozed past its event, firing now", id);
            return Ok(SnoozeOutcome::FireNow(entry.clone()));
        }

        entry.state = AlertState::Snoozed;
        entry.fire_at = fire_at;
        self.schedule.insert((fire_at, id.clone()));

        info!("snoozed alert {} until {}", id, fire_at);

        Ok(SnoozeOutcome::Snoozed(fire_at))
    }

    /// Silences an alert for good.
    ///
    /// Dismissing an already dismissed alert is a no-op.
    pub fn dismiss(&mut self, id: &AlertId) -> Result<(), SchedulingError> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| SchedulingError::UnknownAlert(id.clone()))?;

        if entry.state == AlertState::Dismissed {
            return Ok(());
        }
        if !entry.state.can_transition_to(AlertState::Dismissed) {
            return Err(SchedulingError::InvalidTransition {
                id: id.clone(),
                from: entry.state,
                to: AlertState::Dismissed,
            });
        }

        self.schedule.remove(&(entry.fire_at, id.clone()));
        entry.state = AlertState::Dismissed;

        info!("dismissed alert {}", id);

        Ok(())
    }

    /// Removes the earliest armed entry due at `now`, marking it fired.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<AlertEntry> {
        let (fire_at, _) = self.schedule.first()?;
        if *fire_at > now {
            return None;
        }

        let (_, id) = self.schedule.pop_first()?;
        let entry = self.entries.get_mut(&id)?;
        entry.state = AlertState::Fired;
        Some(entry.clone())
    }

    /// Removes every armed entry due at `now`, marking them fired.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<AlertEntry> {
        std::iter::from_fn(|| self.pop_due(now)).collect()
    }

    /// Earliest armed fire time.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.schedule.first().map(|(fire_at, _)| *fire_at)
    }

    /// Armed entries ordered by fire time.
    pub fn pending_alerts(&self) -> Vec<AlertEntry> {
        self.schedule
            .iter()
            .filter_map(|(_, id)| self.entries.get(id).cloned())
            .collect()
    }

    pub fn get(&self, id: &AlertId) -> Option<&AlertEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
