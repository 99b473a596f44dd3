//! Alert scheduler firing reminders at their deadlines.
//!
//! This module provides the [`AlertScheduler`] which owns the [`AlertQueue`]
//! and runs the worker that waits for the earliest armed deadline and hands
//! due alerts to the [`NotificationSink`].

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use tokio::{
    sync::{Mutex, Notify},
    time,
};
use tokio_util::sync::CancellationToken;

use crate::{
    alerts::{
        AlertEntry, AlertId, AlertQueue, AlertSettings, NotificationSink, SchedulingError,
        SnoozeOutcome,
    },
    feed::CalendarEvent,
};

/// Wait used when no alert is armed; any change to the queue wakes the worker earlier.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Manages the alert queue and its background worker.
///
/// The `AlertScheduler` coordinates several key responsibilities:
/// - Rebuilding alerts whenever a refresh publishes new events
/// - Waiting for the earliest armed deadline without polling
/// - Dispatching due alerts to the notification sink
/// - Applying snooze and dismiss requests
///
/// # Thread Safety
///
/// All public methods take `&self` and lock the queue internally. The lock is
/// never held while the worker sleeps.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use fxnews::{
/// #     alerts::{AlertScheduler, AlertSettings, NotificationSink},
/// #     feed::CalendarEvent,
/// # };
/// # use tokio_util::sync::CancellationToken;
/// # async fn example(sink: Arc<dyn NotificationSink>, events: Vec<CalendarEvent>) {
/// let cancel = CancellationToken::new();
/// let scheduler = Arc::new(AlertScheduler::new(AlertSettings::default(), sink, cancel.clone()));
///
/// // Start the worker
/// let handle = tokio::spawn(Arc::clone(&scheduler).run());
///
/// scheduler.rebuild(&events).await;
///
/// // Stop the worker
/// cancel.cancel();
/// handle.await.unwrap();
/// # }
/// ```
pub struct AlertScheduler {
    /// Alert entries and armed deadlines
    queue: Mutex<AlertQueue>,
    settings: AlertSettings,
    /// Wakes the worker when the queue changes
    wake: Notify,
    /// Receives fired alerts
    sink: Arc<dyn NotificationSink>,
    /// Stops the worker; no alert is dispatched once cancelled
    cancel: CancellationToken,
}

impl AlertScheduler {
    /// Creates a new `AlertScheduler` with an empty queue.
    ///
    /// # Arguments
    ///
    /// * `settings` - Offsets, enabled impacts and snooze default
    /// * `sink` - Destination of fired alerts
    /// * `cancel` - Token shared with the engine to stop the worker
    pub fn new(
        settings: AlertSettings,
        sink: Arc<dyn NotificationSink>,
        cancel: CancellationToken,
    ) -> Self {
        AlertScheduler {
            queue: Mutex::new(AlertQueue::new()),
            settings,
            wake: Notify::new(),
            sink,
            cancel,
        }
    }

    pub fn settings(&self) -> &AlertSettings {
        &self.settings
    }

    /// Recomputes the alerts from a new event list and wakes the worker.
    pub async fn rebuild(&self, events: &[CalendarEvent]) {
        self.rebuild_at(events, Utc::now()).await;
    }

    pub(crate) async fn rebuild_at(&self, events: &[CalendarEvent], now: DateTime<Utc>) {
        self.queue
            .lock()
            .await
            .rebuild(events, now, &self.settings);
        self.wake.notify_one();
    }

    /// Defers an alert by `minutes`, or by the configured default.
    ///
    /// When the event starts too soon to defer, the alert is dispatched right
    /// away and [`SnoozeOutcome::FireNow`] is returned.
    ///
    /// # Errors
    ///
    /// Returns a [`SchedulingError`] for a zero duration, an unknown alert or
    /// an alert that is neither pending nor fired.
    pub async fn snooze(
        &self,
        id: &AlertId,
        minutes: Option<u32>,
    ) -> Result<SnoozeOutcome, SchedulingError> {
        let minutes = minutes.unwrap_or(self.settings.snooze_default_minutes);
        let outcome = self.queue.lock().await.snooze(id, minutes, Utc::now())?;

        if let SnoozeOutcome::FireNow(entry) = &outcome {
            self.dispatch(entry);
        }
        self.wake.notify_one();

        Ok(outcome)
    }

    /// Silences an alert for good; dismissing twice is a no-op.
    pub async fn dismiss(&self, id: &AlertId) -> Result<(), SchedulingError> {
        self.queue.lock().await.dismiss(id)?;
        self.wake.notify_one();
        Ok(())
    }

    /// Armed alerts ordered by fire time.
    pub async fn pending_alerts(&self) -> Vec<AlertEntry> {
        self.queue.lock().await.pending_alerts()
    }

    /// Runs the worker until the cancellation token fires.
    ///
    /// The worker sleeps until the earliest armed deadline, or until the
    /// queue changes, then dispatches every alert that is due.
    pub async fn run(self: Arc<Self>) {
        info!("alert worker started");

        loop {
            let next_deadline = self.queue.lock().await.next_deadline();
            let wait = match next_deadline {
                Some(deadline) => (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO),
                None => IDLE_WAIT,
            };
            debug!("alert worker waiting {:?} for {:?}", wait, next_deadline);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = self.wake.notified() => continue,
                _ = time::sleep(wait) => {}
            }

            self.fire_due().await;
        }

        info!("alert worker stopped");
    }

    /// Dispatches every armed alert due now, one at a time.
    async fn fire_due(&self) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let Some(entry) = self.queue.lock().await.pop_due(Utc::now()) else {
                return;
            };
            self.dispatch(&entry);
        }
    }

    fn dispatch(&self, entry: &AlertEntry) {
        if self.cancel.is_cancelled() {
            debug!("shutting down, not dispatching alert {}", entry.id);
            return;
        }

        info!("firing alert {}", entry);

        // A failing sink must not stop the worker
        if let Err(e) = self.sink.notify(entry) {
            error!("failed to notify alert {}: {}", entry.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertState, ChannelSink, MockNotificationSink, NotifyError};
    use crate::feed::clock_event;
    use crate::messages::EngineMessage;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn one_offset_settings(offset: u32) -> AlertSettings {
        AlertSettings {
            offsets: vec![offset],
            ..AlertSettings::default()
        }
    }

    /// Event whose `offset` reminder fires in roughly `delay_ms` milliseconds.
    fn event_due_in(title: &str, offset: u32, delay_ms: i64) -> CalendarEvent {
        let start = Utc::now()
            + ChronoDuration::minutes(i64::from(offset))
            + ChronoDuration::milliseconds(delay_ms);
        clock_event(title, "USD", start)
    }

    #[tokio::test]
    async fn test_worker_fires_due_alert() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let scheduler = Arc::new(AlertScheduler::new(
            one_offset_settings(30),
            Arc::new(ChannelSink::new(sender)),
            cancel.clone(),
        ));
        let handle = tokio::spawn(Arc::clone(&scheduler).run());

        let event = event_due_in("GDP", 30, 300);
        scheduler.rebuild(&[event.clone()]).await;
        assert_eq!(scheduler.pending_alerts().await.len(), 1);

        let message = time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        match message {
            EngineMessage::AlertDue(entry) => {
                assert_eq!(entry.id.key, event.key());
                assert_eq!(entry.state, AlertState::Fired);
            }
            other => panic!("unexpected message {:?}", other),
        }
        assert!(scheduler.pending_alerts().await.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_rebuild_wakes_idle_worker() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let scheduler = Arc::new(AlertScheduler::new(
            one_offset_settings(15),
            Arc::new(ChannelSink::new(sender)),
            cancel.clone(),
        ));
        let handle = tokio::spawn(Arc::clone(&scheduler).run());

        // Let the worker settle on the idle wait first
        time::sleep(Duration::from_millis(50)).await;
        scheduler.rebuild(&[event_due_in("CPI", 15, 100)]).await;

        let message = time::timeout(Duration::from_secs(5), receiver.recv()).await;
        assert!(matches!(message, Ok(Some(EngineMessage::AlertDue(_)))));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_dismissed_alert_never_fires() {
        let mut mock_sink = MockNotificationSink::new();
        mock_sink.expect_notify().never();

        let cancel = CancellationToken::new();
        let scheduler = Arc::new(AlertScheduler::new(
            one_offset_settings(30),
            Arc::new(mock_sink),
            cancel.clone(),
        ));
        let handle = tokio::spawn(Arc::clone(&scheduler).run());

        let event = event_due_in("GDP", 30, 300);
        scheduler.rebuild(&[event.clone()]).await;
        scheduler
            .dismiss(&AlertId {
                key: event.key(),
                offset: 30,
            })
            .await
            .unwrap();

        time::sleep(Duration::from_millis(600)).await;

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_stop_worker() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut mock_sink = MockNotificationSink::new();
        mock_sink.expect_notify().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(NotifyError::Failed("desktop notifications unavailable".to_owned()))
            } else {
                Ok(())
            }
        });

        let cancel = CancellationToken::new();
        let scheduler = Arc::new(AlertScheduler::new(
            one_offset_settings(30),
            Arc::new(mock_sink),
            cancel.clone(),
        ));
        let handle = tokio::spawn(Arc::clone(&scheduler).run());

        scheduler
            .rebuild(&[event_due_in("GDP", 30, 100), event_due_in("CPI", 30, 300)])
            .await;

        let deadline = time::Instant::now() + Duration::from_secs(5);
        while calls.load(Ordering::SeqCst) < 2 && time::Instant::now() < deadline {
            time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_worker_does_not_fire_overdue_alerts() {
        let mut mock_sink = MockNotificationSink::new();
        mock_sink.expect_notify().never();

        let cancel = CancellationToken::new();
        let scheduler = Arc::new(AlertScheduler::new(
            one_offset_settings(60),
            Arc::new(mock_sink),
            cancel.clone(),
        ));

        // Both reminders were due ten minutes ago and are still pending
        let now = Utc::now();
        let events = [
            clock_event("GDP", "USD", now + ChronoDuration::minutes(50)),
            clock_event("CPI", "EUR", now + ChronoDuration::minutes(50)),
        ];
        scheduler
            .rebuild_at(&events, now - ChronoDuration::minutes(15))
            .await;
        assert_eq!(scheduler.pending_alerts().await.len(), 2);

        cancel.cancel();
        let handle = tokio::spawn(Arc::clone(&scheduler).run());
        time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(scheduler.pending_alerts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_overdue_alerts_fire_when_not_cancelled() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let scheduler = Arc::new(AlertScheduler::new(
            one_offset_settings(60),
            Arc::new(ChannelSink::new(sender)),
            cancel.clone(),
        ));

        let now = Utc::now();
        let events = [
            clock_event("GDP", "USD", now + ChronoDuration::minutes(50)),
            clock_event("CPI", "EUR", now + ChronoDuration::minutes(50)),
        ];
        scheduler
            .rebuild_at(&events, now - ChronoDuration::minutes(15))
            .await;
        let handle = tokio::spawn(Arc::clone(&scheduler).run());

        for _ in 0..2 {
            let message = time::timeout(Duration::from_secs(5), receiver.recv()).await;
            assert!(matches!(message, Ok(Some(EngineMessage::AlertDue(_)))));
        }

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_snooze_uses_default_minutes() {
        let mut mock_sink = MockNotificationSink::new();
        mock_sink.expect_notify().never();

        let scheduler = AlertScheduler::new(
            one_offset_settings(60),
            Arc::new(mock_sink),
            CancellationToken::new(),
        );
        let event = clock_event("GDP", "USD", Utc::now() + ChronoDuration::hours(3));
        scheduler.rebuild(&[event.clone()]).await;

        let id = AlertId {
            key: event.key(),
            offset: 60,
        };
        let before = Utc::now();
        let outcome = scheduler.snooze(&id, None).await.unwrap();

        match outcome {
            SnoozeOutcome::Snoozed(fire_at) => {
                assert!(fire_at >= before + ChronoDuration::minutes(5));
                assert!(fire_at <= Utc::now() + ChronoDuration::minutes(5));
            }
            other => panic!("expected a snooze, got {:?}", other),
        }
        assert_eq!(
            scheduler.snooze(&id, Some(0)).await,
            Err(SchedulingError::InvalidValue {
                field: "minutes",
                reason: "snooze duration must be at least one minute".to_owned(),
            })
        );
    }

    #[tokio::test]
    async fn test_snooze_of_imminent_event_dispatches_immediately() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let scheduler = AlertScheduler::new(
            one_offset_settings(5),
            Arc::new(ChannelSink::new(sender)),
            CancellationToken::new(),
        );

        // The reminder is due and the event starts within a minute
        let now = Utc::now();
        let event = clock_event("GDP", "USD", now + ChronoDuration::seconds(30));
        scheduler
            .rebuild_at(&[event.clone()], now - ChronoDuration::minutes(5))
            .await;

        let id = AlertId {
            key: event.key(),
            offset: 5,
        };
        let outcome = scheduler.snooze(&id, Some(10)).await.unwrap();
        assert!(matches!(outcome, SnoozeOutcome::FireNow(_)));
        assert!(matches!(
            receiver.try_recv(),
            Ok(EngineMessage::AlertDue(_))
        ));
    }
}
