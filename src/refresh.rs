//! Refresh cycle of the calendar.
//!
//! This module provides the [`RefreshScheduler`] which runs the
//! fetch, normalize, diff, persist and publish cycle, either on a timer or on
//! demand, and keeps the current snapshot that every query reads.
//!
//! # Refresh Flow
//!
//! ```text
//! Trigger → Staleness check → Fetch (retries) → Normalize → Diff → Save → Swap snapshot → Rebuild alerts
//! ```
//!
//! Any failure before the swap leaves the last good snapshot current.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::{
    sync::{Mutex, RwLock, mpsc::UnboundedReceiver, mpsc::UnboundedSender},
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    alerts::AlertScheduler,
    cache::{CachePersistence, CacheSnapshot},
    diff::{DiffEngine, DiffSummary, SnapshotDiff},
    feed::{CalendarEvent, EventNormalizer, FetchClient, NetworkError, SchemaError},
    messages::EngineMessage,
};

/// Where the refresh cycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Fetching,
    Succeeded,
    /// The last refresh failed and the previous snapshot is still served
    FailedUsingCache,
}

/// What asked for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// Periodic tick of the refresh worker
    Timer,
    /// Explicit user request, skipped while the cache is fresh
    Manual,
    /// Refresh regardless of the cache age
    Forced,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            RefreshTrigger::Timer => "timer",
            RefreshTrigger::Manual => "manual",
            RefreshTrigger::Forced => "forced",
        };
        write!(f, "{}", label)
    }
}

/// Why a refresh failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Snapshot of the refresh state for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshStatus {
    pub state: RefreshState,
    /// Error of the last failed refresh, cleared on success
    pub last_error: Option<RefreshError>,
    /// Fetch time of the current snapshot
    pub last_success: Option<DateTime<Utc>>,
}

impl Default for RefreshStatus {
    fn default() -> Self {
        RefreshStatus {
            state: RefreshState::Idle,
            last_error: None,
            last_success: None,
        }
    }
}

/// Result of one call to [`RefreshScheduler::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cache is fresh, nothing was fetched
    Fresh,
    /// Another refresh is in flight
    AlreadyRunning,
    Succeeded(DiffSummary),
    Failed(RefreshError),
    Cancelled,
}

/// Clears the in-flight flag when the refresh ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Current snapshot and the diff that produced it.
///
/// Both sit behind one lock so readers never pair a snapshot with another
/// refresh's diff.
#[derive(Default)]
struct Published {
    snapshot: Option<Arc<CacheSnapshot>>,
    diff: Arc<SnapshotDiff>,
}

/// Runs refresh cycles and owns the current snapshot.
///
/// The current snapshot has a single writer (the refresh cycle) and many
/// readers. Readers get an `Arc` to an immutable snapshot, so the lock is only
/// held long enough to clone or swap that `Arc`.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use fxnews::{
/// #     alerts::AlertScheduler,
/// #     cache::JsonCacheStore,
/// #     feed::{EventNormalizer, FetchClient},
/// #     messages::EngineMessage,
/// #     refresh::{RefreshScheduler, RefreshTrigger},
/// # };
/// # use tokio::sync::mpsc::UnboundedSender;
/// # use tokio_util::sync::CancellationToken;
/// # async fn example(
/// #     fetch_client: FetchClient,
/// #     alert_scheduler: Arc<AlertScheduler>,
/// #     sender: UnboundedSender<EngineMessage>,
/// # ) {
/// let refresher = RefreshScheduler::new(
///     fetch_client,
///     EventNormalizer::new(chrono_tz::America::New_York),
///     Arc::new(JsonCacheStore::new("data/latest_calendar.json")),
///     alert_scheduler,
///     chrono::Duration::minutes(30),
///     sender,
/// );
///
/// let outcome = refresher.refresh(RefreshTrigger::Manual, &CancellationToken::new()).await;
/// println!("{:?}", outcome);
/// # }
/// ```
pub struct RefreshScheduler {
    fetch_client: FetchClient,
    normalizer: EventNormalizer,
    /// Durable copy of the current snapshot
    cache: Arc<dyn CachePersistence>,
    /// Rebuilt after every successful refresh
    alerts: Arc<AlertScheduler>,
    /// Age after which the snapshot is refreshed
    ttl: chrono::Duration,
    published: RwLock<Published>,
    status: Mutex<RefreshStatus>,
    in_flight: AtomicBool,
    /// Outbound channel to the presentation layer
    messages: UnboundedSender<EngineMessage>,
}

impl RefreshScheduler {
    /// Create a new [RefreshScheduler] with no snapshot.
    ///
    /// # Arguments
    ///
    /// * `fetch_client` - Downloads the feed with retries
    /// * `normalizer` - Validates and converts the payload
    /// * `cache` - Persists each new snapshot
    /// * `alerts` - Rebuilt from the events of each new snapshot
    /// * `ttl` - Age after which timer and manual triggers fetch again
    /// * `messages` - Receives refresh and diff notifications
    pub fn new(
        fetch_client: FetchClient,
        normalizer: EventNormalizer,
        cache: Arc<dyn CachePersistence>,
        alerts: Arc<AlertScheduler>,
        ttl: chrono::Duration,
        messages: UnboundedSender<EngineMessage>,
    ) -> Self {
        RefreshScheduler {
            fetch_client,
            normalizer,
            cache,
            alerts,
            ttl,
            published: RwLock::new(Published::default()),
            status: Mutex::new(RefreshStatus::default()),
            in_flight: AtomicBool::new(false),
            messages,
        }
    }

    /// Installs a snapshot loaded from the cache and rebuilds alerts from it.
    ///
    /// The restored snapshot has no diff, the current one is cleared.
    pub async fn restore(&self, snapshot: CacheSnapshot) {
        info!("restoring cached calendar {}", snapshot);

        let snapshot = Arc::new(snapshot);
        *self.published.write().await = Published {
            snapshot: Some(Arc::clone(&snapshot)),
            diff: Arc::new(SnapshotDiff::default()),
        };
        self.status.lock().await.last_success = Some(snapshot.fetched_at);

        self.alerts.rebuild(&snapshot.events).await;
    }

    pub async fn current_snapshot(&self) -> Option<Arc<CacheSnapshot>> {
        self.published.read().await.snapshot.clone()
    }

    /// Current snapshot together with the diff that produced it.
    pub async fn current(&self) -> (Option<Arc<CacheSnapshot>>, Arc<SnapshotDiff>) {
        let published = self.published.read().await;
        (published.snapshot.clone(), Arc::clone(&published.diff))
    }

    /// Events of the current snapshot, empty when nothing was ever fetched.
    pub async fn current_events(&self) -> Vec<CalendarEvent> {
        self.current_snapshot()
            .await
            .map(|snapshot| snapshot.events.clone())
            .unwrap_or_default()
    }

    /// Diff computed by the last successful refresh.
    pub async fn current_diff(&self) -> Arc<SnapshotDiff> {
        Arc::clone(&self.published.read().await.diff)
    }

    pub async fn status(&self) -> RefreshStatus {
        self.status.lock().await.clone()
    }

    /// Runs one refresh cycle.
    ///
    /// Timer and manual triggers do nothing while the current snapshot is
    /// younger than the TTL. A trigger arriving while another refresh is in
    /// flight is rejected.
    ///
    /// On success the new snapshot is persisted (a failed save is only
    /// logged), made current, and the alerts are rebuilt. On failure the
    /// previous snapshot stays current and the error is recorded. A cancelled
    /// refresh changes nothing.
    pub async fn refresh(&self, trigger: RefreshTrigger, cancel: &CancellationToken) -> RefreshOutcome {
        if trigger != RefreshTrigger::Forced {
            let fresh = self
                .current_snapshot()
                .await
                .filter(|snapshot| !snapshot.is_stale(Utc::now(), self.ttl));
            if let Some(snapshot) = fresh {
                debug!(
                    "calendar fetched at {} is still fresh, skipping {} refresh",
                    snapshot.fetched_at, trigger
                );
                return RefreshOutcome::Fresh;
            }
        }

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            info!("refresh already in flight, ignoring {} trigger", trigger);
            return RefreshOutcome::AlreadyRunning;
        };

        let previous_state = self.set_state(RefreshState::Fetching).await;
        info!(
            "refreshing calendar from {} ({})",
            self.fetch_client.source_url(),
            trigger
        );

        let result = self.fetch_events(cancel).await;

        if cancel.is_cancelled() {
            info!("{} refresh cancelled", trigger);
            self.set_state(previous_state).await;
            return RefreshOutcome::Cancelled;
        }

        match result {
            Ok(events) => self.publish(trigger, events).await,
            Err(e) => self.record_failure(trigger, e).await,
        }
    }

    /// Runs the refresh worker until `cancel` fires.
    ///
    /// Refreshes on every tick of `refresh_interval` and on every trigger
    /// received, one at a time.
    pub async fn run(
        self: Arc<Self>,
        refresh_interval: Duration,
        mut triggers: UnboundedReceiver<RefreshTrigger>,
        cancel: CancellationToken,
    ) {
        info!(
            "refreshing calendar every {} seconds",
            refresh_interval.as_secs()
        );
        let mut interval = time::interval(refresh_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let trigger = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(trigger) = triggers.recv() => trigger,
                _ = interval.tick() => RefreshTrigger::Timer,
            };

            self.refresh(trigger, &cancel).await;
        }

        info!("refresh worker stopped");
    }

    async fn fetch_events(&self, cancel: &CancellationToken) -> Result<Vec<CalendarEvent>, RefreshError> {
        let payload = self.fetch_client.fetch(cancel).await?;
        let events = self.normalizer.normalize(&payload)?;
        debug!("normalized {} events", events.len());
        Ok(events)
    }

    async fn publish(&self, trigger: RefreshTrigger, events: Vec<CalendarEvent>) -> RefreshOutcome {
        let previous = self.current_snapshot().await;
        let previous_events = previous
            .as_ref()
            .map(|snapshot| snapshot.events.as_slice())
            .unwrap_or_default();

        let diff = Arc::new(DiffEngine::diff(previous_events, &events));
        let summary = diff.summary();

        let snapshot = Arc::new(CacheSnapshot::new(
            Utc::now(),
            &self.fetch_client.source_url(),
            events,
        ));

        // The in-memory snapshot is still updated when the disk is unavailable
        if let Err(e) = self.cache.save(&snapshot).await {
            error!("failed to persist calendar snapshot: {}", e);
        }

        *self.published.write().await = Published {
            snapshot: Some(Arc::clone(&snapshot)),
            diff: Arc::clone(&diff),
        };

        self.alerts.rebuild(&snapshot.events).await;

        {
            let mut status = self.status.lock().await;
            status.state = RefreshState::Succeeded;
            status.last_error = None;
            status.last_success = Some(snapshot.fetched_at);
        }

        info!("calendar refreshed: {}", summary);

        self.emit(EngineMessage::RefreshCompleted { trigger, snapshot });
        self.emit(EngineMessage::DiffComputed(diff));

        RefreshOutcome::Succeeded(summary)
    }

    async fn record_failure(&self, trigger: RefreshTrigger, error: RefreshError) -> RefreshOutcome {
        warn!(
            "{} refresh failed, keeping the cached calendar: {}",
            trigger, error
        );

        {
            let mut status = self.status.lock().await;
            status.state = RefreshState::FailedUsingCache;
            status.last_error = Some(error.clone());
        }

        self.emit(EngineMessage::RefreshFailed {
            trigger,
            error: error.clone(),
        });

        RefreshOutcome::Failed(error)
    }

    /// Sets the state and returns the previous one.
    async fn set_state(&self, state: RefreshState) -> RefreshState {
        let mut status = self.status.lock().await;
        std::mem::replace(&mut status.state, state)
    }

    fn emit(&self, message: EngineMessage) {
        if self.messages.send(message).is_err() {
            debug!("no receiver for engine messages");
        }
    }
}
