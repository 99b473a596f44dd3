//! Engine tying the calendar refresh and the alert scheduler together.
//!
//! This module provides the [`Engine`] which owns the configuration, the
//! current snapshot and both schedulers. It is the only value the
//! presentation layer talks to.
//!
//! # Architecture
//!
//! The engine runs two concurrent tasks:
//!
//! 1. **Refresh Task**: Ticks every `refresh_interval` seconds and listens for
//!    manual triggers. Each refresh fetches the feed, computes the diff against
//!    the current snapshot, persists the new snapshot and rebuilds the alerts.
//!
//! 2. **Alert Task**: Sleeps until the earliest armed alert and hands due
//!    alerts to the notification sink.
//!
//! Both tasks report to the presentation layer through typed
//! [`EngineMessage`]s and stop when [`Engine::shutdown`] cancels the shared
//! token.
//!
//! # Example
//!
//! ```no_run
//! # use fxnews::{config::Config, engine::Engine};
//! # async fn run() -> Result<(), anyhow::Error> {
//! let config = Config::load("config.yaml")?;
//! let (mut engine, mut messages) = Engine::new(config, "./data")?;
//!
//! engine.bootstrap().await;
//! engine.start();
//!
//! while let Some(message) = messages.recv().await {
//!     println!("{}", message);
//! }
//! # Ok(())
//! # }
//! ```

use std::{path::Path, sync::Arc};

use futures::future::join_all;
use log::{error, info, warn};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    alerts::{AlertEntry, AlertId, AlertScheduler, ChannelSink, SchedulingError, SnoozeOutcome},
    cache::{CachePersistence, CacheSnapshot, JsonCacheStore},
    config::Config,
    diff::SnapshotDiff,
    feed::{
        CalendarEvent, EventFilter, EventNormalizer, FeedRequester, FetchClient,
        HttpFeedRequester,
    },
    messages::EngineMessage,
    refresh::{RefreshScheduler, RefreshStatus, RefreshTrigger},
};

/// Name of the cache file inside the data directory.
pub const CACHE_FILE_NAME: &str = "latest_calendar.json";

/// Owner of the calendar state and of both background workers.
///
/// # Thread Safety
///
/// Queries and commands take `&self` and may be called from any task while
/// the workers run. Only [`Engine::start`] and [`Engine::shutdown`] need
/// exclusive access.
pub struct Engine {
    /// Validated configuration
    config: Config,

    /// Refresh cycle and current snapshot.
    ///
    /// Shared with the refresh task.
    refresher: Arc<RefreshScheduler>,

    /// Alert queue and worker.
    ///
    /// Shared with the alert task and rebuilt by the refresher.
    alerts: Arc<AlertScheduler>,

    /// Durable snapshot storage, read once at bootstrap
    cache: Arc<dyn CachePersistence>,

    /// Stops both workers and any in-flight fetch
    cancel: CancellationToken,

    trigger_sender: UnboundedSender<RefreshTrigger>,
    /// Taken by the refresh task when the engine starts
    trigger_receiver: Option<UnboundedReceiver<RefreshTrigger>>,

    /// Handles of the running workers
    handles: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Creates an engine fetching the configured feed over HTTP and caching
    /// it under `data_path`.
    ///
    /// # Arguments
    ///
    /// * `config` - Configuration, validated again here
    /// * `data_path` - Directory holding the cache file
    ///
    /// # Returns
    ///
    /// The engine and the receiver of its outbound messages.
    ///
    /// # Errors
    ///
    /// Returns a [`SchedulingError`] if the configuration is invalid.
    pub fn new(
        config: Config,
        data_path: impl AsRef<Path>,
    ) -> Result<(Self, UnboundedReceiver<EngineMessage>), SchedulingError> {
        let requester = Arc::new(HttpFeedRequester::new(&config.feed.api_url));
        let cache = Arc::new(JsonCacheStore::new(
            data_path.as_ref().join(CACHE_FILE_NAME),
        ));

        Self::with_collaborators(config, requester, cache)
    }

    /// Creates an engine on top of the given feed requester and cache.
    pub fn with_collaborators(
        config: Config,
        requester: Arc<dyn FeedRequester>,
        cache: Arc<dyn CachePersistence>,
    ) -> Result<(Self, UnboundedReceiver<EngineMessage>), SchedulingError> {
        config.validate()?;

        let (message_sender, message_receiver) = mpsc::unbounded_channel();
        let (trigger_sender, trigger_receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let alerts = Arc::new(AlertScheduler::new(
            config.alerts.settings()?,
            Arc::new(ChannelSink::new(message_sender.clone())),
            cancel.clone(),
        ));

        let refresher = Arc::new(RefreshScheduler::new(
            FetchClient::new(requester, config.feed.retry_policy()),
            EventNormalizer::new(config.feed.timezone()?),
            Arc::clone(&cache),
            Arc::clone(&alerts),
            config.feed.cache_ttl(),
            message_sender,
        ));

        let engine = Engine {
            config,
            refresher,
            alerts,
            cache,
            cancel,
            trigger_sender,
            trigger_receiver: Some(trigger_receiver),
            handles: Vec::new(),
        };

        Ok((engine, message_receiver))
    }

    /// Restores the cached snapshot, or queues a forced refresh when there is none.
    ///
    /// # Returns
    ///
    /// `true` if a cached snapshot was restored.
    pub async fn bootstrap(&self) -> bool {
        match self.cache.load().await {
            Some(snapshot) => {
                self.refresher.restore(snapshot).await;
                true
            }
            None => {
                info!("no usable cached calendar, forcing a refresh");
                self.send_trigger(RefreshTrigger::Forced);
                false
            }
        }
    }

    /// Spawns the refresh and alert workers.
    ///
    /// Calling `start` on a running engine does nothing.
    pub fn start(&mut self) {
        let Some(trigger_receiver) = self.trigger_receiver.take() else {
            warn!("engine already started");
            return;
        };

        let alerts = Arc::clone(&self.alerts);
        self.handles.push(tokio::spawn(alerts.run()));

        let refresher = Arc::clone(&self.refresher);
        self.handles.push(tokio::spawn(refresher.run(
            self.config.feed.refresh_interval(),
            trigger_receiver,
            self.cancel.clone(),
        )));

        info!("engine started");
    }

    /// Cancels both workers and waits for them to stop.
    ///
    /// An in-flight fetch is aborted and no alert is dispatched afterwards.
    pub async fn shutdown(&mut self) {
        info!("shutting down engine");
        self.cancel.cancel();

        for result in join_all(self.handles.drain(..)).await {
            if let Err(e) = result {
                error!("engine worker ended abnormally: {}", e);
            }
        }

        info!("engine stopped");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Events of the current snapshot.
    pub async fn current_events(&self) -> Vec<CalendarEvent> {
        self.refresher.current_events().await
    }

    /// Events of the current snapshot matching `filter`.
    pub async fn filtered_events(&self, filter: &EventFilter) -> Vec<CalendarEvent> {
        filter.apply(&self.refresher.current_events().await)
    }

    pub async fn current_snapshot(&self) -> Option<Arc<CacheSnapshot>> {
        self.refresher.current_snapshot().await
    }

    /// Diff produced by the last successful refresh.
    pub async fn current_diff(&self) -> Arc<SnapshotDiff> {
        self.refresher.current_diff().await
    }

    /// Armed alerts ordered by fire time.
    pub async fn pending_alerts(&self) -> Vec<AlertEntry> {
        self.alerts.pending_alerts().await
    }

    pub async fn refresh_status(&self) -> RefreshStatus {
        self.refresher.status().await
    }

    /// Asks the refresh worker for a refresh; skipped while the cache is fresh.
    pub fn trigger_refresh(&self) {
        self.send_trigger(RefreshTrigger::Manual);
    }

    /// Asks the refresh worker for a refresh regardless of the cache age.
    pub fn force_refresh(&self) {
        self.send_trigger(RefreshTrigger::Forced);
    }

    /// Defers an alert by `minutes`, or by the configured default.
    pub async fn snooze(
        &self,
        id: &AlertId,
        minutes: Option<u32>,
    ) -> Result<SnoozeOutcome, SchedulingError> {
        self.alerts.snooze(id, minutes).await
    }

    /// Silences an alert for good.
    pub async fn dismiss(&self, id: &AlertId) -> Result<(), SchedulingError> {
        self.alerts.dismiss(id).await
    }

    fn send_trigger(&self, trigger: RefreshTrigger) {
        if self.trigger_sender.send(trigger).is_err() {
            warn!("refresh worker is gone, dropping {} trigger", trigger);
        }
    }
}
