//! fxnews - An economic calendar watcher with offline cache and timed alerts.
//!
//! This library keeps a local copy of an economic calendar feed up to date
//! and reminds you ahead of the releases you care about. The `fxnews`
//! binary runs it from a YAML configuration file.
//!
//! # Overview
//!
//! fxnews periodically downloads the weekly economic calendar (the Forex
//! Factory JSON feed by default), keeps the last good copy on disk so the
//! calendar stays available offline, reports what changed between two
//! downloads, and fires alerts a configurable number of minutes before each
//! high-impact release.
//!
//! # Features
//!
//! - **Offline Cache**: The last good calendar is restored at startup
//! - **Resilient Refresh**: Timeouts, retries with backoff, and fallback on the cache
//! - **Change Detection**: Added, removed and revised releases after each refresh
//! - **Timed Alerts**: Several reminders per event, with snooze and dismiss
//! - **YAML Configuration**: Simple configuration file format with environment variable support
//!
//! # Configuration
//!
//! Create a `config.yaml` file with your settings (see [`config`] for every key):
//!
//! ```yaml
//! feed:
//!   timezone: "America/New_York"
//!   refresh_interval: 1800
//!
//! alerts:
//!   offsets: [60, 15]
//!   impacts: { high: true, medium: true }
//! ```
//!
//! # Environment Variable Overrides
//!
//! Override any configuration value using environment variables with the `FXNEWS_` prefix:
//!
//! ```bash
//! export FXNEWS_FEED__CACHE_TTL=900
//! export FXNEWS_ALERTS__ENABLED=false
//! ```
//!
//! # Usage
//!
//! ```bash
//! fxnews --config config.yaml --data ./data
//! ```
//!
//! # Architecture
//!
//! - [`feed`] - Feed download, retry policy, normalization and filters
//! - [`cache`] - Snapshot of the last good calendar and its JSON store
//! - [`diff`] - Change detection between two snapshots
//! - [`refresh`] - Refresh cycle and its worker
//! - [`alerts`] - Alert queue, scheduler worker and notification sinks
//! - [`engine`] - Owner of the state and of both workers
//! - [`messages`] - Messages sent to the presentation layer
//! - [`config`] - YAML configuration structures and loading
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (default: `info`)

pub mod alerts;
pub mod cache;
pub mod config;
pub mod diff;
pub mod engine;
pub mod feed;
pub mod messages;
pub mod refresh;
