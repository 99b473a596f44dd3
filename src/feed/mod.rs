//! Calendar feed integration: download, validation and normalization.
//!
//! This module turns the remote economic-calendar feed into validated
//! [`CalendarEvent`] records.
//!
//! # Modules
//!
//! - `requester` - HTTP client performing a single round trip to the feed
//! - `fetch_client` - Retry, backoff, timeout and cancellation around the requester
//! - `response_structs` - Raw records as they appear in the feed payload
//! - `structs` - Normalized events, identity keys and impact levels
//! - `normalizer` - Conversion from raw payload to normalized events
//! - `filters` - Filtering, sorting and grouping helpers for event lists
//!
//! # Examples
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//! use fxnews::feed::{EventNormalizer, FetchClient, HttpFeedRequester, RetryPolicy};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let requester = HttpFeedRequester::new("https://nfs.faireconomy.media/ff_calendar_thisweek.json");
//! let policy = RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(15));
//! let client = FetchClient::new(Arc::new(requester), policy);
//! let cancel = CancellationToken::new();
//! let payload = client.fetch(&cancel).await?;
//! let events = EventNormalizer::new(chrono_tz::America::New_York).normalize(&payload)?;
//! # Ok(())
//! # }
//! ```

mod fetch_client;
mod filters;
mod normalizer;
mod requester;
mod response_structs;
mod structs;

pub use crate::feed::fetch_client::{FetchClient, RetryPolicy};
pub use crate::feed::filters::{EventFilter, group_events_by_day, sort_events};
pub use crate::feed::normalizer::EventNormalizer;
#[cfg(test)]
pub use crate::feed::requester::MockFeedRequester;
pub use crate::feed::requester::{FeedRequester, HttpFeedRequester};
pub use crate::feed::structs::{CalendarEvent, EventKey, EventTime, Impact};
#[cfg(test)]
pub(crate) use crate::feed::structs::tests::clock_event;

use thiserror::Error;

/// Body of a successful feed response, not yet validated.
pub type RawPayload = String;

/// Errors raised while talking to the feed server.
///
/// Transient errors are worth retrying, permanent ones are not.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Timeout, connection failure or server-side (5xx) error.
    #[error("transient network error: {0}")]
    Transient(String),

    /// Client-side (4xx) error or malformed transport response.
    #[error("permanent network error: {0}")]
    Permanent(String),

    /// The fetch was aborted because shutdown was requested.
    #[error("fetch cancelled")]
    Cancelled,
}

impl NetworkError {
    /// Whether the error may go away on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, NetworkError::Transient(_))
    }
}

/// Errors raised when the payload does not have the expected shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("expected a top-level JSON array of events")]
    NotAnArray,

    #[error("event at index {index} is malformed: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("event at index {index} is missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("event at index {index} has an invalid `{field}` value: {value:?}")]
    InvalidField {
        index: usize,
        field: &'static str,
        value: String,
    },
}
