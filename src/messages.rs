//! Messages sent from the engine workers to the presentation layer.

use std::{fmt, sync::Arc};

use crate::{
    alerts::AlertEntry,
    cache::CacheSnapshot,
    diff::SnapshotDiff,
    refresh::{RefreshError, RefreshTrigger},
};

/// Outbound notification drained by whoever presents the calendar.
#[derive(Debug, Clone)]
pub enum EngineMessage {
    /// A fetch succeeded and `snapshot` is now current.
    RefreshCompleted {
        trigger: RefreshTrigger,
        snapshot: Arc<CacheSnapshot>,
    },
    /// Changes between the previous and the new snapshot.
    DiffComputed(Arc<SnapshotDiff>),
    /// A refresh failed; the previous snapshot, if any, stays current.
    RefreshFailed {
        trigger: RefreshTrigger,
        error: RefreshError,
    },
    /// An alert reached its fire time.
    AlertDue(AlertEntry),
}

impl fmt::Display for EngineMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EngineMessage::RefreshCompleted { trigger, snapshot } => {
                write!(f, "refresh completed ({}): {}", trigger, snapshot)
            }
            EngineMessage::DiffComputed(diff) => write!(f, "calendar diff: {}", diff.summary()),
            EngineMessage::RefreshFailed { trigger, error } => {
                write!(f, "refresh failed ({}): {}", trigger, error)
            }
            EngineMessage::AlertDue(entry) => write!(f, "alert due: {}", entry),
        }
    }
}
