//! Destinations for fired alerts.

use log::debug;
use mockall::automock;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::{alerts::AlertEntry, messages::EngineMessage};

/// Errors raised while handing an alert over.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification receiver is gone")]
    Closed,

    #[error("notification failed: {0}")]
    Failed(String),
}

/// Receives alerts when they fire.
///
/// Implementations must return quickly; the scheduler worker calls them inline.
#[automock]
pub trait NotificationSink: Send + Sync {
    fn notify(&self, entry: &AlertEntry) -> Result<(), NotifyError>;
}

/// Sink queuing an [`EngineMessage::AlertDue`] on the engine's outbound channel.
pub struct ChannelSink {
    sender: UnboundedSender<EngineMessage>,
}

impl ChannelSink {
    pub fn new(sender: UnboundedSender<EngineMessage>) -> Self {
        ChannelSink { sender }
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, entry: &AlertEntry) -> Result<(), NotifyError> {
        debug!("queuing alert {}", entry.id);
        self.sender
            .send(EngineMessage::AlertDue(entry.clone()))
            .map_err(|_| NotifyError::Closed)
    }
}
