//! Change notification port.
//!
//! After a mutation commits (and after its hooks ran) one [`ChangeEvent`] per collection
//! and action is handed to the [`Notifier`]. Broadcasting is fire-and-forget.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{error::Error, model::change::ChangeEvent};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn broadcast_change(&self, event: ChangeEvent) -> Result<(), Error>;
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn broadcast_change(&self, _event: ChangeEvent) -> Result<(), Error> {
        Ok(())
    }
}

/// Fans events out to in-process subscribers over a tokio broadcast channel.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<ChangeEvent>,
}

impl BroadcastNotifier {
    /// Creates a new instance of [`BroadcastNotifier`] buffering up to `capacity` events
    /// per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn broadcast_change(&self, event: ChangeEvent) -> Result<(), Error> {
        // no subscribers is not a failure
        if let Err(broadcast::error::SendError(event)) = self.sender.send(event) {
            tracing::trace!(collection = %event.collection, "change event without subscribers");
        }
        Ok(())
    }
}
