//! Fan-out of element status changes to subscribers.

use berth_core::StatusChange;
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 256;

/// Broadcasts [`StatusChange`]s to any number of subscribers.
///
/// Cloning the publisher shares the channel. Subscribers that fall behind
/// lose the oldest changes.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    sender: broadcast::Sender<StatusChange>,
}

impl StatusPublisher {
    /// Create a publisher buffering up to `capacity` changes per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a change. Having no subscribers is not an error.
    pub fn publish(&self, change: StatusChange) {
        if self.sender.send(change).is_err() {
            debug!("Status change published with no subscribers");
        }
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.sender.subscribe()
    }
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::{ElementId, Status};

    #[tokio::test]
    async fn test_fan_out() {
        let publisher = StatusPublisher::default();
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        publisher.publish(StatusChange::new("step", ElementId::new(), Status::Pending, Status::Starting));

        assert_eq!(first.recv().await.unwrap().to, Status::Starting);
        assert_eq!(second.recv().await.unwrap().from, Status::Pending);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let publisher = StatusPublisher::new(4);
        publisher.publish(StatusChange::new("step", ElementId::new(), Status::Pending, Status::Complete));
    }
}
