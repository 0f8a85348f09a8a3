use crate::transport::{ConnectionTransport, DeliveryError};
use async_trait::async_trait;
use dashmap::DashMap;
use events::ConnectionId;
use log::*;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Default number of outbound payloads buffered per connection.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Channel-backed connection transport.
///
/// Each live socket registers a bounded queue; a writer task owned by the
/// socket drains it. Sending never blocks: an unknown id or a closed queue
/// means the connection is gone, a full queue is a transient failure.
pub struct ConnectionHub {
    senders: DashMap<ConnectionId, mpsc::Sender<String>>,
    capacity: usize,
}

impl ConnectionHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            senders: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a new connection and return the receiving end of its queue.
    pub fn register(&self, connection_id: ConnectionId) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.senders.insert(connection_id, tx);
        debug!("Connection registered with hub ({} open)", self.senders.len());
        rx
    }

    pub fn unregister(&self, connection_id: &ConnectionId) {
        if self.senders.remove(connection_id).is_some() {
            debug!("Connection {connection_id} unregistered from hub");
        }
    }

    pub fn open_connections(&self) -> usize {
        self.senders.len()
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[async_trait]
impl ConnectionTransport for ConnectionHub {
    async fn send(
        &self,
        connection_id: &ConnectionId,
        payload: &str,
    ) -> Result<(), DeliveryError> {
        // Clone the sender so no map shard lock is held while sending.
        let sender = self
            .senders
            .get(connection_id)
            .map(|entry| entry.value().clone())
            .ok_or(DeliveryError::Gone)?;

        match sender.try_send(payload.to_string()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeliveryError::Transient(format!(
                "outbound queue for {connection_id} is full"
            ))),
            Err(TrySendError::Closed(_)) => {
                self.senders.remove(connection_id);
                Err(DeliveryError::Gone)
            }
        }
    }
}
