//! Connection lifecycle events for the chat relay.
//!
//! This crate provides the event system that decouples the transport layer
//! (which accepts WebSocket connections) from the protocol layer (which owns
//! the registry and fan-out).
//!
//! # Architecture
//!
//! - **ConnectionId**: Opaque, transport-assigned identifier of a live connection
//! - **ConnectionEvent**: Enum of every inbound lifecycle/message event
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates, avoiding circular
//! dependencies between `relay`, `service` and `web`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque identifier for a live connection. The core never interprets it,
/// it only stores it as a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh identifier (UUID v4).
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inbound events delivered by the connection transport.
/// Each event is handled independently of every other event.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A client opened a connection. Carries no payload.
    Connect { connection_id: ConnectionId },
    /// A client sent a text frame. The body is still undecoded JSON.
    Message {
        connection_id: ConnectionId,
        body: String,
    },
    /// The connection closed (client close, socket error or stream end).
    Disconnect { connection_id: ConnectionId },
}

impl ConnectionEvent {
    pub fn connection_id(&self) -> &ConnectionId {
        match self {
            ConnectionEvent::Connect { connection_id }
            | ConnectionEvent::Message { connection_id, .. }
            | ConnectionEvent::Disconnect { connection_id } => connection_id,
        }
    }

    /// Short name of the event type, used in log lines.
    pub fn event_type(&self) -> &'static str {
        match self {
            ConnectionEvent::Connect { .. } => "CONNECT",
            ConnectionEvent::Message { .. } => "MESSAGE",
            ConnectionEvent::Disconnect { .. } => "DISCONNECT",
        }
    }
}

/// Trait for handling connection events.
/// Implementations must never panic or propagate failures: every event is
/// handled on its own and later events must still be processed.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &ConnectionEvent);
}

/// Publishes connection events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers.
    pub async fn publish(&self, event: ConnectionEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
