use async_trait::async_trait;
use events::ConnectionId;
use std::error::Error as StdError;
use std::fmt;

/// Why a single delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The connection no longer exists and never will again.
    Gone,
    /// Anything else; the connection may still be alive.
    Transient(String),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeliveryError::Gone => write!(f, "connection gone"),
            DeliveryError::Transient(reason) => write!(f, "transient failure: {reason}"),
        }
    }
}

impl StdError for DeliveryError {}

/// Delivers opaque text payloads to a connection.
///
/// Implementations must report `Gone` only when the connection is permanently
/// unreachable; the fan-out engine prunes the registry on that signal.
#[async_trait]
pub trait ConnectionTransport: Send + Sync {
    async fn send(&self, connection_id: &ConnectionId, payload: &str)
        -> Result<(), DeliveryError>;
}
