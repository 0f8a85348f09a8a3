//! Error types for the `relay` crate.
//!
//! Follows the layered pattern used across the workspace: a root `Error`
//! struct holding an optional `source` and an `error_kind` enum describing
//! what went wrong. Every kind is contained within the handling of a single
//! event; none of them abort processing of other connections.
use crate::transport::DeliveryError;
use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Categories of failures the relay distinguishes.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// Target connection no longer exists. Triggers registry pruning.
    Gone,
    /// Transport failure that does not indicate permanent loss.
    TransientDelivery(String),
    /// Inbound body failed to parse or is structurally invalid.
    MalformedMessage(String),
    /// Valid object with an unknown or absent `action`.
    UnrecognizedAction(Option<String>),
    /// A message that requires a display name came from an unnamed connection.
    UnregisteredSender,
    /// An outbound event could not be encoded.
    Serialization,
    /// The audit log sink failed to record a line.
    LogSink,
}

impl Error {
    pub fn new(error_kind: ErrorKind) -> Self {
        Error {
            source: None,
            error_kind,
        }
    }

    pub fn with_source(
        error_kind: ErrorKind,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Error {
            source: Some(source.into()),
            error_kind,
        }
    }

    /// Whether this failure should be reported back to the originating
    /// connection as an `error` event.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self.error_kind,
            ErrorKind::MalformedMessage(_) | ErrorKind::UnregisteredSender
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Gone => write!(f, "connection is gone"),
            ErrorKind::TransientDelivery(reason) => {
                write!(f, "transient delivery error: {reason}")
            }
            ErrorKind::MalformedMessage(reason) => write!(f, "malformed message: {reason}"),
            ErrorKind::UnrecognizedAction(Some(action)) => {
                write!(f, "unrecognized action: {action}")
            }
            ErrorKind::UnrecognizedAction(None) => write!(f, "missing action"),
            ErrorKind::UnregisteredSender => write!(f, "sender has not set a name"),
            ErrorKind::Serialization => write!(f, "failed to serialize outbound event"),
            ErrorKind::LogSink => write!(f, "log sink error"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<DeliveryError> for Error {
    fn from(err: DeliveryError) -> Self {
        let error_kind = match &err {
            DeliveryError::Gone => ErrorKind::Gone,
            DeliveryError::Transient(reason) => ErrorKind::TransientDelivery(reason.clone()),
        };
        Error::with_source(error_kind, err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::with_source(ErrorKind::LogSink, err)
    }
}
