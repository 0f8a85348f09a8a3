use crate::connection::Registry;
use crate::error::{Error, ErrorKind};
use crate::log_sink::{record, LogSink};
use crate::message::OutboundEvent;
use crate::transport::ConnectionTransport;
use events::ConnectionId;
use futures::future::join_all;
use log::*;
use std::sync::Arc;

/// Result of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The connection was gone and has been pruned from the registry.
    Pruned,
    /// Transient failure; the registry is untouched.
    Failed,
}

/// Summary of a `deliver_to_all` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub attempted: usize,
    pub delivered: usize,
    pub pruned: usize,
    pub failed: usize,
}

/// Delivers outbound events to connections, one independent attempt per
/// recipient, pruning the registry when the transport reports a connection
/// as gone.
#[derive(Clone)]
pub struct FanOut {
    registry: Arc<Registry>,
    transport: Arc<dyn ConnectionTransport>,
    sink: Arc<dyn LogSink>,
}

impl FanOut {
    pub fn new(
        registry: Arc<Registry>,
        transport: Arc<dyn ConnectionTransport>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            registry,
            transport,
            sink,
        }
    }

    /// Deliver one event to one connection.
    pub async fn deliver_to_one(
        &self,
        connection_id: &ConnectionId,
        event: &OutboundEvent,
    ) -> Delivery {
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize {} event: {e}", event.event_type());
                return Delivery::Failed;
            }
        };
        self.send_payload(connection_id, &payload).await
    }

    /// Deliver one event to every connection in `targets`.
    ///
    /// `targets` is a snapshot taken by the caller; pruning performed while
    /// delivering does not change who is attempted.
    pub async fn deliver_to_all(
        &self,
        targets: Vec<ConnectionId>,
        event: &OutboundEvent,
    ) -> FanOutReport {
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize {} event: {e}", event.event_type());
                return FanOutReport::default();
            }
        };

        record(
            self.sink.as_ref(),
            &format!("Sending message to all connections: {payload}"),
        );

        let outcomes = join_all(
            targets
                .iter()
                .map(|connection_id| self.send_payload(connection_id, &payload)),
        )
        .await;

        let report = outcomes.iter().fold(
            FanOutReport {
                attempted: targets.len(),
                ..FanOutReport::default()
            },
            |mut report, outcome| {
                match outcome {
                    Delivery::Delivered => report.delivered += 1,
                    Delivery::Pruned => report.pruned += 1,
                    Delivery::Failed => report.failed += 1,
                }
                report
            },
        );

        debug!(
            "Fan-out of {} event: attempted={}, delivered={}, pruned={}, failed={}",
            event.event_type(),
            report.attempted,
            report.delivered,
            report.pruned,
            report.failed
        );

        report
    }

    async fn send_payload(&self, connection_id: &ConnectionId, payload: &str) -> Delivery {
        record(
            self.sink.as_ref(),
            &format!("Attempting to send message to connection {connection_id}: {payload}"),
        );

        let Err(e) = self.transport.send(connection_id, payload).await else {
            return Delivery::Delivered;
        };

        let err = Error::from(e);
        match &err.error_kind {
            ErrorKind::Gone => {
                record(
                    self.sink.as_ref(),
                    &format!("Connection {connection_id} is gone. Removing from registry."),
                );
                self.registry.remove(connection_id);
                info!("Pruned gone connection {connection_id}");
                Delivery::Pruned
            }
            _ => {
                record(
                    self.sink.as_ref(),
                    &format!("Error sending to connection {connection_id}: {err}"),
                );
                warn!("Failed to send event to connection {connection_id}: {err}");
                Delivery::Failed
            }
        }
    }
}
