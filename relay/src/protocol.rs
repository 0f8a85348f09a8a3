use crate::connection::Registry;
use crate::error::{Error, ErrorKind, Result};
use crate::fanout::FanOut;
use crate::log_sink::{record, LogSink};
use crate::message::{Action, OutboundEvent};
use crate::transport::ConnectionTransport;
use async_trait::async_trait;
use events::{ConnectionEvent, ConnectionId, EventHandler};
use log::*;
use std::sync::Arc;

/// Translates connection lifecycle events into registry mutations and
/// fan-out deliveries.
///
/// Per connection the protocol moves through three states: connected but
/// unnamed, named (present in the registry), and gone. Every event is handled
/// in isolation: failures are logged, surfaced to the sender when the client
/// caused them, and never leak out of [`EventHandler::handle`].
pub struct ChatProtocol {
    registry: Arc<Registry>,
    fan_out: FanOut,
    sink: Arc<dyn LogSink>,
}

impl ChatProtocol {
    pub fn new(
        registry: Arc<Registry>,
        transport: Arc<dyn ConnectionTransport>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let fan_out = FanOut::new(registry.clone(), transport, sink.clone());
        Self {
            registry,
            fan_out,
            sink,
        }
    }

    fn record(&self, line: &str) {
        record(self.sink.as_ref(), line);
    }

    async fn connect(&self, connection_id: &ConnectionId) {
        self.record(&format!("Connection established: {connection_id}"));
        debug!("Connection {connection_id} established");
    }

    async fn disconnect(&self, connection_id: &ConnectionId) {
        self.record(&format!("Disconnecting connection {connection_id}"));

        if let Some(name) = self.registry.name_of(connection_id) {
            let remaining: Vec<ConnectionId> = self
                .registry
                .all_connections()
                .into_iter()
                .filter(|target| target != connection_id)
                .collect();
            self.fan_out
                .deliver_to_all(remaining, &OutboundEvent::left(&name))
                .await;

            self.registry.remove(connection_id);
            info!("{name} ({connection_id}) left the chat");

            self.broadcast_members().await;
        }

        self.record(&format!("Connection closed: {connection_id}"));
    }

    async fn handle_message(&self, connection_id: &ConnectionId, body: &str) {
        self.record(&format!("Handling message for connection {connection_id}"));

        if let Err(e) = self.process_message(connection_id, body).await {
            if e.is_user_visible() {
                self.record(&format!("Error processing message: {e}"));
                warn!("Failed to process message from {connection_id}: {e}");
                self.fan_out
                    .deliver_to_one(connection_id, &OutboundEvent::processing_failed())
                    .await;
            } else {
                self.record(&format!("Invalid action in payload: {e}"));
                debug!("Ignoring message from {connection_id}: {e}");
            }
        }
    }

    async fn process_message(&self, connection_id: &ConnectionId, body: &str) -> Result<()> {
        let action = Action::decode(body)?;
        self.record(&format!("Parsed payload: {action:?}"));
        debug!("Dispatching {} from {connection_id}", action.name());

        match action {
            Action::SetName { name } => self.set_name(connection_id, name).await,
            Action::SendPublic { message } => self.send_public(connection_id, &message).await,
            Action::SendPrivate { to, message } => {
                self.send_private(connection_id, &to, &message).await
            }
        }
    }

    async fn set_name(&self, connection_id: &ConnectionId, name: String) -> Result<()> {
        self.registry.set(connection_id, name.clone());
        self.record(&format!("Connection ID {connection_id} set to name: {name}"));
        info!("{name} ({connection_id}) joined the chat");

        self.broadcast_members().await;
        self.fan_out
            .deliver_to_all(self.registry.all_connections(), &OutboundEvent::joined(&name))
            .await;
        Ok(())
    }

    async fn send_public(&self, connection_id: &ConnectionId, message: &str) -> Result<()> {
        let Some(sender) = self.registry.name_of(connection_id) else {
            self.record(&format!(
                "Connection ID {connection_id} not found in registry. Cannot send public message."
            ));
            return Ok(());
        };

        self.fan_out
            .deliver_to_all(
                self.registry.all_connections(),
                &OutboundEvent::public(&sender, message),
            )
            .await;
        Ok(())
    }

    async fn send_private(
        &self,
        connection_id: &ConnectionId,
        to: &str,
        message: &str,
    ) -> Result<()> {
        let Some(recipient) = self.registry.find_connection_by_name(to) else {
            self.record(&format!("User {to} not found for private message."));
            return Ok(());
        };
        let sender = self
            .registry
            .name_of(connection_id)
            .ok_or_else(|| Error::new(ErrorKind::UnregisteredSender))?;

        self.fan_out
            .deliver_to_one(&recipient, &OutboundEvent::private(&sender, message))
            .await;
        Ok(())
    }

    async fn broadcast_members(&self) {
        let event = OutboundEvent::Members(self.registry.all_names());
        self.fan_out
            .deliver_to_all(self.registry.all_connections(), &event)
            .await;
    }
}

#[async_trait]
impl EventHandler for ChatProtocol {
    async fn handle(&self, event: &ConnectionEvent) {
        self.record(&format!("Received event: {event:?}"));
        trace!("{} event for {}", event.event_type(), event.connection_id());

        match event {
            ConnectionEvent::Connect { connection_id } => self.connect(connection_id).await,
            ConnectionEvent::Message {
                connection_id,
                body,
            } => self.handle_message(connection_id, body).await,
            ConnectionEvent::Disconnect { connection_id } => self.disconnect(connection_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::tests::RecordingTransport;
    use crate::log_sink::MemoryLogSink;
    use crate::transport::DeliveryError;
    use serde_json::{json, Value};

    struct Harness {
        protocol: ChatProtocol,
        registry: Arc<Registry>,
        transport: Arc<RecordingTransport>,
        sink: Arc<MemoryLogSink>,
    }

    impl Harness {
        fn new() -> Self {
            let registry = Arc::new(Registry::new());
            let transport = Arc::new(RecordingTransport::default());
            let sink = Arc::new(MemoryLogSink::new());
            let protocol = ChatProtocol::new(registry.clone(), transport.clone(), sink.clone());
            Self {
                protocol,
                registry,
                transport,
                sink,
            }
        }

        async fn connect(&self, conn: &str) {
            self.protocol
                .handle(&ConnectionEvent::Connect {
                    connection_id: id(conn),
                })
                .await;
        }

        async fn disconnect(&self, conn: &str) {
            self.protocol
                .handle(&ConnectionEvent::Disconnect {
                    connection_id: id(conn),
                })
                .await;
        }

        async fn send(&self, conn: &str, body: Value) {
            self.send_raw(conn, &body.to_string()).await;
        }

        async fn send_raw(&self, conn: &str, body: &str) {
            self.protocol
                .handle(&ConnectionEvent::Message {
                    connection_id: id(conn),
                    body: body.to_string(),
                })
                .await;
        }

        async fn set_name(&self, conn: &str, name: &str) {
            self.send(conn, json!({"action": "setName", "name": name}))
                .await;
        }

        fn received(&self, conn: &str) -> Vec<Value> {
            self.transport.received(&id(conn))
        }
    }

    fn id(value: &str) -> ConnectionId {
        ConnectionId::from(value)
    }

    #[tokio::test]
    async fn test_connect_only_logs() {
        let harness = Harness::new();
        harness.connect("a").await;

        assert!(harness.registry.is_empty());
        assert!(harness.transport.attempts().is_empty());
        assert!(harness.sink.contains("Connection established: a"));
    }

    #[tokio::test]
    async fn test_set_name_broadcasts_members_then_join() {
        let harness = Harness::new();
        harness.connect("a").await;
        harness.connect("b").await;
        harness.set_name("a", "alice").await;

        assert_eq!(
            harness.received("a"),
            vec![
                json!({"members": ["alice"]}),
                json!({"systemMessage": "alice has joined the chat"}),
            ]
        );
        // b has not named itself yet, so it is not a broadcast target.
        assert!(harness.received("b").is_empty());

        harness.transport.clear();
        harness.set_name("b", "bob").await;

        for conn in ["a", "b"] {
            assert_eq!(
                harness.received(conn),
                vec![
                    json!({"members": ["alice", "bob"]}),
                    json!({"systemMessage": "bob has joined the chat"}),
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_repeated_set_name_keeps_latest_name_only() {
        let harness = Harness::new();
        harness.set_name("a", "alice").await;
        harness.set_name("a", "alicia").await;
        harness.set_name("a", "ally").await;

        assert_eq!(harness.registry.name_of(&id("a")), Some("ally".to_string()));
        assert_eq!(harness.registry.all_names(), vec!["ally"]);
    }

    #[tokio::test]
    async fn test_public_message_reaches_everyone_including_sender() {
        let harness = Harness::new();
        harness.set_name("a", "alice").await;
        harness.set_name("b", "bob").await;
        harness.transport.clear();

        harness
            .send("a", json!({"action": "sendPublic", "message": "hi"}))
            .await;

        for conn in ["a", "b"] {
            assert_eq!(
                harness.received(conn),
                vec![json!({"publicMessage": "alice: hi"})]
            );
        }
    }

    #[tokio::test]
    async fn test_public_message_from_unnamed_connection_is_dropped_silently() {
        let harness = Harness::new();
        harness.set_name("b", "bob").await;
        harness.transport.clear();

        harness
            .send("x", json!({"action": "sendPublic", "message": "hello?"}))
            .await;

        assert!(harness.transport.attempts().is_empty());
        assert!(harness.sink.contains("Cannot send public message"));
    }

    #[tokio::test]
    async fn test_private_message_reaches_only_the_recipient() {
        let harness = Harness::new();
        harness.set_name("a", "alice").await;
        harness.set_name("b", "bob").await;
        harness.set_name("c", "carol").await;
        harness.transport.clear();

        harness
            .send(
                "a",
                json!({"action": "sendPrivate", "to": "bob", "message": "secret"}),
            )
            .await;

        assert_eq!(
            harness.received("b"),
            vec![json!({"privateMessage": "alice: secret"})]
        );
        assert!(harness.received("a").is_empty());
        assert!(harness.received("c").is_empty());
    }

    #[tokio::test]
    async fn test_private_message_to_duplicate_name_goes_to_first_match() {
        let harness = Harness::new();
        harness.set_name("a", "alice").await;
        harness.set_name("s1", "sam").await;
        harness.set_name("s2", "sam").await;
        harness.transport.clear();

        harness
            .send(
                "a",
                json!({"action": "sendPrivate", "to": "sam", "message": "yo"}),
            )
            .await;

        assert_eq!(harness.received("s1").len(), 1);
        assert!(harness.received("s2").is_empty());
    }

    #[tokio::test]
    async fn test_private_message_to_unknown_name_is_log_only() {
        let harness = Harness::new();
        harness.set_name("a", "alice").await;
        harness.transport.clear();

        harness
            .send(
                "a",
                json!({"action": "sendPrivate", "to": "nobody", "message": "hi"}),
            )
            .await;

        assert!(harness.transport.attempts().is_empty());
        assert!(harness.sink.contains("User nobody not found"));
    }

    #[tokio::test]
    async fn test_private_message_from_unnamed_sender_returns_error() {
        let harness = Harness::new();
        harness.set_name("b", "bob").await;
        harness.transport.clear();

        harness
            .send(
                "x",
                json!({"action": "sendPrivate", "to": "bob", "message": "hi"}),
            )
            .await;

        assert!(harness.received("b").is_empty());
        assert_eq!(
            harness.received("x"),
            vec![json!({"error": "Failed to process message"})]
        );
    }

    #[tokio::test]
    async fn test_malformed_body_replies_with_error_to_sender_only() {
        let harness = Harness::new();
        harness.set_name("a", "alice").await;
        harness.set_name("b", "bob").await;
        harness.transport.clear();

        harness.send_raw("a", "this is not json").await;

        assert_eq!(
            harness.received("a"),
            vec![json!({"error": "Failed to process message"})]
        );
        assert!(harness.received("b").is_empty());
    }

    #[tokio::test]
    async fn test_missing_fields_reply_with_error() {
        let harness = Harness::new();
        harness.send("a", json!({"action": "setName"})).await;

        assert!(harness.registry.is_empty());
        assert_eq!(
            harness.received("a"),
            vec![json!({"error": "Failed to process message"})]
        );
    }

    #[tokio::test]
    async fn test_unrecognized_action_is_log_only() {
        let harness = Harness::new();
        harness.set_name("a", "alice").await;
        harness.transport.clear();

        harness.send("a", json!({"action": "dance"})).await;
        harness.send("a", json!({"message": "no action"})).await;

        assert!(harness.transport.attempts().is_empty());
        assert!(harness.sink.contains("Invalid action in payload"));
    }

    #[tokio::test]
    async fn test_handler_keeps_working_after_a_failure() {
        let harness = Harness::new();
        harness.send_raw("a", "{{{").await;
        harness.set_name("a", "alice").await;

        assert_eq!(harness.registry.all_names(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_disconnect_announces_departure_to_remaining_connections() {
        let harness = Harness::new();
        harness.set_name("a", "alice").await;
        harness.set_name("b", "bob").await;
        harness.transport.clear();

        harness.disconnect("a").await;

        assert!(!harness.registry.all_connections().contains(&id("a")));
        assert!(harness.received("a").is_empty());
        assert_eq!(
            harness.received("b"),
            vec![
                json!({"systemMessage": "alice has left the chat"}),
                json!({"members": ["bob"]}),
            ]
        );
    }

    #[tokio::test]
    async fn test_disconnected_connection_is_absent_from_later_members() {
        let harness = Harness::new();
        harness.set_name("a", "alice").await;
        harness.set_name("b", "bob").await;
        harness.disconnect("a").await;
        harness.transport.clear();

        harness.set_name("c", "carol").await;

        assert_eq!(
            harness.received("b")[0],
            json!({"members": ["bob", "carol"]})
        );
        assert!(harness.received("a").is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_of_unknown_connection_broadcasts_nothing() {
        let harness = Harness::new();
        harness.set_name("b", "bob").await;
        harness.transport.clear();

        harness.disconnect("ghost").await;

        assert!(harness.transport.attempts().is_empty());
        assert_eq!(harness.registry.all_names(), vec!["bob"]);
        assert!(harness.sink.contains("Connection closed: ghost"));
    }

    #[tokio::test]
    async fn test_gone_peer_is_pruned_during_broadcast() {
        let harness = Harness::new();
        harness.set_name("a", "alice").await;
        harness.set_name("b", "bob").await;
        harness.transport.fail_with(&id("b"), DeliveryError::Gone);
        harness.transport.clear();

        harness
            .send("a", json!({"action": "sendPublic", "message": "anyone?"}))
            .await;

        assert_eq!(harness.registry.all_names(), vec!["alice"]);
        assert_eq!(
            harness.received("a"),
            vec![json!({"publicMessage": "alice: anyone?"})]
        );
    }
}
