//! Chat relay core: the connection registry and message fan-out protocol.
//!
//! Clients connect over a persistent channel, register a display name and
//! exchange public (broadcast) and private (directed) text messages. This
//! crate owns everything with state-machine or consistency concerns; the
//! transport that carries bytes and the durable audit log are injected as
//! traits.
//!
//! # Architecture
//!
//! - **Registry**: which live connections map to which display names. Held
//!   behind an `Arc` created once at service start. It is not persisted: a
//!   restarted process starts with an empty registry.
//! - **FanOut**: delivers one outbound event to a snapshot of recipients,
//!   each attempt independent of the others, pruning the registry when the
//!   transport reports a connection as gone.
//! - **ChatProtocol**: the `EventHandler` that turns CONNECT / MESSAGE /
//!   DISCONNECT events into registry mutations and fan-outs.
//!
//! # Message Flow
//!
//! 1. Transport publishes a `ConnectionEvent`
//! 2. `ChatProtocol` decodes the body into an `Action` (once, at the boundary)
//! 3. Registry is mutated and/or recipients are computed
//! 4. `FanOut` serializes the `OutboundEvent` and sends it through the
//!    `ConnectionTransport`
//! 5. Every step is recorded to the `LogSink`, whose failures are discarded
//!
//! # Example: wiring the protocol
//!
//! ```rust,ignore
//! use relay::{connection::Registry, log_sink::ConsoleLogSink, protocol::ChatProtocol};
//!
//! let registry = Arc::new(Registry::new());
//! let protocol = ChatProtocol::new(registry, transport, Arc::new(ConsoleLogSink));
//! protocol.handle(&ConnectionEvent::Connect { connection_id }).await;
//! ```
//!
//! # Modules
//!
//! - `connection`: Registry of connections and display names
//! - `error`: Error type and kinds
//! - `fanout`: Per-recipient delivery and registry self-healing
//! - `hub`: Channel-backed `ConnectionTransport` used by the WebSocket layer
//! - `log_sink`: Audit log sink trait and implementations
//! - `message`: Inbound actions and outbound events
//! - `protocol`: The chat state machine
//! - `transport`: Connection transport trait

pub mod connection;
pub mod error;
pub mod fanout;
pub mod hub;
pub mod log_sink;
pub mod message;
pub mod protocol;
pub mod transport;

pub use protocol::ChatProtocol;
