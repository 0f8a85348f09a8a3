use config::Config;
use events::EventPublisher;
use log::{debug, info};
use relay::connection::Registry;
use relay::hub::ConnectionHub;
use relay::log_sink::{ConsoleLogSink, FileLogSink, LogSink};
use relay::ChatProtocol;
use std::sync::Arc;

pub mod config;
pub mod logging;

/// Builds the audit log sink selected by the configuration.
pub fn init_log_sink(config: &Config) -> Arc<dyn LogSink> {
    match config.audit_log_dir() {
        Some(dir) => {
            info!("Writing audit log under {}", dir.display());
            Arc::new(FileLogSink::new(dir))
        }
        None => {
            info!("No audit log directory configured, audit lines go to the console");
            Arc::new(ConsoleLogSink)
        }
    }
}

// Service-level state shared by every connection handler.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub registry: Arc<Registry>,
    pub hub: Arc<ConnectionHub>,
    pub event_publisher: EventPublisher,
}

impl AppState {
    /// Create a fresh, empty registry and wire the chat protocol to it.
    /// Nothing survives a restart: every start begins with no members.
    pub fn new(app_config: Config) -> Self {
        let sink = init_log_sink(&app_config);
        Self::with_log_sink(app_config, sink)
    }

    pub fn with_log_sink(app_config: Config, sink: Arc<dyn LogSink>) -> Self {
        let registry = Arc::new(Registry::new());
        let hub = Arc::new(ConnectionHub::new(app_config.outbound_queue_capacity));
        let protocol = Arc::new(ChatProtocol::new(registry.clone(), hub.clone(), sink));
        let event_publisher = EventPublisher::new().with_handler(protocol);
        debug!(
            "Event publisher ready with {} handler(s)",
            event_publisher.handler_count()
        );

        Self {
            config: app_config,
            registry,
            hub,
            event_publisher,
        }
    }
}
