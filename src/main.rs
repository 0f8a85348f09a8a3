use log::{error, info};
use service::{config::Config, logging::Logger, AppState};

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logger: {e}");
        std::process::exit(1);
    }

    info!(
        "Starting chat relay [{}] with an empty registry",
        config.runtime_env()
    );

    let app_state = AppState::new(config);
    let registry = app_state.registry.clone();

    if let Err(e) = web::init_server(app_state).await {
        error!("Chat relay failed: {e}");
        std::process::exit(1);
    }

    info!(
        "Chat relay stopped, discarding {} registered connection(s)",
        registry.len()
    );
}
