use axum::http::{HeaderValue, Method};
use log::*;
use service::config::Config;
use service::AppState;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

mod controller;
pub mod router;
mod ws;

/// Bind the configured address and serve until Ctrl-C is received.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(app_state.config.bind_address()).await?;
    serve(listener, app_state, shutdown_signal()).await
}

/// Serve the relay on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    app_state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let cors = cors_layer(&app_state.config);
    let router = router::define_routes(app_state).layer(cors);

    info!("Chat relay listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid allowed origin {origin}: {e}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_origin(origins)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        // Without a signal handler, keep serving rather than exiting immediately.
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
