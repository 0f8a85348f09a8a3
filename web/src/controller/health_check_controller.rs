use super::ApiResponse;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use service::AppState;

#[derive(Debug, Serialize)]
pub(crate) struct HealthStatus {
    status: &'static str,
    /// Connections that have set a display name
    members: usize,
    /// Open WebSocket connections, named or not
    open_connections: usize,
}

/// GET the relay's liveness and current occupancy
pub async fn health_check(State(app_state): State<AppState>) -> impl IntoResponse {
    let status = HealthStatus {
        status: "healthy",
        members: app_state.registry.len(),
        open_connections: app_state.hub.open_connections(),
    };

    (
        StatusCode::OK,
        Json(ApiResponse::new(StatusCode::OK.into(), status)),
    )
}
