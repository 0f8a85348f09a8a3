use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use events::{ConnectionEvent, ConnectionId};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use log::*;
use service::AppState;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Upgrades the request to a WebSocket and runs the connection until it closes.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_connection(socket, app_state))
}

/// Drives one client connection.
///
/// - Writer task: owns the socket sink and drains the connection's hub queue
/// - Reader loop: publishes a `Message` event for every inbound frame
///
/// The connection is registered with the hub before `Connect` is published and
/// stays registered until `Disconnect` has been handled.
pub(crate) async fn run_connection(socket: WebSocket, app_state: AppState) {
    let connection_id = ConnectionId::new();
    let (ws_sender, mut ws_receiver) = socket.split();

    let rx = app_state.hub.register(connection_id.clone());
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    info!("WebSocket connection {connection_id} opened");
    app_state
        .event_publisher
        .publish(ConnectionEvent::Connect {
            connection_id: connection_id.clone(),
        })
        .await;

    while let Some(frame) = ws_receiver.next().await {
        let body = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => String::from_utf8_lossy(&data).into_owned(),
            // Axum replies to pings on its own
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(frame)) => {
                debug!("Client {connection_id} initiated close: {frame:?}");
                break;
            }
            Err(e) => {
                warn!("WebSocket receive error on {connection_id}: {e}");
                break;
            }
        };

        app_state
            .event_publisher
            .publish(ConnectionEvent::Message {
                connection_id: connection_id.clone(),
                body,
            })
            .await;
    }

    finish_connection(&app_state, &connection_id, writer_handle).await;
    info!("WebSocket connection {connection_id} closed");
}

/// Publishes `Disconnect` while the connection is still registered with the
/// hub, then tears down its writer and queue. A broadcast racing the close
/// must not see `Gone` and prune the name before the departure is announced.
pub(crate) async fn finish_connection(
    app_state: &AppState,
    connection_id: &ConnectionId,
    writer_handle: JoinHandle<()>,
) {
    app_state
        .event_publisher
        .publish(ConnectionEvent::Disconnect {
            connection_id: connection_id.clone(),
        })
        .await;

    writer_handle.abort();
    app_state.hub.unregister(connection_id);
}

/// Forwards queued payloads to the socket. After a write failure the queue is
/// still drained (and discarded) so it stays open until `finish_connection`
/// unregisters it.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<String>,
) {
    while let Some(payload) = rx.recv().await {
        if let Err(e) = ws_sender.send(Message::Text(payload)).await {
            debug!("WebSocket send failed, discarding further payloads: {e}");
            break;
        }
    }
    while rx.recv().await.is_some() {}
}
