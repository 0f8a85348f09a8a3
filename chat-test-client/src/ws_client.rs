use anyhow::Result;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::*;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Sink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, Clone)]
pub struct Event {
    /// The single top-level key of the relay's JSON object
    pub event_type: String,
    pub data: Value,
}

pub struct Connection {
    pub user_label: String,
    sink: Sink,
    event_rx: mpsc::UnboundedReceiver<Event>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    pub async fn establish(base_url: &str, user_label: String) -> Result<Self> {
        let url = format!("{}/ws", base_url.trim_end_matches('/'));
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (sink, mut source) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        let label = user_label.clone();
        let handle = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        let Ok(data) = serde_json::from_str::<Value>(text.as_str()) else {
                            warn!("Non-JSON frame for {}: {}", label, text.as_str());
                            continue;
                        };
                        let event_type = data
                            .as_object()
                            .and_then(|object| object.keys().next().cloned())
                            .unwrap_or_default();
                        let event = Event { event_type, data };
                        if tx.send(event).is_err() {
                            debug!("Event receiver dropped for {}", label);
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("Server closed the connection for {}", label);
                        break;
                    }
                    Ok(_) => {
                        // Ignore ping/pong and binary frames
                    }
                    Err(e) => {
                        warn!("WebSocket error for {}: {}", label, e);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            user_label,
            sink,
            event_rx: rx,
            _handle: handle,
        })
    }

    pub async fn send_json(&mut self, body: &Value) -> Result<()> {
        self.send_raw(&body.to_string()).await
    }

    pub async fn send_raw(&mut self, body: &str) -> Result<()> {
        self.sink.send(Message::Text(body.to_string().into())).await?;
        Ok(())
    }

    pub async fn close(mut self) -> Result<()> {
        self.sink.close().await?;
        Ok(())
    }

    pub async fn wait_for_event(&mut self, event_type: &str, timeout: Duration) -> Result<Event> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                anyhow::bail!("Timeout waiting for event: {}", event_type);
            }

            match tokio::time::timeout(remaining, self.event_rx.recv()).await {
                Ok(Some(event)) if event.event_type == event_type => {
                    return Ok(event);
                }
                Ok(Some(_)) => {
                    // Wrong event type, keep waiting
                    continue;
                }
                Ok(None) => {
                    anyhow::bail!("WebSocket connection closed");
                }
                Err(_) => {
                    anyhow::bail!("Timeout waiting for event: {}", event_type);
                }
            }
        }
    }

    /// Returns the first event received within `window`, if any.
    pub async fn expect_silence(&mut self, window: Duration) -> Option<Event> {
        tokio::time::timeout(window, self.event_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Discard everything already received.
    pub fn drain(&mut self) {
        while self.event_rx.try_recv().is_ok() {}
    }
}
