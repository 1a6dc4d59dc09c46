use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::models::{DeviceState, LinkStatus};

/// Event types for WebSocket messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DeviceCreated,
    DeviceDeleted,
    DeviceStateChanged,
    LinkStatusChanged,
    ConsoleOpened,
    ConsoleClosed,
}

/// WebSocket event message
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatePayload {
    pub name: String,
    pub state: DeviceState,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkStatusPayload {
    pub id: String,
    pub source_router: String,
    pub target_router: String,
    pub status: LinkStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsolePayload {
    pub router: String,
    pub port: u16,
}

/// WebSocket hub manages connections and broadcasts events
pub struct Hub {
    tx: broadcast::Sender<String>,
    client_count: Arc<RwLock<usize>>,
}

impl Hub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            tx,
            client_count: Arc::new(RwLock::new(0)),
        }
    }

    /// Broadcast an event to all connected clients
    pub async fn broadcast_event(&self, event: Event) {
        let data = match serde_json::to_string(&event) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("Error serializing WebSocket event: {}", e);
                return;
            }
        };

        let count = *self.client_count.read().await;
        if count > 0 {
            if let Err(e) = self.tx.send(data) {
                tracing::warn!("Error broadcasting WebSocket event: {}", e);
            } else {
                tracing::debug!("Broadcasting {:?} to {} clients", event.event_type, count);
            }
        }
    }

    pub async fn broadcast_device_state(&self, event_type: EventType, name: &str, state: DeviceState) {
        self.broadcast_event(Event {
            event_type,
            payload: serde_json::to_value(DeviceStatePayload {
                name: name.to_string(),
                state,
            })
            .unwrap_or_default(),
        })
        .await;
    }

    pub async fn broadcast_link_status(&self, id: &str, source: &str, target: &str, status: LinkStatus) {
        self.broadcast_event(Event {
            event_type: EventType::LinkStatusChanged,
            payload: serde_json::to_value(LinkStatusPayload {
                id: id.to_string(),
                source_router: source.to_string(),
                target_router: target.to_string(),
                status,
            })
            .unwrap_or_default(),
        })
        .await;
    }

    pub async fn broadcast_console(&self, event_type: EventType, router: &str, port: u16) {
        self.broadcast_event(Event {
            event_type,
            payload: serde_json::to_value(ConsolePayload {
                router: router.to_string(),
                port,
            })
            .unwrap_or_default(),
        })
        .await;
    }

    /// Get the number of connected clients
    pub async fn client_count(&self) -> usize {
        *self.client_count.read().await
    }

    /// Subscribe to events
    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    async fn increment_clients(&self) {
        let mut count = self.client_count.write().await;
        *count += 1;
        tracing::info!("WebSocket client connected. Total clients: {}", *count);
    }

    async fn decrement_clients(&self) {
        let mut count = self.client_count.write().await;
        *count = count.saturating_sub(1);
        tracing::info!("WebSocket client disconnected. Total clients: {}", *count);
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket handler for axum
pub async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (mut sender, mut receiver) = socket.split();

    hub.increment_clients().await;
    let mut rx = hub.subscribe();

    let send_task = tokio::spawn(async move {
        while let Ok(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Inbound messages are ignored; reading keeps the connection alive
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            if msg.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    hub.decrement_clients().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_subscribers_only_when_clients_connected() {
        let hub = Hub::new();
        let mut rx = hub.subscribe();

        hub.broadcast_device_state(EventType::DeviceStateChanged, "r1", DeviceState::Running).await;
        assert!(rx.try_recv().is_err());

        hub.increment_clients().await;
        hub.broadcast_link_status("A-ge0-B-ge0", "A", "B", LinkStatus::Up).await;
        let msg: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(msg["type"], "link_status_changed");
        assert_eq!(msg["payload"]["status"], "up");
        assert_eq!(hub.client_count().await, 1);
    }
}
