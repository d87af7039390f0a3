//! WebSocket stream of committed ledger events
//!
//! `GET /ws?since=N` first replays the events committed after operation `N`,
//! then forwards every new event as it is committed. A client that falls
//! behind receives `Lagged` and should refetch from `/api/events`.

use crate::api::handlers::ApiState;
use crate::ledger::{Ledger, LogEntry};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};

/// Events buffered per subscriber before it lags
pub const BROADCAST_CAPACITY: usize = 256;

/// Messages sent to WebSocket clients
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WsEvent {
    /// Sent once on connect, with the ledger sequence at that point
    Connected { sequence: u64 },
    /// A committed ledger event
    Log(LogEntry),
    /// The client missed `missed` events
    Lagged { missed: u64 },
}

/// Fans committed events out to every connected client
#[derive(Debug)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsEvent>,
}

impl WsBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send to all subscribers; a no-op when nobody is connected
    pub fn broadcast(&self, event: WsEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsEvent> {
        self.sender.subscribe()
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub since: Option<u64>,
}

/// Events to replay for a client resuming after `since`, and the sequence
/// they run up to
fn backlog(ledger: &Ledger, since: Option<u64>) -> (Vec<LogEntry>, u64) {
    let replay = since
        .map(|sequence| ledger.events_since(sequence).to_vec())
        .unwrap_or_default();
    (replay, ledger.sequence())
}

/// Whether a live event still needs sending after a replay up to `head`
fn is_fresh(event: &WsEvent, head: u64) -> bool {
    match event {
        WsEvent::Log(entry) => entry.sequence > head,
        _ => true,
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<ApiState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_events(socket, state, query.since))
}

async fn send(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &WsEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => sink.send(Message::Text(json.into())).await,
        Err(e) => {
            log::error!("Failed to serialize WebSocket event: {}", e);
            Ok(())
        }
    }
}

async fn stream_events(socket: WebSocket, state: ApiState, since: Option<u64>) {
    let (mut sink, mut stream) = socket.split();

    // Subscribe before reading the backlog so nothing committed in between is lost
    let mut rx = state.ws_broadcaster.subscribe();
    let (replay, head) = backlog(&*state.ledger.read().await, since);
    log::info!(
        "WebSocket client connected at sequence {} ({} events replayed)",
        head,
        replay.len()
    );

    let mut send_task = tokio::spawn(async move {
        if send(&mut sink, &WsEvent::Connected { sequence: head }).await.is_err() {
            return;
        }
        for entry in replay {
            if send(&mut sink, &WsEvent::Log(entry)).await.is_err() {
                return;
            }
        }

        loop {
            let event = match rx.recv().await {
                Ok(event) if is_fresh(&event, head) => event,
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("WebSocket client lagged, {} events dropped", missed);
                    WsEvent::Lagged { missed }
                }
                Err(RecvError::Closed) => break,
            };
            if send(&mut sink, &event).await.is_err() {
                break;
            }
        }
    });

    // Only closing matters from the client side; axum answers pings itself
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    log::warn!("WebSocket error: {}", e);
                    break;
                }
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    log::info!("WebSocket connection closed");
}
