//! WebSocket server handler
//!
//! Clients label items and read progress over a JSON channel. Every label
//! change is pushed to all connected clients.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::error::Result;
use crate::models::{ItemView, Stats};
use crate::{AppState, LabelEvent};

/// WebSocket handler
pub async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

type Sender = SplitSink<WebSocket, Message>;

async fn send(sender: &mut Sender, msg: &ServerMessage) -> bool {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to encode message: {}", e);
            return true;
        }
    };
    if let Err(e) = sender.send(Message::Text(text)).await {
        tracing::error!("Failed to send message: {}", e);
        return false;
    }
    true
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.subscribe();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                };

                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => handle_message(&state, client_msg)
                        .await
                        .unwrap_or_else(|e| Some(ServerMessage::Error { message: e.to_string() })),
                    Err(e) => Some(ServerMessage::Error {
                        message: format!("Invalid message: {}", e),
                    }),
                };

                if let Some(reply) = reply {
                    if !send(&mut sender, &reply).await {
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if !send(&mut sender, &ServerMessage::from(event)).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("WebSocket client lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Handle one client message. `None` means the reply arrives as a broadcast.
async fn handle_message(state: &AppState, msg: ClientMessage) -> Result<Option<ServerMessage>> {
    match msg {
        ClientMessage::GetItem { index } => {
            let session = state.session.lock().await;
            Ok(Some(ServerMessage::Item {
                item: session.current_item(index)?,
            }))
        }
        ClientMessage::Progress { participant_id } => {
            let session = state.session.lock().await;
            let stats = match participant_id.as_deref() {
                Some(id) => session.progress_for(id),
                None => session.progress(),
            };
            Ok(Some(ServerMessage::Progress { stats }))
        }
        ClientMessage::ApplyLabel {
            index,
            label,
            participant_id,
        } => {
            let (changed, stats) = {
                let mut session = state.session.lock().await;
                let changed = session.apply_label(index, &label, participant_id.as_deref())?;
                (changed, session.progress())
            };

            if changed {
                state.publish(LabelEvent {
                    index,
                    label,
                    participant_id,
                    stats,
                });
                Ok(None)
            } else {
                Ok(Some(ServerMessage::Progress { stats }))
            }
        }
    }
}

/// Messages from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Set or clear a label
    ApplyLabel {
        index: usize,
        label: String,
        participant_id: Option<String>,
    },
    /// Fetch one item
    GetItem { index: usize },
    /// Fetch label counts, optionally for one participant's range
    Progress { participant_id: Option<String> },
}

/// Messages from server to client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Requested item
    Item { item: ItemView },
    /// A label changed somewhere
    LabelApplied {
        index: usize,
        label: String,
        participant_id: Option<String>,
        stats: Stats,
    },
    /// Current counts
    Progress { stats: Stats },
    /// Error occurred
    Error { message: String },
}

impl From<LabelEvent> for ServerMessage {
    fn from(event: LabelEvent) -> Self {
        ServerMessage::LabelApplied {
            index: event.index,
            label: event.label,
            participant_id: event.participant_id,
            stats: event.stats,
        }
    }
}
