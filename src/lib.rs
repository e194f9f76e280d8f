//! Labeler server - sharded human-in-the-loop image/document labeling

pub mod api;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod ledger;
pub mod models;
pub mod participant;
pub mod partition;
pub mod session;
pub mod store;
pub mod websocket;

use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

use crate::models::Stats;
use crate::session::Session;

/// Broadcast to every connected client after a label changes
#[derive(Debug, Clone, Serialize)]
pub struct LabelEvent {
    pub index: usize,
    pub label: String,
    pub participant_id: Option<String>,
    pub stats: Stats,
}

/// Application state shared across handlers
pub struct AppState {
    /// One lock around the ledger: participants sharing a shard can race
    pub session: Mutex<Session>,
    events: broadcast::Sender<LabelEvent>,
}

impl AppState {
    pub fn new(session: Session) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            session: Mutex::new(session),
            events,
        })
    }

    /// Subscribe to label events
    pub fn subscribe(&self) -> broadcast::Receiver<LabelEvent> {
        self.events.subscribe()
    }

    pub fn publish(&self, event: LabelEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// All HTTP and WebSocket routes
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/categories", get(api::categories))
        .route("/api/items/:index", get(api::get_item))
        .route("/api/labels", post(api::apply_label))
        .route("/api/progress", get(api::progress))
        .route("/api/participants", post(api::register_participant))
        .route("/api/participants/:id", get(api::get_participant))
        .route("/api/participants/:id/navigate", post(api::navigate))
        .route("/api/export", get(api::export))
        .route("/ws", get(websocket::handler))
        .with_state(state)
}
