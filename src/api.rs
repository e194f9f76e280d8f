//! HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::export;
use crate::models::{
    ApplyLabelRequest, Category, ExportQuery, ItemView, NavigateRequest, ProgressQuery,
    RegisterParticipantRequest, Stats,
};
use crate::participant::Participant;
use crate::{AppState, LabelEvent};

pub async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
pub struct CategoryView {
    pub tag: &'static str,
    pub shortcut: u8,
}

/// GET /api/categories
pub async fn categories() -> Json<Vec<CategoryView>> {
    Json(
        Category::ALL
            .iter()
            .map(|c| CategoryView {
                tag: c.as_str(),
                shortcut: c.shortcut(),
            })
            .collect(),
    )
}

/// GET /api/items/:index
pub async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<Json<ItemView>> {
    let session = state.session.lock().await;
    Ok(Json(session.current_item(index)?))
}

#[derive(Debug, Serialize)]
pub struct ApplyLabelResponse {
    pub status: &'static str,
    pub changed: bool,
    pub stats: Stats,
}

/// POST /api/labels
pub async fn apply_label(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ApplyLabelRequest>,
) -> Result<Json<ApplyLabelResponse>> {
    let label = match (req.label, req.shortcut) {
        (Some(label), _) => Some(label),
        (None, Some(digit)) => Some(
            Category::from_shortcut(digit)
                .map(String::from)
                .ok_or_else(|| AppError::BadRequest(format!("no category on shortcut {}", digit)))?,
        ),
        (None, None) => None,
    };
    let (index, label) = match (req.index, label) {
        (Some(index), Some(label)) => (index, label),
        _ => return Err(AppError::BadRequest("index and label are required".into())),
    };

    let (changed, stats) = {
        let mut session = state.session.lock().await;
        let changed = session.apply_label(index, &label, req.participant_id.as_deref())?;
        (changed, session.progress())
    };

    if changed {
        state.publish(LabelEvent {
            index,
            label,
            participant_id: req.participant_id,
            stats: stats.clone(),
        });
    }

    Ok(Json(ApplyLabelResponse {
        status: "ok",
        changed,
        stats,
    }))
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    #[serde(flatten)]
    pub stats: Stats,
    pub completion: f64,
}

impl From<Stats> for ProgressResponse {
    fn from(stats: Stats) -> Self {
        let completion = stats.completion();
        Self { stats, completion }
    }
}

/// GET /api/progress
pub async fn progress(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProgressQuery>,
) -> Json<ProgressResponse> {
    let session = state.session.lock().await;
    let stats = match query.participant_id.as_deref() {
        Some(id) => session.progress_for(id),
        None => session.progress(),
    };
    Json(stats.into())
}

/// POST /api/participants
pub async fn register_participant(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterParticipantRequest>,
) -> Result<Json<Participant>> {
    let id = match req.id {
        Some(id) if id.trim().is_empty() => {
            return Err(AppError::BadRequest("participant id must not be blank".into()))
        }
        other => other,
    };
    let mut session = state.session.lock().await;
    Ok(Json(session.join(id, Utc::now())))
}

/// GET /api/participants/:id
pub async fn get_participant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Participant>> {
    let session = state.session.lock().await;
    Ok(Json(session.participant(&id)?.clone()))
}

/// POST /api/participants/:id/navigate
pub async fn navigate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<NavigateRequest>,
) -> Result<Json<ItemView>> {
    let mut session = state.session.lock().await;
    Ok(Json(session.navigate(&id, req.action, req.index)?))
}

/// GET /api/export
///
/// Returns the records as a `labels.json` attachment.
pub async fn export(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<Response> {
    let records = {
        let session = state.session.lock().await;
        session.export_snapshot(query.scope, query.participant_id.as_deref(), Utc::now())?
    };
    let body = export::to_json(&records)?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/json; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"labels.json\"",
            ),
        ],
        body,
    )
        .into_response())
}
