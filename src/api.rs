//! Read-only HTTP endpoints: health, session lookup and the category list.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::Category;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInfo {
    pub category: Category,
    /// Questions tagged with this category in the loaded bank
    pub question_count: usize,
}

/// Routes under `/api`
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/sessions/{code}", get(get_session))
        .route("/api/categories", get(list_categories))
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.session_count().await,
    })
}

/// Current snapshot of a session.
///
/// GET /api/sessions/{code}
///
/// Lets a reloaded page show the lobby before opening a socket. Never
/// mutates the session and never exposes player tokens.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Response {
    match state.snapshot(&code.to_uppercase()).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, Json(ServerMessage::error(&e))).into_response(),
    }
}

/// GET /api/categories
pub async fn list_categories(State(state): State<Arc<AppState>>) -> Json<Vec<CategoryInfo>> {
    let categories = Category::ALL
        .iter()
        .map(|&category| CategoryInfo {
            category,
            question_count: if category == Category::Mixed {
                state.bank.len()
            } else {
                state.bank.count_in(category)
            },
        })
        .collect();
    Json(categories)
}
