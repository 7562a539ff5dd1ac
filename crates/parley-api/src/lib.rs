pub mod chat;
pub mod csrf;
pub mod error;
pub mod history;
pub mod state;
pub mod token;

use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Assemble the chatbot API. CSRF double-submit wraps every route but only
/// bites on mutating methods in production.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chatbot/csrf", get(csrf::issue_token))
        .route("/api/chatbot/chat", post(chat::send_chat))
        .route("/api/chatbot/history", get(history::get_history))
        .layer(middleware::from_fn_with_state(state.clone(), csrf::require_csrf))
        .with_state(state)
}
