//! API routes module

pub mod auth;
pub mod chat;

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};

use crate::api::state::AppState;

pub type SharedState = Arc<AppState>;

async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.chat.session_count(),
        "model_available": state.chat.model_available(),
    }))
}

/// Create the combined router
pub fn router() -> Router<SharedState> {
    Router::new()
        // Chat routes
        .nest("/chat", chat::router())
        // Login and logout
        .merge(auth::router())
        // Usage for the logged in key
        .nest("/api", auth::api_router())
        .route("/health", get(health))
}
