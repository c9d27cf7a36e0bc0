//! Router for the chat API

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::post,
};

use super::public;
use crate::api::extract::Auth;
use crate::api::public::ApiError;
use crate::api::routes::SharedState;
use crate::core::ChatError;

/// Start a new chat session for the logged in key
async fn chat_start(
    State(state): State<SharedState>,
    Auth(auth): Auth,
) -> Result<Json<public::ChatStartResponse>, ApiError> {
    let started = state.chat.start_session(&auth)?;
    Ok(Json(public::ChatStartResponse {
        session_id: started.session_id,
        message: started.greeting,
    }))
}

/// Send the next message in a chat session and wait for the full
/// response
async fn chat_send(
    State(state): State<SharedState>,
    Auth(auth): Auth,
    payload: Result<Json<public::ChatRequest>, JsonRejection>,
) -> Result<Json<public::ChatResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| ChatError::InvalidInput(e.body_text()))?;
    let reply = state
        .chat
        .send_message(&auth, &payload.session_id, &payload.pregunta)
        .await?;
    Ok(Json(public::ChatResponse::new(&payload.session_id, &reply)))
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/start", post(chat_start))
        .route("/send", post(chat_send))
}
