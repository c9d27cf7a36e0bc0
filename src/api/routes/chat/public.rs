//! Public types for the chat API
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct ChatStartResponse {
    pub session_id: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ChatRequest {
    pub session_id: String,
    #[serde(alias = "text")]
    pub pregunta: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ChatResponse {
    pub session_id: String,
    pub respuesta: String,
}

impl ChatResponse {
    pub fn new(session_id: &str, respuesta: &str) -> Self {
        Self {
            session_id: session_id.into(),
            respuesta: respuesta.into(),
        }
    }
}
