//! Error taxonomy shared by the key store, quota guard, session
//! registry and chat gateway. The HTTP surface maps each variant to a
//! status code in `api::public`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    /// Bad or missing startup files. Prevents the server from starting.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing or invalid access key")]
    Unauthorized,

    #[error("Usage limit reached ({usage_count}/{max_uses})")]
    QuotaExceeded { usage_count: u32, max_uses: u32 },

    #[error("Chat session with ID '{0}' not found")]
    SessionNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Error communicating with the model: {0}")]
    Upstream(String),

    #[error("The model returned an empty response")]
    EmptyResponse,

    /// The in-memory key map and the key file may have diverged.
    #[error("Failed to persist key store: {0}")]
    Persistence(String),

    #[error("The model is not available")]
    ModelUnavailable,
}

impl ChatError {
    /// Transient errors that are safe to retry with the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Upstream(_) | ChatError::EmptyResponse)
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::Upstream(String::from("request to the model timed out"))
        } else {
            ChatError::Upstream(err.to_string())
        }
    }
}
