use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::models::Transcript;
use crate::core::ChatError;
use crate::gemini::{Content, GenerateContentResponse, Reply, Role};

/// Something that can produce the next model turn for a transcript.
#[async_trait]
pub trait ChatModel {
    async fn generate(
        &self,
        transcript: &Transcript,
        user_turn: &Content,
    ) -> Result<GenerateContentResponse, ChatError>;
    fn name(&self) -> &str;
}

pub type BoxedChatModel = Arc<dyn ChatModel + Send + Sync + 'static>;

/// Reject blank messages before anything is reserved or sent.
pub fn validate_user_text(text: &str) -> Result<&str, ChatError> {
    if text.trim().is_empty() {
        return Err(ChatError::InvalidInput(String::from(
            "The question can't be empty",
        )));
    }
    Ok(text)
}

/// Starts conversations and runs turns against the model.
///
/// Use `ChatGateway::builder()` to construct one.
#[derive(Clone)]
pub struct ChatGateway {
    model: BoxedChatModel,
    timeout: Duration,
}

impl ChatGateway {
    pub fn builder(model: BoxedChatModel) -> ChatGatewayBuilder {
        ChatGatewayBuilder::new(model)
    }

    /// A new conversation with `system_prompt` as the system
    /// instruction. Nothing is sent to the model until the first turn.
    pub fn start(&self, system_prompt: &str) -> Transcript {
        Transcript::new(system_prompt)
    }

    /// Send `user_text` along with the full history and return the
    /// reply text. The transcript is only updated when a reply comes
    /// back, so a failed turn can be retried as-is.
    pub async fn send(
        &self,
        transcript: &mut Transcript,
        user_text: &str,
    ) -> Result<String, ChatError> {
        let user_text = validate_user_text(user_text)?;
        let user_turn = Content::new(Role::User, user_text);

        let resp = tokio::time::timeout(self.timeout, self.model.generate(transcript, &user_turn))
            .await
            .map_err(|_| {
                ChatError::Upstream(format!(
                    "No response from {} after {}s",
                    self.model.name(),
                    self.timeout.as_secs()
                ))
            })??;

        let text = match resp.reply() {
            Reply::Text(text) | Reply::FirstPart(text) => text,
            Reply::NoText {
                finish_reason,
                block_reason,
            } => {
                tracing::warn!(
                    "Empty response from {}. Finish reason: {:?}, block reason: {:?}",
                    self.model.name(),
                    finish_reason,
                    block_reason
                );
                return Err(ChatError::EmptyResponse);
            }
        };

        transcript.push(user_turn);
        transcript.push(Content::new(Role::Model, &text));

        Ok(text)
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }
}

pub struct ChatGatewayBuilder {
    model: BoxedChatModel,
    timeout: Duration,
}

impl ChatGatewayBuilder {
    pub fn new(model: BoxedChatModel) -> Self {
        Self {
            model,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> ChatGateway {
        ChatGateway {
            model: self.model,
            timeout: self.timeout,
        }
    }
}
