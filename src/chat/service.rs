//! Ties the key store, quota guard, session registry and chat gateway
//! together for the HTTP handlers.

use std::sync::Arc;

use crate::ai::chat::{ChatGateway, validate_user_text};
use crate::core::ChatError;
use crate::keys::{AuthContext, KeyStore, QuotaGuard};

use super::sessions::SessionRegistry;

#[derive(Debug, Clone)]
pub struct StartedSession {
    pub session_id: String,
    pub greeting: String,
}

pub struct ChatService {
    keys: Arc<KeyStore>,
    quota: QuotaGuard,
    sessions: SessionRegistry,
    // `None` when no model credentials are configured
    gateway: Option<ChatGateway>,
    system_prompt: String,
    greeting: String,
}

impl ChatService {
    pub fn new(
        keys: Arc<KeyStore>,
        gateway: Option<ChatGateway>,
        system_prompt: &str,
        greeting: &str,
        max_sessions: usize,
    ) -> Self {
        Self {
            quota: QuotaGuard::new(Arc::clone(&keys)),
            keys,
            sessions: SessionRegistry::new(max_sessions),
            gateway,
            system_prompt: system_prompt.to_string(),
            greeting: greeting.to_string(),
        }
    }

    pub fn authenticate(&self, key: &str) -> Result<AuthContext, ChatError> {
        AuthContext::resolve(&self.keys, key)
    }

    fn gateway(&self) -> Result<&ChatGateway, ChatError> {
        self.gateway.as_ref().ok_or(ChatError::ModelUnavailable)
    }

    /// Start a new conversation for an authenticated caller. Starting
    /// a session doesn't count against the caller's quota.
    pub fn start_session(&self, auth: &AuthContext) -> Result<StartedSession, ChatError> {
        let gateway = self.gateway()?;
        let session = self.sessions.create(gateway.start(&self.system_prompt));
        tracing::info!(
            "Started chat session {} for user '{}'",
            session.id(),
            auth.record.user_id
        );
        Ok(StartedSession {
            session_id: session.id().to_string(),
            greeting: self.greeting.clone(),
        })
    }

    /// Run one turn of the conversation. A use is reserved before the
    /// model is called and only consumed once it has replied.
    pub async fn send_message(
        &self,
        auth: &AuthContext,
        session_id: &str,
        text: &str,
    ) -> Result<String, ChatError> {
        let gateway = self.gateway()?;
        let session = self.sessions.get(session_id)?;
        let text = validate_user_text(text)?;
        let permit = self.quota.check(&auth.key)?;

        tracing::debug!(
            "Asking {} for session {} (user '{}', {}/{})",
            gateway.model_name(),
            session_id,
            permit.record().user_id,
            permit.record().usage_count,
            permit.record().max_uses
        );

        let reply = {
            let mut transcript = session.transcript().lock().await;
            gateway.send(&mut transcript, text).await
        };

        match reply {
            Ok(reply) => {
                // The key file is synced to disk, keep it off the async workers
                tokio::task::spawn_blocking(move || permit.consume())
                    .await
                    .map_err(|e| ChatError::Persistence(e.to_string()))??;
                Ok(reply)
            }
            Err(e) => {
                tracing::warn!(
                    retryable = e.is_retryable(),
                    "Chat turn failed for session {}: {}",
                    session_id,
                    e
                );
                Err(e)
            }
        }
    }

    pub fn reload_keys(&self) -> Result<usize, ChatError> {
        self.keys.reload()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn model_available(&self) -> bool {
        self.gateway.is_some()
    }
}
