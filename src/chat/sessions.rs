//! In-memory registry of chat sessions.
//!
//! Sessions live for the lifetime of the process but the registry is
//! capped: once `max_sessions` is reached, creating a session evicts
//! the least recently used one, which then looks the same as an id
//! that was never issued.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::ai::chat::Transcript;
use crate::core::ChatError;

pub struct ChatSession {
    id: String,
    // Held for the whole turn so turns within one session are ordered
    transcript: AsyncMutex<Transcript>,
}

impl ChatSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transcript(&self) -> &AsyncMutex<Transcript> {
        &self.transcript
    }
}

pub struct SessionRegistry {
    sessions: Mutex<LruCache<String, Arc<ChatSession>>>,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        let cap = NonZeroUsize::new(max_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Store a new session seeded with `transcript` and return it.
    pub fn create(&self, transcript: Transcript) -> Arc<ChatSession> {
        let mut sessions = self.lock();
        let mut id = Uuid::new_v4().to_string();
        while sessions.contains(&id) {
            id = Uuid::new_v4().to_string();
        }

        let session = Arc::new(ChatSession {
            id: id.clone(),
            transcript: AsyncMutex::new(transcript),
        });
        if let Some((evicted, _)) = sessions.push(id, Arc::clone(&session)) {
            tracing::debug!("Session limit reached, evicted session {}", evicted);
        }
        session
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<ChatSession>, ChatError> {
        self.lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| ChatError::SessionNotFound(session_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Arc<ChatSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn it_creates_distinct_session_ids() {
        let registry = SessionRegistry::new(1000);
        let ids: HashSet<String> = (0..500)
            .map(|_| registry.create(Transcript::new("Sistema")).id().to_string())
            .collect();
        assert_eq!(ids.len(), 500);
        assert_eq!(registry.len(), 500);
    }

    #[test]
    fn it_returns_created_sessions() {
        let registry = SessionRegistry::new(10);
        let session = registry.create(Transcript::new("Sistema"));
        let found = registry.get(session.id()).unwrap();
        assert!(Arc::ptr_eq(&session, &found));
    }

    #[test]
    fn it_rejects_unknown_session_ids() {
        let registry = SessionRegistry::new(10);
        registry.create(Transcript::new("Sistema"));
        for id in ["", "nope", "00000000-0000-0000-0000-000000000000"] {
            assert!(matches!(
                registry.get(id),
                Err(ChatError::SessionNotFound(_))
            ));
        }
    }

    #[test]
    fn it_evicts_the_least_recently_used_session() {
        let registry = SessionRegistry::new(2);
        let first = registry.create(Transcript::new("Sistema"));
        let second = registry.create(Transcript::new("Sistema"));

        // Touch the first so the second becomes the oldest
        registry.get(first.id()).unwrap();
        let third = registry.create(Transcript::new("Sistema"));

        assert_eq!(registry.len(), 2);
        assert!(registry.get(first.id()).is_ok());
        assert!(registry.get(third.id()).is_ok());
        assert!(matches!(
            registry.get(second.id()),
            Err(ChatError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn it_keeps_the_transcript_with_the_session() {
        let registry = SessionRegistry::new(10);
        let session = registry.create(Transcript::new("Eres un asistente."));
        let found = registry.get(session.id()).unwrap();
        let transcript = found.transcript().lock().await;
        assert_eq!(transcript.system_instruction(), "Eres un asistente.");
    }
}
