//! # Session Store Module
//!
//! Per-user state kept for the lifetime of the process: generation counters
//! and the last prompt. The transformation workflow state lives in the chat
//! dialogue (see [`crate::transform::TransformDialogue`]).

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Counters tracked per user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    ImagesGenerated,
    ImagesTransformed,
    ImagesUploaded,
}

/// State of a single user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub images_generated: u64,
    pub images_transformed: u64,
    pub images_uploaded: u64,
    pub last_prompt: Option<String>,
}

impl UserSession {
    pub fn counter(&self, counter: Counter) -> u64 {
        match counter {
            Counter::ImagesGenerated => self.images_generated,
            Counter::ImagesTransformed => self.images_transformed,
            Counter::ImagesUploaded => self.images_uploaded,
        }
    }

    fn counter_mut(&mut self, counter: Counter) -> &mut u64 {
        match counter {
            Counter::ImagesGenerated => &mut self.images_generated,
            Counter::ImagesTransformed => &mut self.images_transformed,
            Counter::ImagesUploaded => &mut self.images_uploaded,
        }
    }
}

/// Storage for user sessions, injected into the service layer
///
/// Sessions are created lazily: `get` on an unknown user returns a default
/// session. Writes are last-write-wins.
pub trait SessionStore: Send + Sync {
    fn get(&self, user_id: u64) -> UserSession;

    fn set(&self, user_id: u64, session: UserSession);

    /// Add one to `counter` and return the new value
    fn increment(&self, user_id: u64, counter: Counter) -> u64;
}

/// Mutex-guarded in-memory session table keyed by user id
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<u64, UserSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, UserSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, user_id: u64) -> UserSession {
        self.lock().get(&user_id).cloned().unwrap_or_default()
    }

    fn set(&self, user_id: u64, session: UserSession) {
        self.lock().insert(user_id, session);
    }

    fn increment(&self, user_id: u64, counter: Counter) -> u64 {
        let mut sessions = self.lock();
        let value = sessions.entry(user_id).or_default().counter_mut(counter);
        *value += 1;
        *value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_user_gets_default_session() {
        let store = InMemorySessionStore::new();
        let session = store.get(42);
        assert_eq!(session, UserSession::default());
        // get alone does not create an entry
        assert!(store.is_empty());
    }

    #[test]
    fn test_increment_is_per_counter() {
        let store = InMemorySessionStore::new();
        assert_eq!(store.increment(1, Counter::ImagesGenerated), 1);
        assert_eq!(store.increment(1, Counter::ImagesGenerated), 2);
        assert_eq!(store.increment(1, Counter::ImagesUploaded), 1);

        let session = store.get(1);
        assert_eq!(session.images_generated, 2);
        assert_eq!(session.images_uploaded, 1);
        assert_eq!(session.images_transformed, 0);
        assert_eq!(store.get(2).images_generated, 0);
    }

    #[test]
    fn test_set_overwrites() {
        let store = InMemorySessionStore::new();
        let mut session = store.get(7);
        session.last_prompt = Some("a red fox".to_string());
        session.images_uploaded = 3;
        store.set(7, session.clone());
        assert_eq!(store.get(7), session);

        store.set(7, UserSession::default());
        assert_eq!(store.get(7).last_prompt, None);
    }
}
