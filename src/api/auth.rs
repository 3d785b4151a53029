//! In-memory bearer-credential store.
//!
//! Token issuance belongs to the backend; this store only holds the
//! credential between login and invalidation. The dispatch layer clears it
//! on any 401 so a stale token is never re-attached.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::chat::ids::UserId;

/// Stored credential: bearer token plus the account it belongs to.
#[derive(Clone, Debug)]
struct Credential {
    token: String,
    user_id: UserId,
}

/// Process-wide credential slot.
#[derive(Debug, Default)]
pub struct TokenStore {
    slot: Mutex<Option<Credential>>,
}

impl TokenStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a credential, replacing any previous one.
    pub fn store(&self, token: impl Into<String>, user_id: UserId) {
        *self.locked() = Some(Credential {
            token: token.into(),
            user_id,
        });
    }

    /// Drop the stored credential.
    pub fn clear(&self) {
        *self.locked() = None;
    }

    /// Current bearer token, if any.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.locked().as_ref().map(|c| c.token.clone())
    }

    /// Account the stored credential belongs to, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.locked().as_ref().map(|c| c.user_id)
    }

    /// Whether a credential is currently stored.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.locked().is_some()
    }

    fn locked(&self) -> MutexGuard<'_, Option<Credential>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_clear() {
        let store = TokenStore::new();
        assert!(!store.is_authenticated());

        store.store("tok-1", UserId::new(7));
        assert!(store.is_authenticated());
        assert_eq!(store.token(), Some("tok-1".to_string()));
        assert_eq!(store.user_id(), Some(UserId::new(7)));

        store.clear();
        assert!(!store.is_authenticated());
        assert_eq!(store.token(), None);
    }

    #[test]
    fn test_last_store_wins() {
        let store = TokenStore::new();
        store.store("tok-1", UserId::new(7));
        store.store("tok-2", UserId::new(8));
        assert_eq!(store.token(), Some("tok-2".to_string()));
        assert_eq!(store.user_id(), Some(UserId::new(8)));
    }
}
