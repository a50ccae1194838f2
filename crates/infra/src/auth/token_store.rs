//! In-memory token cache keyed by session

use std::collections::HashMap;

use parking_lot::RwLock;
use warroom_domain::AccessToken;

/// Process-lifetime token cache
///
/// Nothing is persisted; a restart starts with an empty store.
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: RwLock<HashMap<String, AccessToken>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session: &str) -> Option<AccessToken> {
        self.tokens.read().get(session).cloned()
    }

    /// Store `token` for `session`, returning the token it replaced
    pub fn insert(&self, session: &str, token: AccessToken) -> Option<AccessToken> {
        self.tokens.write().insert(session.to_string(), token)
    }

    pub fn remove(&self, session: &str) -> Option<AccessToken> {
        self.tokens.write().remove(session)
    }

    pub fn clear(&self) {
        self.tokens.write().clear();
    }

    pub fn contains(&self, session: &str) -> bool {
        self.tokens.read().contains_key(session)
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}
