//! Session-scoped ephemeral storage.
//!
//! Lives as long as one [`SessionChannel`](crate::channel::SessionChannel)
//! and is shared by every [`GameSession`](crate::session::GameSession) built
//! on top of it. A session rebuilt from
//! [`GameSession::into_sink`](crate::session::GameSession::into_sink) picks
//! its room id back up from here. Nothing here survives the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Key under which the current room id is stored.
pub const ROOM_ID_KEY: &str = "roomId";

/// A cloneable handle to a small string key/value map.
#[derive(Debug, Clone, Default)]
pub struct SessionStorage {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl SessionStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.with_map(|map| map.get(key).cloned())
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.with_map(|map| {
            map.insert(key, value);
        });
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.with_map(HashMap::clear);
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.with_map(|map| map.is_empty())
    }

    // A poisoned lock only means another holder panicked mid-update; the map
    // itself is still usable.
    fn with_map<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear() {
        let storage = SessionStorage::new();
        assert!(storage.is_empty());
        storage.set(ROOM_ID_KEY, "ABC123");
        assert_eq!(storage.get(ROOM_ID_KEY).as_deref(), Some("ABC123"));
        storage.clear();
        assert!(storage.get(ROOM_ID_KEY).is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn clones_share_contents() {
        let storage = SessionStorage::new();
        let view = storage.clone();
        storage.set(ROOM_ID_KEY, "R1");
        assert_eq!(view.get(ROOM_ID_KEY).as_deref(), Some("R1"));
        view.clear();
        assert!(storage.is_empty());
    }
}
