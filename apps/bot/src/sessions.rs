use std::collections::HashSet;
use std::sync::Mutex;

/// Keyed store of active interactive AI sessions (user id → flag). Owned by
/// `AppState` rather than living as a process global; a restart clears it by
/// construction, matching the intended lifecycle.
#[derive(Debug, Default)]
pub struct SessionStore {
    active: Mutex<HashSet<i64>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a session. Returns false if one was already active.
    pub fn start(&self, user_id: i64) -> bool {
        self.active.lock().expect("session lock").insert(user_id)
    }

    /// Stops a session. Returns false if none was active.
    pub fn stop(&self, user_id: i64) -> bool {
        self.active.lock().expect("session lock").remove(&user_id)
    }

    pub fn is_active(&self, user_id: i64) -> bool {
        self.active.lock().expect("session lock").contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let store = SessionStore::new();
        assert!(!store.is_active(1));

        assert!(store.start(1));
        assert!(!store.start(1));
        assert!(store.is_active(1));
        assert!(!store.is_active(2));

        assert!(store.stop(1));
        assert!(!store.stop(1));
        assert!(!store.is_active(1));
    }
}
