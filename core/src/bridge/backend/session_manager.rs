//! Enqueue session registry
//! Keeps one long-lived session per destination so LOCK, PUT and UNLOCK
//! issued as separate bridge calls reach the backend in the same context

use dashmap::DashMap;
use std::sync::Arc;

pub struct AffineSessions<S> {
    /// destination id -> session
    sessions: DashMap<String, Arc<S>>,
}

impl<S> AffineSessions<S> {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn get(&self, destination_id: &str) -> Option<Arc<S>> {
        self.sessions.get(destination_id).map(|entry| entry.value().clone())
    }

    /// Register a freshly created session. If another call registered one for
    /// the same destination in the meantime, that one is kept and returned.
    pub fn insert_or_existing(&self, destination_id: &str, session: Arc<S>) -> Arc<S> {
        self.sessions
            .entry(destination_id.to_string())
            .or_insert(session)
            .value()
            .clone()
    }

    /// Remove the session only if it is still the one registered
    pub fn remove_if_same(&self, destination_id: &str, session: &Arc<S>) -> bool {
        self.sessions
            .remove_if(destination_id, |_, current| Arc::ptr_eq(current, session))
            .is_some()
    }

    /// Drop every session, returning how many were held
    pub fn clear(&self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<S> Default for AffineSessions<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_registration_wins() {
        let sessions = AffineSessions::new();
        let first = sessions.insert_or_existing("DEV", Arc::new("first"));
        let second = sessions.insert_or_existing("DEV", Arc::new("second"));

        assert_eq!(*first, "first");
        assert_eq!(*second, "first");
        assert_eq!(sessions.len(), 1);
        assert!(Arc::ptr_eq(&sessions.get("DEV").unwrap(), &first));
    }

    #[test]
    fn test_sessions_are_per_destination() {
        let sessions = AffineSessions::new();
        sessions.insert_or_existing("DEV", Arc::new(1));
        sessions.insert_or_existing("QAS", Arc::new(2));

        assert_eq!(*sessions.get("QAS").unwrap(), 2);
        assert!(sessions.get("PRD").is_none());

        assert_eq!(sessions.clear(), 2);
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_remove_only_the_registered_session() {
        let sessions = AffineSessions::new();
        let stale = sessions.insert_or_existing("DEV", Arc::new("stale"));
        assert!(sessions.remove_if_same("DEV", &stale));
        assert!(!sessions.remove_if_same("DEV", &stale));

        let fresh = sessions.insert_or_existing("DEV", Arc::new("fresh"));
        assert!(!sessions.remove_if_same("DEV", &stale));
        assert!(Arc::ptr_eq(&sessions.get("DEV").unwrap(), &fresh));
    }
}
