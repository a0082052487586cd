//! Per-identity session store.
//!
//! Owns all persistent mutable state: environment, source history, and
//! multiline capture state, keyed by identity. Sessions are created lazily
//! on first contact and only reset by an explicit clear. Every operation
//! takes the store lock once, so each read-modify-write is atomic per call.
//! Overlapping submissions for one identity are deliberately not
//! serialized; the last successful recording wins.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::{Result, SandboxError};
use crate::multiline::{MultilineEvent, MultilineState};
use crate::sandbox::value::Environment;

/// One user's persistent console state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    environment: Environment,
    source_history: String,
    multiline: MultilineState,
}

/// Store of all sessions, keyed by identity.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_session<T>(&self, identity: &str, f: impl FnOnce(&mut Session) -> T) -> T {
        let mut sessions = self.sessions.lock().expect("session store lock poisoned");
        let session = sessions.entry(identity.to_string()).or_default();
        f(session)
    }

    /// Snapshot the identity's environment, creating the session lazily.
    pub fn snapshot_environment(&self, identity: &str) -> Environment {
        self.with_session(identity, |session| session.environment.clone())
    }

    /// Record a successful execution: replace the environment wholesale and
    /// append the fragment to the source history. This is the only mutator
    /// of either field; failed fragments never reach it.
    pub fn record_success(&self, identity: &str, environment: Environment, fragment: &str) {
        self.with_session(identity, |session| {
            session.environment = environment;
            if !session.source_history.is_empty() {
                session.source_history.push('\n');
            }
            session.source_history.push_str(fragment);
        });
        debug!(identity, "recorded successful fragment");
    }

    /// Reset the identity's environment and history. Multiline capture
    /// state is intentionally left alone.
    pub fn clear(&self, identity: &str) {
        info!(identity, "clearing environment and history");
        self.with_session(identity, |session| {
            session.environment = Environment::new();
            session.source_history.clear();
        });
    }

    /// Merge the donor's environment into the target's; donor values win on
    /// key collisions. Fails if the donor has never started a session.
    pub fn import_environment(&self, target: &str, source: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().expect("session store lock poisoned");
        let donor = sessions
            .get(source)
            .ok_or_else(|| SandboxError::UnknownIdentity(source.to_string()))?
            .environment
            .clone();
        let session = sessions.entry(target.to_string()).or_default();
        session.environment.extend(donor);
        info!(target, source, "imported environment");
        Ok(())
    }

    /// The identity's concatenated source history.
    pub fn history_text(&self, identity: &str) -> String {
        self.with_session(identity, |session| session.source_history.clone())
    }

    /// Handle the multiline marker for this identity.
    pub fn toggle_multiline(&self, identity: &str) -> MultilineEvent {
        self.with_session(identity, |session| session.multiline.toggle())
    }

    /// Buffer a line if the identity is accumulating.
    pub fn push_multiline_line(&self, identity: &str, line: &str) {
        self.with_session(identity, |session| session.multiline.push_line(line));
    }

    /// Whether the identity is currently accumulating a multiline block.
    pub fn is_accumulating(&self, identity: &str) -> bool {
        self.with_session(identity, |session| session.multiline.is_accumulating())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::value::Value;

    fn env(pairs: &[(&str, i64)]) -> Environment {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::Int(*v)))
            .collect()
    }

    #[test]
    fn test_lazy_creation_and_empty_defaults() {
        let store = SessionStore::new();
        assert!(store.snapshot_environment("alice").is_empty());
        assert_eq!(store.history_text("alice"), "");
    }

    #[test]
    fn test_record_success_replaces_and_appends() {
        let store = SessionStore::new();
        store.record_success("alice", env(&[("x", 1)]), "x = 1");
        store.record_success("alice", env(&[("x", 1), ("y", 2)]), "y = 2");

        assert_eq!(
            store.snapshot_environment("alice").get("y"),
            Some(&Value::Int(2))
        );
        assert_eq!(store.history_text("alice"), "x = 1\ny = 2");
    }

    #[test]
    fn test_clear_resets_environment_and_history() {
        let store = SessionStore::new();
        store.record_success("alice", env(&[("x", 1)]), "x = 1");
        store.clear("alice");

        assert!(store.snapshot_environment("alice").is_empty());
        assert_eq!(store.history_text("alice"), "");
    }

    #[test]
    fn test_clear_preserves_multiline_state() {
        let store = SessionStore::new();
        store.toggle_multiline("alice");
        store.push_multiline_line("alice", "x = 1");
        store.clear("alice");

        assert!(store.is_accumulating("alice"));
        assert_eq!(
            store.toggle_multiline("alice"),
            MultilineEvent::Submitted("x = 1\n".to_string())
        );
    }

    #[test]
    fn test_import_environment_donor_wins_collisions() {
        let store = SessionStore::new();
        store.record_success("alice", env(&[("x", 1), ("mine", 7)]), "");
        store.record_success("bob", env(&[("x", 99), ("theirs", 3)]), "");

        store.import_environment("alice", "bob").unwrap();
        let merged = store.snapshot_environment("alice");
        assert_eq!(merged.get("x"), Some(&Value::Int(99)));
        assert_eq!(merged.get("mine"), Some(&Value::Int(7)));
        assert_eq!(merged.get("theirs"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_import_from_unknown_identity_fails() {
        let store = SessionStore::new();
        let err = store.import_environment("alice", "nobody").unwrap_err();
        assert!(matches!(err, SandboxError::UnknownIdentity(_)));
    }

    #[test]
    fn test_sessions_are_independent() {
        let store = SessionStore::new();
        store.record_success("alice", env(&[("x", 1)]), "x = 1");
        assert!(store.snapshot_environment("bob").is_empty());
        assert_eq!(store.history_text("bob"), "");
    }
}
