//! Per-caller session state: the current project and the request awaiting
//! confirmation. Replaces any process-wide notion of an active project.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use og_intent::ParsedCommand;
use serde::Serialize;
use uuid::Uuid;

/// A gated request that produced a confirmation token and can be replayed
/// with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingRequest {
    pub token: String,
    pub operation: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
    pub targets: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub current_project: Option<String>,
    pub pending: Option<PendingRequest>,
    /// Low-confidence interpretation held until the caller accepts it.
    pub interpretation: Option<ParsedCommand>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Session {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            current_project: None,
            pending: None,
            interpretation: None,
            created_at: now,
            last_active: now,
        }
    }

    pub fn reset(&mut self) {
        self.current_project = None;
        self.pending = None;
        self.interpretation = None;
        self.last_active = Utc::now();
    }
}

#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<String, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the session for `scope`, created on first use.
    pub fn get_or_create(&self, scope: &str) -> Session {
        let mut entry = self.sessions.entry(scope.to_string()).or_insert_with(|| {
            let session = Session::new();
            tracing::debug!(scope, session_id = %session.id, "session created");
            session
        });
        entry.last_active = Utc::now();
        entry.clone()
    }

    pub fn update<R>(&self, scope: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut entry = self
            .sessions
            .entry(scope.to_string())
            .or_insert_with(Session::new);
        entry.last_active = Utc::now();
        f(&mut entry)
    }

    pub fn set_current_project(&self, scope: &str, project: &str) {
        self.update(scope, |s| s.current_project = Some(project.to_string()));
        tracing::info!(scope, project, "current project set");
    }

    pub fn set_pending(&self, scope: &str, pending: Option<PendingRequest>) {
        self.update(scope, |s| s.pending = pending);
    }

    pub fn set_interpretation(&self, scope: &str, parsed: Option<ParsedCommand>) {
        self.update(scope, |s| s.interpretation = parsed);
    }

    pub fn reset(&self, scope: &str) {
        self.update(scope, Session::reset);
        tracing::info!(scope, "session reset");
    }

    /// Drops the session; its current project and pending request go with it.
    pub fn end(&self, scope: &str) {
        if let Some((_, session)) = self.sessions.remove(scope) {
            tracing::info!(scope, session_id = %session.id, "session ended");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_are_isolated() {
        let sessions = SessionManager::new();
        sessions.set_current_project("cli:a", "acme");
        assert_eq!(
            sessions.get_or_create("cli:a").current_project.as_deref(),
            Some("acme")
        );
        assert_eq!(sessions.get_or_create("cli:b").current_project, None);
    }

    #[test]
    fn reset_clears_project_and_pending_but_keeps_identity() {
        let sessions = SessionManager::new();
        let id = sessions.get_or_create("cli").id;
        sessions.set_current_project("cli", "acme");
        sessions.set_pending(
            "cli",
            Some(PendingRequest {
                token: "t".to_string(),
                operation: "export_database".to_string(),
                arguments: serde_json::Map::new(),
                targets: vec!["acme".to_string()],
                expires_at: Utc::now(),
            }),
        );
        sessions.reset("cli");
        let session = sessions.get_or_create("cli");
        assert_eq!(session.id, id);
        assert_eq!(session.current_project, None);
        assert_eq!(session.pending, None);
    }

    #[test]
    fn end_forgets_current_project() {
        let sessions = SessionManager::new();
        let first = sessions.get_or_create("cli").id;
        sessions.set_current_project("cli", "acme");
        sessions.end("cli");
        let session = sessions.get_or_create("cli");
        assert_ne!(session.id, first);
        assert_eq!(session.current_project, None);
    }
}
