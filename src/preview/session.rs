//! Preview session: an immutable snapshot plus a log of pending mutations.
//!
//! Handlers mutate the session through the log; the log is flushed onto the
//! response exactly once by [`PreviewSession::commit`].

use serde::{Deserialize, Serialize};

use crate::domain::perspective::ClientPerspective;

use super::cookie::{CookieError, SessionCookie};

/// Persisted session fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(rename = "projectId", default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perspective: Option<ClientPerspective>,
}

impl SessionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.project_id.is_none() && self.perspective.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionField {
    ProjectId,
    Perspective,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMutation {
    SetProjectId(String),
    SetPerspective(ClientPerspective),
    Unset(SessionField),
    Destroy,
}

/// What committing a session asks the response to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommit {
    /// Write the re-signed session.
    Write(String),
    /// Remove the session cookie.
    Clear(String),
}

impl SessionCommit {
    pub fn set_cookie(&self) -> &str {
        match self {
            SessionCommit::Write(value) | SessionCommit::Clear(value) => value,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PreviewSession {
    loaded: SessionSnapshot,
    current: SessionSnapshot,
    log: Vec<SessionMutation>,
}

impl PreviewSession {
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            current: snapshot.clone(),
            loaded: snapshot,
            log: Vec::new(),
        }
    }

    /// Snapshot as it arrived with the request.
    pub fn loaded(&self) -> &SessionSnapshot {
        &self.loaded
    }

    /// Snapshot with pending mutations applied.
    pub fn current(&self) -> &SessionSnapshot {
        &self.current
    }

    pub fn project_id(&self) -> Option<&str> {
        self.current.project_id.as_deref()
    }

    pub fn perspective(&self) -> Option<&ClientPerspective> {
        self.current.perspective.as_ref()
    }

    pub fn has(&self, field: SessionField) -> bool {
        match field {
            SessionField::ProjectId => self.current.project_id.is_some(),
            SessionField::Perspective => self.current.perspective.is_some(),
        }
    }

    pub fn set_project_id(&mut self, project_id: impl Into<String>) {
        let project_id = project_id.into();
        self.current.project_id = Some(project_id.clone());
        self.log.push(SessionMutation::SetProjectId(project_id));
    }

    pub fn set_perspective(&mut self, perspective: ClientPerspective) {
        self.current.perspective = Some(perspective.clone());
        self.log.push(SessionMutation::SetPerspective(perspective));
    }

    pub fn unset(&mut self, field: SessionField) {
        match field {
            SessionField::ProjectId => self.current.project_id = None,
            SessionField::Perspective => self.current.perspective = None,
        }
        self.log.push(SessionMutation::Unset(field));
    }

    /// Drop every field and remove the cookie on commit.
    pub fn destroy(&mut self) {
        self.current = SessionSnapshot::default();
        self.log.push(SessionMutation::Destroy);
    }

    pub fn is_pending(&self) -> bool {
        !self.log.is_empty()
    }

    pub fn mutations(&self) -> &[SessionMutation] {
        &self.log
    }

    /// Flush the mutation log. Returns `None` when nothing changed.
    pub fn commit(&mut self, cookie: &SessionCookie) -> Result<Option<SessionCommit>, CookieError> {
        if self.log.is_empty() {
            return Ok(None);
        }

        let destroyed = self.log.contains(&SessionMutation::Destroy);
        let commit = if destroyed && self.current.is_empty() {
            SessionCommit::Clear(cookie.clear())
        } else {
            SessionCommit::Write(cookie.encode(&self.current)?)
        };

        self.log.clear();
        self.loaded = self.current.clone();
        Ok(Some(commit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::cookie::{CookieSettings, SameSite};

    fn cookie() -> SessionCookie {
        SessionCookie::new(CookieSettings {
            name: "__preview".into(),
            secrets: vec!["s3cret".into()],
            path: "/".into(),
            http_only: true,
            secure: false,
            same_site: SameSite::Lax,
            max_age: None,
        })
        .unwrap()
    }

    #[test]
    fn untouched_session_commits_nothing() {
        let mut session = PreviewSession::from_snapshot(SessionSnapshot {
            project_id: Some("p1".into()),
            perspective: None,
        });
        assert!(!session.is_pending());
        assert_eq!(session.commit(&cookie()).unwrap(), None);
    }

    #[test]
    fn mutations_are_pending_until_commit() {
        let mut session = PreviewSession::default();
        session.set_project_id("p1");
        session.set_perspective(ClientPerspective::Drafts);

        assert!(session.is_pending());
        assert_eq!(session.loaded(), &SessionSnapshot::default());
        assert_eq!(session.project_id(), Some("p1"));
        assert_eq!(session.mutations().len(), 2);

        let commit = session.commit(&cookie()).unwrap().unwrap();
        assert!(matches!(commit, SessionCommit::Write(_)));
        assert!(!session.is_pending());
        assert_eq!(session.loaded().project_id.as_deref(), Some("p1"));
    }

    #[test]
    fn destroy_clears_cookie() {
        let mut session = PreviewSession::from_snapshot(SessionSnapshot {
            project_id: Some("p1".into()),
            perspective: Some(ClientPerspective::Drafts),
        });
        session.destroy();
        assert!(!session.has(SessionField::ProjectId));

        let commit = session.commit(&cookie()).unwrap().unwrap();
        match commit {
            SessionCommit::Clear(value) => assert!(value.contains("Max-Age=0")),
            other => panic!("expected clear, got {other:?}"),
        }
    }

    #[test]
    fn set_after_destroy_writes_new_session() {
        let mut session = PreviewSession::default();
        session.destroy();
        session.set_project_id("p2");
        let commit = session.commit(&cookie()).unwrap().unwrap();
        assert!(matches!(commit, SessionCommit::Write(_)));
    }

    #[test]
    fn unset_removes_single_field() {
        let mut session = PreviewSession::from_snapshot(SessionSnapshot {
            project_id: Some("p1".into()),
            perspective: Some(ClientPerspective::Drafts),
        });
        session.unset(SessionField::Perspective);
        assert!(session.has(SessionField::ProjectId));
        assert!(!session.has(SessionField::Perspective));
    }
}
