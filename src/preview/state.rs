//! Preview enablement and the transitions that change it.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    content::{ClientOverrides, ContentClient, SecretToken},
    domain::{
        api_version::ApiVersion,
        perspective::{ClientPerspective, DEFAULT_PREVIEW_PERSPECTIVE},
    },
};

use super::session::{PreviewSession, SessionField, SessionSnapshot};

const SOURCE: &str = "vitrine::preview::state";
const METRIC_TRANSITION: &str = "vitrine_preview_transition_total";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewState {
    Disabled,
    Enabled(ClientPerspective),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("preview mode is not enabled")]
    NotEnabled,
    #[error("session belongs to another project")]
    ProjectMismatch,
}

/// Preview state derived for one request. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewContext {
    state: PreviewState,
}

impl PreviewContext {
    /// Enabled only when the session was issued for `project_id`.
    pub fn resolve(snapshot: &SessionSnapshot, project_id: &str) -> Self {
        let state = match snapshot.project_id.as_deref() {
            Some(session_project) if session_project == project_id => PreviewState::Enabled(
                snapshot
                    .perspective
                    .clone()
                    .unwrap_or(DEFAULT_PREVIEW_PERSPECTIVE),
            ),
            _ => PreviewState::Disabled,
        };
        Self { state }
    }

    pub fn disabled() -> Self {
        Self {
            state: PreviewState::Disabled,
        }
    }

    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.state, PreviewState::Enabled(_))
    }

    /// Perspective content reads use under this context.
    pub fn perspective(&self) -> ClientPerspective {
        match &self.state {
            PreviewState::Enabled(perspective) => perspective.clone(),
            PreviewState::Disabled => ClientPerspective::Published,
        }
    }

    /// Client content reads go through for this request.
    ///
    /// Enabled contexts bypass the CDN, read the session perspective and
    /// authenticate with the preview token. Disabled contexts keep `base`.
    pub fn configure_client(
        &self,
        base: &Arc<dyn ContentClient>,
        preview_token: Option<&SecretToken>,
    ) -> Arc<dyn ContentClient> {
        match &self.state {
            PreviewState::Disabled => Arc::clone(base),
            PreviewState::Enabled(perspective) => base.with_config(ClientOverrides {
                use_cdn: Some(false),
                perspective: Some(perspective.clone()),
                token: preview_token.cloned(),
            }),
        }
    }
}

/// Result of a perspective change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerspectiveChange {
    pub applied: ClientPerspective,
    pub fell_back: bool,
}

/// Transitions over a [`PreviewSession`] for one project.
#[derive(Debug, Clone)]
pub struct PreviewMachine {
    project_id: String,
    api_version: ApiVersion,
}

impl PreviewMachine {
    pub fn new(project_id: impl Into<String>, api_version: ApiVersion) -> Self {
        Self {
            project_id: project_id.into(),
            api_version,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn resolve(&self, session: &PreviewSession) -> PreviewContext {
        PreviewContext::resolve(session.current(), &self.project_id)
    }

    /// Bind the session to this project. Pending until committed.
    pub fn enter(
        &self,
        session: &mut PreviewSession,
        requested: Option<ClientPerspective>,
    ) -> ClientPerspective {
        let perspective = if self.api_version.supports_perspective_stack() {
            requested.unwrap_or(DEFAULT_PREVIEW_PERSPECTIVE)
        } else {
            DEFAULT_PREVIEW_PERSPECTIVE
        };

        session.set_project_id(self.project_id.clone());
        session.set_perspective(perspective.clone());
        counter!(METRIC_TRANSITION, "kind" => "enter").increment(1);
        info!(
            target = SOURCE,
            project = %self.project_id,
            perspective = %perspective,
            "preview session entered"
        );
        perspective
    }

    /// Drop both fields and remove the cookie. Pending until committed.
    pub fn exit(&self, session: &mut PreviewSession) {
        session.unset(SessionField::ProjectId);
        session.unset(SessionField::Perspective);
        session.destroy();
        counter!(METRIC_TRANSITION, "kind" => "exit").increment(1);
        info!(target = SOURCE, project = %self.project_id, "preview session exited");
    }

    /// Replace the session perspective. Invalid values fall back to drafts.
    pub fn change_perspective(
        &self,
        session: &mut PreviewSession,
        raw: &str,
    ) -> Result<PerspectiveChange, TransitionError> {
        match session.project_id() {
            None => return Err(TransitionError::NotEnabled),
            Some(project) if project != self.project_id => {
                return Err(TransitionError::ProjectMismatch);
            }
            Some(_) => {}
        }

        let change = match ClientPerspective::parse(raw) {
            Ok(perspective)
                if perspective.is_stack() && !self.api_version.supports_perspective_stack() =>
            {
                warn!(
                    target = SOURCE,
                    requested = raw,
                    api_version = %self.api_version,
                    "perspective stacks unsupported by api version, using drafts"
                );
                PerspectiveChange {
                    applied: DEFAULT_PREVIEW_PERSPECTIVE,
                    fell_back: true,
                }
            }
            Ok(perspective) => PerspectiveChange {
                applied: perspective,
                fell_back: false,
            },
            Err(err) => {
                warn!(
                    target = SOURCE,
                    requested = raw,
                    error = %err,
                    "invalid perspective, using drafts"
                );
                PerspectiveChange {
                    applied: DEFAULT_PREVIEW_PERSPECTIVE,
                    fell_back: true,
                }
            }
        };

        session.set_perspective(change.applied.clone());
        counter!(METRIC_TRANSITION, "kind" => "change_perspective").increment(1);
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> PreviewMachine {
        PreviewMachine::new("p1", "2025-02-19".parse().unwrap())
    }

    fn enabled_session() -> PreviewSession {
        PreviewSession::from_snapshot(SessionSnapshot {
            project_id: Some("p1".into()),
            perspective: Some(ClientPerspective::Drafts),
        })
    }

    #[test]
    fn enablement_follows_project_id() {
        let snapshot = SessionSnapshot {
            project_id: Some("p1".into()),
            perspective: None,
        };
        assert!(PreviewContext::resolve(&snapshot, "p1").is_enabled());
        assert!(!PreviewContext::resolve(&snapshot, "p2").is_enabled());
        assert!(!PreviewContext::resolve(&SessionSnapshot::default(), "p1").is_enabled());
    }

    #[test]
    fn disabled_context_reads_published() {
        assert_eq!(
            PreviewContext::disabled().perspective(),
            ClientPerspective::Published
        );
    }

    #[test]
    fn enter_overrides_foreign_project() {
        let mut session = PreviewSession::from_snapshot(SessionSnapshot {
            project_id: Some("other".into()),
            perspective: Some(ClientPerspective::Raw),
        });
        let machine = machine();
        assert!(!machine.resolve(&session).is_enabled());

        machine.enter(&mut session, None);
        assert!(session.is_pending());
        let context = machine.resolve(&session);
        assert_eq!(
            context.state(),
            &PreviewState::Enabled(ClientPerspective::Drafts)
        );
        assert!(!PreviewContext::resolve(session.current(), "other").is_enabled());
    }

    #[test]
    fn enter_keeps_requested_stack_on_recent_versions() {
        let mut session = PreviewSession::default();
        let stack = ClientPerspective::parse("rSpring,drafts").unwrap();
        let applied = machine().enter(&mut session, Some(stack.clone()));
        assert_eq!(applied, stack);
    }

    #[test]
    fn enter_forces_drafts_on_old_versions() {
        let machine = PreviewMachine::new("p1", "2021-03-25".parse().unwrap());
        let mut session = PreviewSession::default();
        let applied = machine.enter(
            &mut session,
            Some(ClientPerspective::parse("rSpring,drafts").unwrap()),
        );
        assert_eq!(applied, ClientPerspective::Drafts);
    }

    #[test]
    fn exit_destroys_session() {
        let mut session = enabled_session();
        machine().exit(&mut session);
        assert!(session.current().is_empty());
        assert!(!machine().resolve(&session).is_enabled());
    }

    #[test]
    fn change_perspective_requires_matching_project() {
        let machine = machine();
        let mut empty = PreviewSession::default();
        assert_eq!(
            machine.change_perspective(&mut empty, "drafts"),
            Err(TransitionError::NotEnabled)
        );

        let mut foreign = PreviewSession::from_snapshot(SessionSnapshot {
            project_id: Some("p2".into()),
            perspective: None,
        });
        assert_eq!(
            machine.change_perspective(&mut foreign, "drafts"),
            Err(TransitionError::ProjectMismatch)
        );
        assert!(!foreign.is_pending());
    }

    #[test]
    fn raw_mixed_with_named_perspective_falls_back() {
        let mut session = enabled_session();
        let change = machine()
            .change_perspective(&mut session, "raw,rSpring")
            .unwrap();
        assert!(change.fell_back);
        assert_eq!(change.applied, ClientPerspective::Drafts);
        assert_eq!(session.perspective(), Some(&ClientPerspective::Drafts));
    }

    #[test]
    fn valid_change_is_applied_in_place() {
        let mut session = enabled_session();
        let change = machine()
            .change_perspective(&mut session, "rSummer,drafts")
            .unwrap();
        assert!(!change.fell_back);
        assert_eq!(
            session.perspective(),
            Some(&ClientPerspective::parse("rSummer,drafts").unwrap())
        );
        assert!(session.is_pending());
    }
}
