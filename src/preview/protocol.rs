//! Preview entry and exit operations.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
    content::{ClientOverrides, ContentClient, ContentError, SecretToken},
    domain::perspective::ClientPerspective,
};

use super::{
    session::PreviewSession,
    state::{PerspectiveChange, PreviewContext, PreviewMachine, TransitionError},
    validation::PreviewValidator,
};

const SOURCE: &str = "vitrine::preview::protocol";

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("preview validation failed: {0}")]
    Validation(#[source] ContentError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnterOutcome {
    /// The secret did not validate. The session is untouched.
    Rejected,
    Entered {
        redirect_to: String,
        perspective: ClientPerspective,
    },
}

/// Preview operations for one project.
#[derive(Clone)]
pub struct PreviewService {
    machine: PreviewMachine,
    client: Arc<dyn ContentClient>,
    token: SecretToken,
    validator: Arc<dyn PreviewValidator>,
}

impl PreviewService {
    pub fn new(
        machine: PreviewMachine,
        client: Arc<dyn ContentClient>,
        token: SecretToken,
        validator: Arc<dyn PreviewValidator>,
    ) -> Self {
        Self {
            machine,
            client,
            token,
            validator,
        }
    }

    pub fn machine(&self) -> &PreviewMachine {
        &self.machine
    }

    pub fn token(&self) -> &SecretToken {
        &self.token
    }

    pub fn context(&self, session: &PreviewSession) -> PreviewContext {
        self.machine.resolve(session)
    }

    /// Client used for secret validation: authenticated, uncached, raw.
    fn validation_client(&self) -> Arc<dyn ContentClient> {
        self.client.with_config(ClientOverrides {
            use_cdn: Some(false),
            perspective: Some(ClientPerspective::Raw),
            token: Some(self.token.clone()),
        })
    }

    pub async fn enter(
        &self,
        session: &mut PreviewSession,
        url: &Url,
    ) -> Result<EnterOutcome, PreviewError> {
        let client = self.validation_client();
        let validation = self
            .validator
            .validate(client.as_ref(), url)
            .await
            .map_err(PreviewError::Validation)?;

        if !validation.is_valid {
            warn!(target = SOURCE, "preview secret rejected");
            return Ok(EnterOutcome::Rejected);
        }

        let perspective = self.machine.enter(session, validation.perspective);
        Ok(EnterOutcome::Entered {
            redirect_to: validation.redirect_to,
            perspective,
        })
    }

    pub fn exit(&self, session: &mut PreviewSession) {
        self.machine.exit(session);
    }

    pub fn change_perspective(
        &self,
        session: &mut PreviewSession,
        raw: &str,
    ) -> Result<PerspectiveChange, TransitionError> {
        let change = self.machine.change_perspective(session, raw)?;
        info!(
            target = SOURCE,
            perspective = %change.applied,
            fell_back = change.fell_back,
            "preview perspective changed"
        );
        Ok(change)
    }
}
