//! Visual-editing synchronization.
//!
//! Dispatches frames from the editing surface to the refresh table, the
//! history bridge and the perspective submitter, and publishes page-side
//! state (location, live query presence) back over the channel.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};
use vitrine_protocol::{Envelope, Message, PerspectiveValue, RefreshPayload};

use super::{
    channel::{ChannelError, MessageChannel},
    history::{HistoryBridge, Navigator},
    refresh::{RefreshHandler, RefreshOutcome, Revalidator},
    registry::{ActiveQueryRegistry, Subscription},
    submit::{PerspectiveSubmitter, SubmitError},
};

const SOURCE: &str = "vitrine::live::sync";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

pub struct VisualEditingSync<R, N> {
    channel: Arc<dyn MessageChannel>,
    refresh: RefreshHandler<R>,
    history: HistoryBridge<N>,
    submitter: Arc<dyn PerspectiveSubmitter>,
    registry: ActiveQueryRegistry,
    _live_queries: Subscription,
}

impl<R: Revalidator, N: Navigator> VisualEditingSync<R, N> {
    /// Connect the page to `channel` and announce current live queries.
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        revalidator: R,
        navigator: N,
        submitter: Arc<dyn PerspectiveSubmitter>,
        registry: ActiveQueryRegistry,
    ) -> Self {
        let bridge = Arc::clone(&channel);
        let live_queries = registry.subscribe(move |active| {
            if let Err(err) = bridge.send(Message::LiveQueries { active }) {
                warn!(target = SOURCE, error = %err, "live query update not delivered");
            }
        });
        if let Err(err) = channel.send(Message::LiveQueries {
            active: registry.snapshot(),
        }) {
            warn!(target = SOURCE, error = %err, "live query announcement not delivered");
        }

        Self {
            channel,
            refresh: RefreshHandler::new(revalidator),
            history: HistoryBridge::new(navigator),
            submitter,
            registry,
            _live_queries: live_queries,
        }
    }

    pub fn history(&self) -> &HistoryBridge<N> {
        &self.history
    }

    pub fn refresh(&self) -> &RefreshHandler<R> {
        &self.refresh
    }

    /// Handle one frame from the editing surface.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<(), SyncError> {
        if envelope.connection != self.channel.connection() {
            debug!(
                target = SOURCE,
                connection = %envelope.connection,
                "ignoring frame for another connection"
            );
            return Ok(());
        }

        match envelope.message {
            Message::Refresh { id, payload } => {
                self.refresh_and_acknowledge(id, &payload).await?;
            }
            Message::Navigate { intent } => self.history.apply(&intent),
            Message::Perspective { perspective } => {
                self.change_perspective(&perspective).await?;
            }
            Message::RefreshComplete { .. }
            | Message::Location { .. }
            | Message::LiveQueries { .. } => {
                debug!(target = SOURCE, "ignoring page-side message from editor");
            }
        }
        Ok(())
    }

    /// Report a local navigation unless it was requested remotely.
    pub fn location_changed(&self, url: &str, title: Option<&str>) -> Result<(), SyncError> {
        if let Some(message) = self.history.location_changed(url, title) {
            self.channel.send(message)?;
        }
        Ok(())
    }

    async fn refresh_and_acknowledge(
        &self,
        id: u64,
        payload: &RefreshPayload,
    ) -> Result<RefreshOutcome, SyncError> {
        let outcome = self.refresh.handle(payload).await;
        self.channel.send(Message::RefreshComplete { id })?;
        Ok(outcome)
    }

    /// The session must hold the new perspective before any data reloads.
    async fn change_perspective(
        &self,
        perspective: &PerspectiveValue,
    ) -> Result<RefreshOutcome, SyncError> {
        self.submitter.submit(perspective).await?;
        let payload = RefreshPayload::PerspectiveChange {
            live_preview_enabled: self.registry.snapshot(),
        };
        Ok(self.refresh.handle(&payload).await)
    }
}
