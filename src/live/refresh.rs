//! Refresh decisions for edits reported by the editing surface.

use async_trait::async_trait;
use tracing::{debug, info};
use vitrine_protocol::RefreshPayload;

const SOURCE: &str = "vitrine::live::refresh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshAction {
    /// A live subscription applies the change itself.
    Skip,
    /// Reload page data and wait for it before acknowledging.
    Revalidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Skipped,
    Revalidated,
}

/// Decision table over the refresh source.
pub fn decide(payload: &RefreshPayload) -> RefreshAction {
    match payload {
        RefreshPayload::Mutation {
            live_preview_enabled: true,
            ..
        } => RefreshAction::Skip,
        RefreshPayload::Mutation { .. }
        | RefreshPayload::Manual { .. }
        | RefreshPayload::PerspectiveChange { .. }
        | RefreshPayload::Unknown => RefreshAction::Revalidate,
    }
}

/// Reloads the data behind the current page.
#[async_trait]
pub trait Revalidator: Send + Sync {
    async fn revalidate(&self);
}

/// Applies the decision table and awaits revalidation.
pub struct RefreshHandler<R> {
    revalidator: R,
}

impl<R: Revalidator> RefreshHandler<R> {
    pub fn new(revalidator: R) -> Self {
        Self { revalidator }
    }

    pub fn revalidator(&self) -> &R {
        &self.revalidator
    }

    pub async fn handle(&self, payload: &RefreshPayload) -> RefreshOutcome {
        match decide(payload) {
            RefreshAction::Skip => {
                debug!(target = SOURCE, "refresh left to live subscription");
                RefreshOutcome::Skipped
            }
            RefreshAction::Revalidate => {
                self.revalidator.revalidate().await;
                info!(target = SOURCE, source = source_name(payload), "page data revalidated");
                RefreshOutcome::Revalidated
            }
        }
    }
}

fn source_name(payload: &RefreshPayload) -> &'static str {
    match payload {
        RefreshPayload::Manual { .. } => "manual",
        RefreshPayload::Mutation { .. } => "mutation",
        RefreshPayload::PerspectiveChange { .. } => "perspective-change",
        RefreshPayload::Unknown => "unknown",
    }
}
