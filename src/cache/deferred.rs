//! Deferred-write boundary: work allowed to outlive the response.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use metrics::gauge;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::lock::mutex_lock;

const SOURCE: &str = "cache::deferred";
const METRIC_PENDING: &str = "vitrine_background_tasks";

/// Host hook that keeps background work alive past the response.
pub trait WaitUntil: Send + Sync {
    fn wait_until(&self, task: BoxFuture<'static, ()>);
}

/// Tokio-backed task set drained before the process exits.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks spawned and not yet reaped.
    pub fn pending(&self) -> usize {
        mutex_lock(&self.tasks, SOURCE, "pending").len()
    }

    /// Wait for every task, including tasks spawned while draining.
    pub async fn drain(&self) {
        loop {
            let mut batch = std::mem::take(&mut *mutex_lock(&self.tasks, SOURCE, "drain"));
            if batch.is_empty() {
                break;
            }
            debug!(pending = batch.len(), "draining background tasks");
            while let Some(result) = batch.join_next().await {
                if let Err(err) = result {
                    warn!(error = %err, "background task did not complete");
                }
            }
        }
        gauge!(METRIC_PENDING).set(0.0);
    }
}

impl WaitUntil for BackgroundTasks {
    fn wait_until(&self, task: BoxFuture<'static, ()>) {
        let mut tasks = mutex_lock(&self.tasks, SOURCE, "wait_until");
        while let Some(result) = tasks.try_join_next() {
            if let Err(err) = result {
                warn!(error = %err, "background task did not complete");
            }
        }
        tasks.spawn(task);
        gauge!(METRIC_PENDING).set(tasks.len() as f64);
    }
}
