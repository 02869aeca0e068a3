use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "vitrine_query_cache_hit_total",
            Unit::Count,
            "Content queries answered from a fresh cache entry."
        );
        describe_counter!(
            "vitrine_query_cache_stale_total",
            Unit::Count,
            "Content queries answered from a stale entry while revalidating."
        );
        describe_counter!(
            "vitrine_query_cache_miss_total",
            Unit::Count,
            "Content queries that had to be fetched."
        );
        describe_counter!(
            "vitrine_query_cache_bypass_total",
            Unit::Count,
            "Content queries that skipped the cache entirely."
        );
        describe_counter!(
            "vitrine_query_cache_store_error_total",
            Unit::Count,
            "Cache store reads or writes that failed and were ignored."
        );
        describe_histogram!(
            "vitrine_query_fetch_ms",
            Unit::Milliseconds,
            "Content fetch latency in milliseconds."
        );
        describe_gauge!(
            "vitrine_background_tasks",
            Unit::Count,
            "Deferred cache writes not yet completed."
        );
        describe_counter!(
            "vitrine_preview_transition_total",
            Unit::Count,
            "Preview session transitions by kind."
        );
    });
}
