//! Cached, strategy-aware execution of content fetches.

use std::{fmt::Display, future::Future, sync::Arc, time::Instant};

use dashmap::DashMap;
use metrics::{counter, histogram};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{Instrument, debug, info_span, warn};

use super::{
    CacheKey, CacheStrategy,
    deferred::WaitUntil,
    directives::parse_cache_control,
    store::{CacheStore, EntryStatus},
};

const METRIC_HIT: &str = "vitrine_query_cache_hit_total";
const METRIC_STALE: &str = "vitrine_query_cache_stale_total";
const METRIC_MISS: &str = "vitrine_query_cache_miss_total";
const METRIC_BYPASS: &str = "vitrine_query_cache_bypass_total";
const METRIC_STORE_ERROR: &str = "vitrine_query_cache_store_error_total";
const METRIC_FETCH_MS: &str = "vitrine_query_fetch_ms";

type ShouldCache<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// One cached call: key, requested strategy and per-call options.
pub struct CacheRequest<T> {
    key: CacheKey,
    strategy: CacheStrategy,
    preview: bool,
    label: Option<String>,
    should_cache: Option<ShouldCache<T>>,
}

impl<T> CacheRequest<T> {
    pub fn new(key: CacheKey, strategy: CacheStrategy) -> Self {
        Self {
            key,
            strategy,
            preview: false,
            label: None,
            should_cache: None,
        }
    }

    /// Mark the call as part of a preview request; preview is never cached.
    pub fn preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    /// Attach a human-readable label for tracing and metrics.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Only store results for which `predicate` holds.
    pub fn should_cache(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.should_cache = Some(Arc::new(predicate));
        self
    }

    /// Strategy actually applied to this call.
    pub fn effective_strategy(&self) -> CacheStrategy {
        if self.preview {
            CacheStrategy::None
        } else {
            self.strategy
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

/// Wraps content fetches with a shared cache store.
///
/// Concurrent misses on one key are not coalesced: each caller fetches and
/// each writes, last write wins. Stale entries trigger at most one
/// background revalidation per key at a time.
#[derive(Clone)]
pub struct QueryCache {
    store: Arc<dyn CacheStore>,
    deferred: Arc<dyn WaitUntil>,
    revalidating: Arc<DashMap<CacheKey, ()>>,
}

impl QueryCache {
    pub fn new(store: Arc<dyn CacheStore>, deferred: Arc<dyn WaitUntil>) -> Self {
        Self {
            store,
            deferred,
            revalidating: Arc::new(DashMap::new()),
        }
    }

    pub async fn run<T, E, F, Fut>(&self, request: CacheRequest<T>, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let strategy = request.effective_strategy();
        let span = info_span!(
            "content_query",
            label = request.label.as_deref().unwrap_or(""),
            key = %request.key,
            cache = %strategy,
        );
        self.run_inner(request, strategy, fetch)
            .instrument(span)
            .await
    }

    async fn run_inner<T, E, F, Fut>(
        &self,
        request: CacheRequest<T>,
        strategy: CacheStrategy,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let CacheRequest {
            key,
            label,
            should_cache,
            ..
        } = request;
        let label = label.unwrap_or_else(|| "query".to_string());

        if strategy.forbids_storage() {
            counter!(METRIC_BYPASS).increment(1);
            return timed_fetch(&label, fetch).await;
        }

        let hit = match self.store.lookup(&key).await {
            Ok(hit) => hit,
            Err(err) => {
                counter!(METRIC_STORE_ERROR, "op" => "lookup").increment(1);
                warn!(key = %key, error = %err, "cache lookup failed; treating as miss");
                None
            }
        };

        if let Some(hit) = hit {
            match serde_json::from_value::<T>(hit.value) {
                Ok(cached) => match hit.status {
                    EntryStatus::Fresh => {
                        counter!(METRIC_HIT).increment(1);
                        debug!(outcome = "hit", "serving cached query result");
                        return Ok(cached);
                    }
                    EntryStatus::Stale => {
                        counter!(METRIC_STALE).increment(1);
                        debug!(outcome = "stale", "serving stale result, revalidating");
                        self.revalidate_in_background(key, strategy, label, should_cache, fetch);
                        return Ok(cached);
                    }
                    EntryStatus::ErrorFallback if allows_stale_if_error(&strategy) => {
                        counter!(METRIC_MISS).increment(1);
                        return match timed_fetch(&label, fetch).await {
                            Ok(fresh) => {
                                if accepts(&should_cache, &fresh) {
                                    self.store_in_background(key, strategy, &fresh);
                                }
                                Ok(fresh)
                            }
                            Err(err) => {
                                warn!(error = %err, "fetch failed; serving stale-if-error entry");
                                Ok(cached)
                            }
                        };
                    }
                    EntryStatus::ErrorFallback => {
                        debug!(outcome = "expired", "strategy has no stale-if-error window");
                    }
                },
                Err(err) => {
                    counter!(METRIC_STORE_ERROR, "op" => "decode").increment(1);
                    warn!(key = %key, error = %err, "cached entry could not be decoded; treating as miss");
                }
            }
        }

        counter!(METRIC_MISS).increment(1);
        debug!(outcome = "miss", "fetching query result");
        let value = timed_fetch(&label, fetch).await?;
        if accepts(&should_cache, &value) {
            self.store_in_background(key, strategy, &value);
        }
        Ok(value)
    }

    fn store_in_background<T: Serialize>(&self, key: CacheKey, strategy: CacheStrategy, value: &T) {
        let encoded = match serde_json::to_value(value) {
            Ok(encoded) => encoded,
            Err(err) => {
                counter!(METRIC_STORE_ERROR, "op" => "encode").increment(1);
                warn!(key = %key, error = %err, "query result could not be encoded for caching");
                return;
            }
        };

        let store = Arc::clone(&self.store);
        let directive = strategy.directive();
        self.deferred.wait_until(Box::pin(
            async move {
                write_entry(store.as_ref(), &key, encoded, &directive).await;
            }
            .in_current_span(),
        ));
    }

    fn revalidate_in_background<T, E, F, Fut>(
        &self,
        key: CacheKey,
        strategy: CacheStrategy,
        label: String,
        should_cache: Option<ShouldCache<T>>,
        fetch: F,
    ) where
        T: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if self.revalidating.insert(key.clone(), ()).is_some() {
            debug!(key = %key, "revalidation already in flight");
            return;
        }
        let in_flight = InFlight {
            revalidating: Arc::clone(&self.revalidating),
            key: key.clone(),
        };

        let store = Arc::clone(&self.store);
        let directive = strategy.directive();
        self.deferred.wait_until(Box::pin(
            async move {
                let _in_flight = in_flight;
                match timed_fetch(&label, fetch).await {
                    Ok(fresh) if accepts(&should_cache, &fresh) => {
                        match serde_json::to_value(&fresh) {
                            Ok(encoded) => {
                                write_entry(store.as_ref(), &key, encoded, &directive).await
                            }
                            Err(err) => {
                                counter!(METRIC_STORE_ERROR, "op" => "encode").increment(1);
                                warn!(key = %key, error = %err, "revalidated result could not be encoded");
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(err) => warn!(key = %key, error = %err, "background revalidation failed"),
                }
            }
            .in_current_span(),
        ));
    }
}

/// Releases a key's revalidation slot however the task ends.
struct InFlight {
    revalidating: Arc<DashMap<CacheKey, ()>>,
    key: CacheKey,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.revalidating.remove(&self.key);
    }
}

/// Stale-if-error fallback only applies when the strategy asks for it.
fn allows_stale_if_error(strategy: &CacheStrategy) -> bool {
    !parse_cache_control(&strategy.directive())
        .stale_if_error
        .is_zero()
}

async fn write_entry(store: &dyn CacheStore, key: &CacheKey, value: serde_json::Value, directive: &str) {
    if let Err(err) = store.put(key, value, directive).await {
        counter!(METRIC_STORE_ERROR, "op" => "put").increment(1);
        warn!(key = %key, error = %err, "cache write failed; result not stored");
    }
}

fn accepts<T>(should_cache: &Option<ShouldCache<T>>, value: &T) -> bool {
    should_cache.as_ref().is_none_or(|predicate| predicate(value))
}

async fn timed_fetch<T, E, F, Fut>(label: &str, fetch: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started_at = Instant::now();
    let result = fetch().await;
    histogram!(METRIC_FETCH_MS, "label" => label.to_string())
        .record(started_at.elapsed().as_secs_f64() * 1000.0);
    result
}
