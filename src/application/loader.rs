//! Per-request content loading.
//!
//! A [`RequestLoader`] is built once per request from the resolved preview
//! context. It picks the content client for the request up front so every
//! query in the request reads through the same configuration, and it keeps
//! the cache strategy consistent with that choice.

use std::sync::Arc;

use serde_json::Value;

use crate::{
    cache::{CacheConfig, CacheRequest, CacheStrategy, QueryCache, hash_query},
    content::{ContentClient, ContentError, SecretToken},
    preview::PreviewContext,
};

type ShouldCache = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Per-call options for [`RequestLoader::load_query`].
#[derive(Clone, Default)]
pub struct LoadOptions {
    pub strategy: Option<CacheStrategy>,
    pub label: Option<String>,
    pub should_cache: Option<ShouldCache>,
}

impl LoadOptions {
    pub fn strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn should_cache(mut self, predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.should_cache = Some(Arc::new(predicate));
        self
    }
}

/// Query result together with the caching policy it was served under.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedQuery {
    pub value: Value,
    pub strategy: CacheStrategy,
}

impl LoadedQuery {
    /// `Cache-Control` value for a response built from this result.
    pub fn cache_control(&self) -> String {
        self.strategy.directive()
    }
}

#[derive(Clone)]
pub struct RequestLoader {
    client: Arc<dyn ContentClient>,
    cache: QueryCache,
    config: CacheConfig,
    context: PreviewContext,
}

impl RequestLoader {
    pub fn new(
        base: &Arc<dyn ContentClient>,
        preview_token: Option<&SecretToken>,
        cache: QueryCache,
        config: CacheConfig,
        context: PreviewContext,
    ) -> Self {
        let client = context.configure_client(base, preview_token);
        Self {
            client,
            cache,
            config,
            context,
        }
    }

    pub fn client(&self) -> &Arc<dyn ContentClient> {
        &self.client
    }

    pub fn context(&self) -> &PreviewContext {
        &self.context
    }

    /// Strategy a call will run under. Preview reads are never cached.
    pub fn strategy_for(&self, requested: Option<CacheStrategy>) -> CacheStrategy {
        if self.context.is_enabled() {
            CacheStrategy::None
        } else {
            self.config.strategy_or_default(requested)
        }
    }

    pub async fn load_query(
        &self,
        query: &str,
        params: Option<Value>,
        options: LoadOptions,
    ) -> Result<LoadedQuery, ContentError> {
        let strategy = self.strategy_for(options.strategy);
        let key = hash_query(query, params.as_ref());

        let mut request = CacheRequest::new(key, strategy).preview(self.context.is_enabled());
        if let Some(label) = options.label {
            request = request.label(label);
        }
        if let Some(predicate) = options.should_cache {
            request = request.should_cache(move |value: &Value| predicate(value));
        }

        let client = Arc::clone(&self.client);
        let query = query.to_string();
        let value = self
            .cache
            .run(request, move || async move {
                client.fetch(&query, params.as_ref()).await
            })
            .await?;

        Ok(LoadedQuery { value, strategy })
    }
}
