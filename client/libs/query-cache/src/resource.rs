//! Single-resource queries
//!
//! A [`ResourceQuery`] reads one entity by key and fetches it when it is
//! missing or stale. Queries built with an empty ID are disabled: they never
//! touch the network and report "not loading, no data".

use crate::{QueryCache, QueryKey};
use futures::future::{BoxFuture, FutureExt};
use instafram_common::ApiError;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

/// Point-in-time view of a resource query
#[derive(Debug, Clone)]
pub struct ResourceSnapshot<T> {
    pub data: Option<T>,
    /// In flight with nothing to show yet
    pub is_loading: bool,
    /// In flight, possibly behind stale data
    pub is_fetching: bool,
    pub is_stale: bool,
    pub error: Option<ApiError>,
}

impl<T> ResourceSnapshot<T> {
    fn idle() -> Self {
        Self {
            data: None,
            is_loading: false,
            is_fetching: false,
            is_stale: false,
            error: None,
        }
    }
}

/// Cached fetch-by-key with an enabled gate
pub struct ResourceQuery<T> {
    cache: QueryCache,
    key: QueryKey,
    enabled: bool,
    fetcher: Fetcher<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResourceQuery<T>
where
    T: DeserializeOwned + Serialize + Send + 'static,
{
    pub fn new<F, Fut>(cache: QueryCache, key: QueryKey, enabled: bool, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Self {
            cache,
            key,
            enabled,
            fetcher: Arc::new(move || fetch().boxed()),
            _marker: PhantomData,
        }
    }

    /// Query gated on a possibly unresolved ID
    pub fn by_id<F, Fut>(
        cache: QueryCache,
        id: &str,
        key: impl FnOnce(&str) -> QueryKey,
        fetch: F,
    ) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let id = id.trim().to_string();
        let enabled = !id.is_empty();
        let key = key(&id);
        Self::new(cache, key, enabled, move || fetch(id.clone()))
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current cached state without fetching
    pub fn snapshot(&self) -> ResourceSnapshot<T> {
        if !self.enabled {
            return ResourceSnapshot::idle();
        }

        let state = self.cache.state(&self.key);
        let data = match self.cache.get::<T>(&self.key) {
            Ok(data) => data,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Cached resource failed to decode");
                None
            }
        };
        ResourceSnapshot {
            is_loading: state.in_flight && data.is_none(),
            is_fetching: state.in_flight,
            is_stale: state.stale,
            error: state.error,
            data,
        }
    }

    /// Fetch when missing or stale, then report the resulting state
    pub async fn fetch(&self) -> ResourceSnapshot<T> {
        self.run(false).await
    }

    /// Fetch regardless of freshness (unless already in flight)
    pub async fn refetch(&self) -> ResourceSnapshot<T> {
        self.run(true).await
    }

    /// Fetch and hand back the data or the error
    pub async fn load(&self) -> Result<T, ApiError> {
        if !self.enabled {
            return Err(ApiError::Validation(format!("{} has no id", self.key)));
        }
        let snapshot = self.fetch().await;
        match (snapshot.data, snapshot.error) {
            (Some(data), _) => Ok(data),
            (None, Some(err)) => Err(err),
            (None, None) => Err(ApiError::Decode(format!("{} produced no data", self.key))),
        }
    }

    async fn run(&self, force: bool) -> ResourceSnapshot<T> {
        if !self.enabled {
            debug!(key = %self.key, "Resource query disabled, skipping fetch");
            return ResourceSnapshot::idle();
        }

        let Some(generation) = self.cache.begin_resource_fetch(&self.key, force) else {
            return self.snapshot();
        };

        debug!(key = %self.key, generation, "Fetching resource");
        let result = (self.fetcher)()
            .await
            .and_then(|value| serde_json::to_value(&value).map_err(ApiError::from));
        self.cache
            .complete_resource_fetch(&self.key, generation, result);

        self.snapshot()
    }
}
