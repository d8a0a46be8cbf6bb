//! Offset-paginated infinite queries
//!
//! An [`InfiniteQuery`] owns a page cursor over one key. Pages are appended in
//! server order; a page shorter than the configured page size ends the
//! listing. Switching key (a new filter or search term) starts over from an
//! empty sequence.

use crate::{PageOutcome, QueryCache, QueryKey};
use futures::future::{BoxFuture, FutureExt};
use instafram_common::ApiError;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

type PageFetcher<T> =
    Arc<dyn Fn(u32) -> BoxFuture<'static, Result<Vec<T>, ApiError>> + Send + Sync>;

fn boxed_fetcher<T, F, Fut>(fetch: F) -> PageFetcher<T>
where
    T: 'static,
    F: Fn(u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<T>, ApiError>> + Send + 'static,
{
    Arc::new(move |page| fetch(page).boxed())
}

/// Paginated listing bound to a cache key
pub struct InfiniteQuery<T> {
    cache: QueryCache,
    key: QueryKey,
    fetcher: PageFetcher<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> InfiniteQuery<T>
where
    T: DeserializeOwned + Serialize + Send + 'static,
{
    /// Observe `key`, loading page `n` through `fetch(n)`
    pub fn new<F, Fut>(cache: QueryCache, key: QueryKey, fetch: F) -> Self
    where
        F: Fn(u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, ApiError>> + Send + 'static,
    {
        cache.attach(&key);
        Self {
            cache,
            key,
            fetcher: boxed_fetcher(fetch),
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Rebind to a new key. The old listing becomes inactive and keeps only
    /// its leading pages; the new one starts from whatever is cached under
    /// its own key.
    pub fn set_key<F, Fut>(&mut self, key: QueryKey, fetch: F)
    where
        F: Fn(u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, ApiError>> + Send + 'static,
    {
        if key != self.key {
            debug!(from = %self.key, to = %key, "Switching listing key");
            self.cache.detach(&self.key);
            self.cache.attach(&key);
            self.key = key;
        }
        self.fetcher = boxed_fetcher(fetch);
    }

    /// Every item fetched so far, in page order
    pub fn data(&self) -> Vec<T> {
        let values: Vec<Value> = match self.cache.pages(&self.key) {
            Ok(values) => values,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Cached pages unreadable");
                return Vec::new();
            }
        };

        values
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(key = %self.key, error = %e, "Skipping undecodable item");
                    None
                }
            })
            .collect()
    }

    pub fn has_next(&self) -> bool {
        self.cache.state(&self.key).has_next
    }

    pub fn is_fetching(&self) -> bool {
        self.cache.state(&self.key).in_flight
    }

    pub fn is_stale(&self) -> bool {
        self.cache.state(&self.key).stale
    }

    pub fn page_count(&self) -> usize {
        self.cache.state(&self.key).page_count
    }

    /// Error of the most recent failed page, cleared by the next success
    pub fn last_error(&self) -> Option<ApiError> {
        self.cache.state(&self.key).error
    }

    /// Fetch the next page. Returns whether a request was issued: `false`
    /// when one is already in flight or the listing is complete. A stale
    /// listing is refreshed from page 0 instead.
    pub async fn fetch_next(&self) -> Result<bool, ApiError> {
        if self.is_stale() {
            return self.refresh().await;
        }

        let Some((generation, index)) = self.cache.begin_page_fetch(&self.key) else {
            debug!(key = %self.key, "Next page skipped");
            return Ok(false);
        };
        self.load(generation, index).await
    }

    /// Refetch page 0, replacing every cached page once it arrives
    pub async fn refresh(&self) -> Result<bool, ApiError> {
        let Some(generation) = self.cache.begin_refresh(&self.key) else {
            return Ok(false);
        };
        self.load(generation, 0).await
    }

    /// Make sure there is something current to show: first page when nothing
    /// is cached, a refresh when the listing is stale, nothing otherwise
    pub async fn ensure(&self) -> Result<bool, ApiError> {
        let state = self.cache.state(&self.key);
        if state.stale {
            self.refresh().await
        } else if state.page_count == 0 {
            self.fetch_next().await
        } else {
            Ok(false)
        }
    }

    /// Seed page 0 with items already at hand. Ignored once the listing
    /// holds pages.
    pub fn seed(&self, items: &[T]) -> Result<bool, ApiError> {
        let values = items
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.cache.seed_first_page(&self.key, values))
    }

    async fn load(&self, generation: u64, index: u32) -> Result<bool, ApiError> {
        debug!(key = %self.key, index, generation, "Fetching page");

        let result = (self.fetcher)(index).await.and_then(|items| {
            items
                .iter()
                .map(|item| serde_json::to_value(item).map_err(ApiError::from))
                .collect::<Result<Vec<_>, _>>()
        });

        match self
            .cache
            .complete_page_fetch(&self.key, generation, index, result)
        {
            PageOutcome::Stored { has_next } => {
                debug!(key = %self.key, index, has_next, "Page stored");
                Ok(true)
            }
            PageOutcome::Discarded => Ok(true),
            PageOutcome::Failed(err) => Err(err),
        }
    }
}

impl<T> Drop for InfiniteQuery<T> {
    fn drop(&mut self) {
        self.cache.detach(&self.key);
    }
}
