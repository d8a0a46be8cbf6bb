//! InstaFram query cache
//!
//! Process-wide read-through cache of server resources, passed around as an
//! explicit handle instead of living in ambient global state:
//! - Keyed entries holding either a single resource or a list of pages
//! - Offset-paginated infinite queries with an in-flight guard per key
//! - Prefix-based invalidation with subscriber notification
//! - Generation counters so late responses never overwrite newer state
//! - Bounded page retention for stale and inactive listings
//! - Metrics integration

mod error;
mod keys;
mod metrics;

pub mod infinite;
pub mod invalidation;
pub mod resource;

pub use error::{CacheError, CacheResult};
pub use infinite::InfiniteQuery;
pub use invalidation::{CacheAction, CacheEvent, KeyWatcher};
pub use keys::{Keys, QueryKey};
pub use metrics::{CacheMetrics, FetchKind};
pub use resource::{ResourceQuery, ResourceSnapshot};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use instafram_common::{ApiError, PAGE_SIZE};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Tunables of a cache instance
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Items per page; a shorter page ends a listing
    pub page_size: usize,
    /// Leading pages kept once a listing is stale or has no observer
    pub stale_page_limit: usize,
    /// Buffered events per subscriber before it lags
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            stale_page_limit: 3,
            event_capacity: 256,
        }
    }
}

/// Read-only view of an entry's bookkeeping
#[derive(Debug, Clone, Default)]
pub struct EntryState {
    pub has_data: bool,
    pub page_count: usize,
    pub has_next: bool,
    pub stale: bool,
    pub in_flight: bool,
    pub generation: u64,
    pub error: Option<ApiError>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Entry {
    data: Option<Value>,
    pages: Vec<Vec<Value>>,
    has_next: bool,
    stale: bool,
    in_flight: bool,
    generation: u64,
    observers: usize,
    error: Option<ApiError>,
    updated_at: Option<DateTime<Utc>>,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            data: None,
            pages: Vec::new(),
            // Unknown until the first short page arrives
            has_next: true,
            stale: false,
            in_flight: false,
            generation: 0,
            observers: 0,
            error: None,
            updated_at: None,
        }
    }
}

impl Entry {
    fn state(&self) -> EntryState {
        EntryState {
            has_data: self.data.is_some(),
            page_count: self.pages.len(),
            has_next: self.has_next,
            stale: self.stale,
            in_flight: self.in_flight,
            generation: self.generation,
            error: self.error.clone(),
            updated_at: self.updated_at,
        }
    }

    /// Keep at most `limit` leading pages
    fn trim_pages(&mut self, limit: usize) -> bool {
        if self.pages.len() > limit {
            self.pages.truncate(limit);
            self.has_next = true;
            true
        } else {
            false
        }
    }
}

/// Result of completing a page fetch
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PageOutcome {
    Stored { has_next: bool },
    Discarded,
    Failed(ApiError),
}

struct Inner {
    store: DashMap<QueryKey, Entry>,
    events: broadcast::Sender<CacheEvent>,
    config: CacheConfig,
    metrics: CacheMetrics,
}

/// Shared query cache handle
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        debug!(
            page_size = config.page_size,
            stale_page_limit = config.stale_page_limit,
            "Initializing query cache"
        );

        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                store: DashMap::new(),
                events,
                config,
                metrics: CacheMetrics::new(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.inner.metrics
    }

    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.inner.store.contains_key(key)
    }

    /// Keys currently held, in no particular order
    pub fn keys(&self) -> Vec<QueryKey> {
        self.inner.store.iter().map(|e| e.key().clone()).collect()
    }

    /// Bookkeeping of one entry; a missing entry reports defaults
    pub fn state(&self, key: &QueryKey) -> EntryState {
        self.inner
            .store
            .get(key)
            .map(|e| e.state())
            .unwrap_or_else(|| Entry::default().state())
    }

    // ============= Single resources =============

    /// Cached resource, if any (stale data included)
    pub fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> CacheResult<Option<T>> {
        let value = match self.inner.store.get(key) {
            Some(entry) => entry.data.clone(),
            None => None,
        };
        match value {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    /// Store a resource as fresh data
    pub fn set<T: Serialize>(&self, key: &QueryKey, value: &T) -> CacheResult<()> {
        let data = serde_json::to_value(value)?;
        {
            let mut entry = self.inner.store.entry(key.clone()).or_default();
            entry.data = Some(data);
            entry.stale = false;
            entry.error = None;
            entry.updated_at = Some(Utc::now());
        }
        debug!(key = %key, "Cache set");
        self.emit(key.clone(), CacheAction::Updated);
        Ok(())
    }

    /// Edit a cached resource in place; false when nothing is cached
    pub fn update<T, F>(&self, key: &QueryKey, f: F) -> CacheResult<bool>
    where
        T: DeserializeOwned + Serialize,
        F: FnOnce(&mut T),
    {
        let updated = {
            let Some(mut entry) = self.inner.store.get_mut(key) else {
                return Ok(false);
            };
            let Some(data) = entry.data.as_mut() else {
                return Ok(false);
            };
            let mut value: T = serde_json::from_value(data.clone())?;
            f(&mut value);
            *data = serde_json::to_value(&value)?;
            true
        };
        if updated {
            self.emit(key.clone(), CacheAction::Updated);
        }
        Ok(updated)
    }

    // ============= Paginated listings =============

    /// Flattened items of every cached page, in page order
    pub fn pages<T: DeserializeOwned>(&self, key: &QueryKey) -> CacheResult<Vec<T>> {
        let values: Vec<Value> = match self.inner.store.get(key) {
            Some(entry) => entry.pages.iter().flatten().cloned().collect(),
            None => Vec::new(),
        };
        values
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(CacheError::from))
            .collect()
    }

    /// Insert an item at the head of the first cached page
    pub fn prepend_item<T: Serialize>(&self, key: &QueryKey, item: &T) -> CacheResult<bool> {
        let value = serde_json::to_value(item)?;
        let inserted = match self.inner.store.get_mut(key) {
            Some(mut entry) => match entry.pages.first_mut() {
                Some(first) => {
                    first.insert(0, value);
                    true
                }
                None => false,
            },
            None => false,
        };
        if inserted {
            self.emit(key.clone(), CacheAction::Updated);
        }
        Ok(inserted)
    }

    /// Apply `f` to every resource and page item under `prefix` that decodes
    /// as `T`; `f` returns whether it changed the item. A resource holding a
    /// JSON array is edited element by element. Returns the number of changed
    /// items.
    pub fn update_items<T, F>(&self, prefix: &QueryKey, mut f: F) -> CacheResult<usize>
    where
        T: DeserializeOwned + Serialize,
        F: FnMut(&mut T) -> bool,
    {
        let mut changed = 0;
        let mut touched = Vec::new();

        for mut entry in self.inner.store.iter_mut() {
            if !entry.key().starts_with(prefix) {
                continue;
            }
            let key = entry.key().clone();
            let before = changed;

            let entry = entry.value_mut();
            let resource: Vec<&mut Value> = match entry.data.as_mut() {
                Some(Value::Array(items)) => items.iter_mut().collect(),
                Some(value) => vec![value],
                None => Vec::new(),
            };
            for slot in resource.into_iter().chain(entry.pages.iter_mut().flatten()) {
                let Ok(mut item) = serde_json::from_value::<T>(slot.clone()) else {
                    continue;
                };
                if f(&mut item) {
                    *slot = serde_json::to_value(&item)?;
                    changed += 1;
                }
            }

            if changed > before {
                touched.push(key);
            }
        }

        for key in touched {
            self.emit(key, CacheAction::Updated);
        }
        Ok(changed)
    }

    /// Drop every page item under `prefix` matching `pred`
    pub fn remove_items<T, F>(&self, prefix: &QueryKey, pred: F) -> usize
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let mut removed = 0;
        let mut touched = Vec::new();

        for mut entry in self.inner.store.iter_mut() {
            if !entry.key().starts_with(prefix) {
                continue;
            }
            let key = entry.key().clone();
            let before = removed;

            for page in entry.value_mut().pages.iter_mut() {
                let len = page.len();
                page.retain(|v| match serde_json::from_value::<T>(v.clone()) {
                    Ok(item) => !pred(&item),
                    Err(_) => true,
                });
                removed += len - page.len();
            }

            if removed > before {
                touched.push(key);
            }
        }

        for key in touched {
            self.emit(key, CacheAction::Updated);
        }
        removed
    }

    // ============= Invalidation =============

    /// Mark every entry under `prefix` stale. Stale entries refetch on their
    /// next read; in-flight responses for them are discarded.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let limit = self.inner.config.stale_page_limit;
        let mut invalidated = Vec::new();

        for mut entry in self.inner.store.iter_mut() {
            if !entry.key().starts_with(prefix) {
                continue;
            }
            let key = entry.key().clone();
            let entry = entry.value_mut();
            entry.stale = true;
            entry.generation += 1;
            entry.in_flight = false;
            entry.trim_pages(limit);
            invalidated.push(key);
        }

        debug!(prefix = %prefix, count = invalidated.len(), "Cache invalidate");
        let count = invalidated.len();
        for key in invalidated {
            self.inner.metrics.record_invalidation(&key);
            self.emit(key, CacheAction::Invalidated);
        }
        count
    }

    /// Mark exactly one entry stale
    pub fn invalidate_exact(&self, key: &QueryKey) -> bool {
        let limit = self.inner.config.stale_page_limit;
        let found = match self.inner.store.get_mut(key) {
            Some(mut entry) => {
                entry.stale = true;
                entry.generation += 1;
                entry.in_flight = false;
                entry.trim_pages(limit);
                true
            }
            None => false,
        };
        if found {
            self.inner.metrics.record_invalidation(key);
            self.emit(key.clone(), CacheAction::Invalidated);
        }
        found
    }

    /// Forget every entry under `prefix`
    pub fn remove(&self, prefix: &QueryKey) -> usize {
        let keys: Vec<QueryKey> = self
            .inner
            .store
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();

        for key in &keys {
            self.inner.store.remove(key);
        }
        for key in keys.iter().cloned() {
            self.emit(key, CacheAction::Removed);
        }
        keys.len()
    }

    /// Forget everything (sign-out). Watchers see a `Removed` event per key.
    pub fn clear(&self) {
        let keys = self.keys();
        for key in &keys {
            self.inner.store.remove(key);
        }
        debug!(count = keys.len(), "Cache cleared");
        for key in keys {
            self.emit(key, CacheAction::Removed);
        }
    }

    // ============= Fetch bookkeeping =============

    /// Claim the right to fetch a resource. `None` when a fetch is already in
    /// flight, or when fresh data exists and `force` is false.
    pub(crate) fn begin_resource_fetch(&self, key: &QueryKey, force: bool) -> Option<u64> {
        let mut entry = self.inner.store.entry(key.clone()).or_default();
        if entry.in_flight {
            return None;
        }
        if !force && entry.data.is_some() && !entry.stale {
            self.inner.metrics.record_hit(key);
            return None;
        }
        entry.in_flight = true;
        self.inner.metrics.record_miss(key);
        self.inner.metrics.record_fetch(key, FetchKind::Resource);
        Some(entry.generation)
    }

    pub(crate) fn complete_resource_fetch(
        &self,
        key: &QueryKey,
        generation: u64,
        result: Result<Value, ApiError>,
    ) -> bool {
        let action = {
            let Some(mut entry) = self.inner.store.get_mut(key) else {
                self.inner.metrics.record_discarded(key);
                return false;
            };
            if entry.generation != generation {
                debug!(
                    key = %key,
                    generation,
                    current = entry.generation,
                    "Discarding stale response"
                );
                self.inner.metrics.record_discarded(key);
                return false;
            }
            entry.in_flight = false;
            match result {
                Ok(value) => {
                    entry.data = Some(value);
                    entry.stale = false;
                    entry.error = None;
                    entry.updated_at = Some(Utc::now());
                    CacheAction::Updated
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "Resource fetch failed");
                    self.inner.metrics.record_error(key, FetchKind::Resource);
                    entry.error = Some(err);
                    CacheAction::Failed
                }
            }
        };
        self.emit(key.clone(), action);
        true
    }

    /// Claim the next page of a listing: `(generation, page_index)`. `None`
    /// when a fetch is in flight or the listing is known to be complete.
    pub(crate) fn begin_page_fetch(&self, key: &QueryKey) -> Option<(u64, u32)> {
        let mut entry = self.inner.store.entry(key.clone()).or_default();
        if entry.in_flight || !entry.has_next {
            return None;
        }
        entry.in_flight = true;
        self.inner.metrics.record_fetch(key, FetchKind::Page);
        Some((entry.generation, entry.pages.len() as u32))
    }

    /// Claim a refetch of page 0 that replaces every cached page
    pub(crate) fn begin_refresh(&self, key: &QueryKey) -> Option<u64> {
        let mut entry = self.inner.store.entry(key.clone()).or_default();
        if entry.in_flight {
            return None;
        }
        entry.in_flight = true;
        self.inner.metrics.record_fetch(key, FetchKind::Page);
        Some(entry.generation)
    }

    pub(crate) fn complete_page_fetch(
        &self,
        key: &QueryKey,
        generation: u64,
        index: u32,
        result: Result<Vec<Value>, ApiError>,
    ) -> PageOutcome {
        let page_size = self.inner.config.page_size;
        let outcome = {
            let Some(mut entry) = self.inner.store.get_mut(key) else {
                self.inner.metrics.record_discarded(key);
                return PageOutcome::Discarded;
            };
            // Index 0 on a refresh replaces the listing; otherwise it must
            // extend it exactly.
            let replaces = index == 0;
            if entry.generation != generation || (!replaces && entry.pages.len() as u32 != index) {
                debug!(key = %key, index, "Discarding stale page");
                self.inner.metrics.record_discarded(key);
                return PageOutcome::Discarded;
            }
            entry.in_flight = false;
            match result {
                Ok(items) => {
                    let has_next = items.len() >= page_size;
                    if replaces {
                        entry.pages = vec![items];
                    } else {
                        entry.pages.push(items);
                    }
                    entry.has_next = has_next;
                    entry.stale = false;
                    entry.error = None;
                    entry.updated_at = Some(Utc::now());
                    PageOutcome::Stored { has_next }
                }
                Err(err) => {
                    warn!(key = %key, index, error = %err, "Page fetch failed");
                    self.inner.metrics.record_error(key, FetchKind::Page);
                    entry.error = Some(err.clone());
                    PageOutcome::Failed(err)
                }
            }
        };

        let action = match outcome {
            PageOutcome::Failed(_) => CacheAction::Failed,
            _ => CacheAction::Updated,
        };
        self.emit(key.clone(), action);
        outcome
    }

    /// Store `items` as page 0 of a listing that has nothing cached yet
    pub(crate) fn seed_first_page(&self, key: &QueryKey, items: Vec<Value>) -> bool {
        let page_size = self.inner.config.page_size;
        let seeded = {
            let mut entry = self.inner.store.entry(key.clone()).or_default();
            if !entry.pages.is_empty() || entry.in_flight {
                false
            } else {
                entry.has_next = items.len() >= page_size;
                entry.pages = vec![items];
                entry.updated_at = Some(Utc::now());
                true
            }
        };
        if seeded {
            self.emit(key.clone(), CacheAction::Updated);
        }
        seeded
    }

    /// Register an observer of a listing
    pub(crate) fn attach(&self, key: &QueryKey) {
        self.inner.store.entry(key.clone()).or_default().observers += 1;
    }

    /// Drop an observer; listings nobody observes keep only leading pages
    pub(crate) fn detach(&self, key: &QueryKey) {
        let limit = self.inner.config.stale_page_limit;
        if let Some(mut entry) = self.inner.store.get_mut(key) {
            entry.observers = entry.observers.saturating_sub(1);
            if entry.observers == 0 && entry.trim_pages(limit) {
                debug!(key = %key, limit, "Trimmed inactive listing");
            }
        }
    }

    pub(crate) fn emit(&self, key: QueryKey, action: CacheAction) {
        // No receivers is fine
        let _ = self.inner.events.send(CacheEvent::new(key, action));
    }
}
