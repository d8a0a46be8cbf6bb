//! Cache change notification
//!
//! Every mutation of the cache is broadcast as a [`CacheEvent`]. Views hold a
//! [`KeyWatcher`] for the keys they render and re-read (refetching stale
//! entries) when an event for one of them arrives.
//!
//! ```text
//! mutation settles
//!   -> cache.invalidate(["posts"])        marks entries stale
//!   -> CacheEvent { key, Invalidated }    broadcast to every watcher
//!   -> watcher for ["posts", "feed"]      wakes, view calls refresh()
//!   -> watcher for ["user", "u1"]         not woken
//! ```

use crate::{CacheResult, QueryCache, QueryKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What happened to an entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CacheAction {
    /// New data stored (fetch, optimistic edit, direct set)
    Updated,
    /// Marked stale; the next read refetches
    Invalidated,
    /// Entry dropped
    Removed,
    /// A fetch for the entry failed; cached data is untouched
    Failed,
}

/// Cache change notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEvent {
    pub key: QueryKey,
    pub action: CacheAction,
    pub timestamp: DateTime<Utc>,
}

impl CacheEvent {
    pub fn new(key: QueryKey, action: CacheAction) -> Self {
        Self {
            key,
            action,
            timestamp: Utc::now(),
        }
    }

    /// Whether a watcher of `prefix` cares about this event
    pub fn concerns(&self, prefix: &QueryKey) -> bool {
        self.key.starts_with(prefix)
    }
}

/// Receiver filtered to one key prefix
pub struct KeyWatcher {
    prefix: QueryKey,
    rx: broadcast::Receiver<CacheEvent>,
}

impl KeyWatcher {
    pub fn prefix(&self) -> &QueryKey {
        &self.prefix
    }

    /// Wait for the next event under the watched prefix. Returns `None` once
    /// the cache is gone.
    pub async fn changed(&mut self) -> Option<CacheEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.concerns(&self.prefix) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    // Missed events may have touched us; report a conservative invalidation
                    warn!(prefix = %self.prefix, skipped, "Cache watcher lagged");
                    return Some(CacheEvent::new(self.prefix.clone(), CacheAction::Invalidated));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll of pending events under the watched prefix
    pub fn try_changed(&mut self) -> Option<CacheEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.concerns(&self.prefix) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    return Some(CacheEvent::new(self.prefix.clone(), CacheAction::Invalidated));
                }
                Err(_) => return None,
            }
        }
    }
}

impl QueryCache {
    /// Raw event stream of every key
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Events under `prefix` only
    pub fn watch(&self, prefix: QueryKey) -> KeyWatcher {
        KeyWatcher {
            prefix,
            rx: self.subscribe(),
        }
    }

    /// Run `callback` for every event under `prefix` on a background task
    ///
    /// Returns the task handle; abort it to stop listening.
    pub fn on_event<F, Fut>(&self, prefix: QueryKey, callback: F) -> JoinHandle<()>
    where
        F: Fn(CacheEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CacheResult<()>> + Send + 'static,
    {
        let mut watcher = self.watch(prefix);
        let callback = Arc::new(callback);

        info!(prefix = %watcher.prefix(), "Subscribed to cache events");

        tokio::spawn(async move {
            while let Some(event) = watcher.changed().await {
                debug!(key = %event.key, action = ?event.action, "Received cache event");

                let callback = Arc::clone(&callback);
                if let Err(e) = callback(event.clone()).await {
                    error!(error = %e, key = %event.key, "Callback execution failed");
                }
            }

            warn!(prefix = %watcher.prefix(), "Cache event subscription ended");
        })
    }
}
