//! Scroll-driven page loading
//!
//! Views report their scroll position; the next page is requested once the
//! bottom of the content comes within a threshold of the viewport.

use instafram_common::ApiError;
use query_cache::InfiniteQuery;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

/// Distance from the bottom, in content units, that triggers the next page
pub const DEFAULT_THRESHOLD: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub scroll_offset: f64,
    pub viewport_height: f64,
    pub content_height: f64,
}

impl Viewport {
    pub fn new(scroll_offset: f64, viewport_height: f64, content_height: f64) -> Self {
        Self {
            scroll_offset,
            viewport_height,
            content_height,
        }
    }

    /// Content left below the visible area
    pub fn distance_to_bottom(&self) -> f64 {
        (self.content_height - self.scroll_offset - self.viewport_height).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollTrigger {
    pub threshold: f64,
}

impl Default for ScrollTrigger {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl ScrollTrigger {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn should_fetch(&self, viewport: &Viewport, has_next: bool, in_flight: bool) -> bool {
        has_next && !in_flight && viewport.distance_to_bottom() <= self.threshold
    }

    /// Fetch the next page of `query` when the viewport is near its end
    pub async fn on_scroll<T>(
        &self,
        viewport: &Viewport,
        query: &InfiniteQuery<T>,
    ) -> Result<bool, ApiError>
    where
        T: DeserializeOwned + Serialize + Send + 'static,
    {
        if !self.should_fetch(viewport, query.has_next(), query.is_fetching()) {
            return Ok(false);
        }
        debug!(key = %query.key(), distance = viewport.distance_to_bottom(), "Near end of listing");
        query.fetch_next().await
    }
}
