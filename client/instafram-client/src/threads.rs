//! Reply threads under a comment
//!
//! Comments arrive with their first replies embedded. A [`ReplyThread`] seeds
//! those as the first page and pages further replies from the server until the
//! parent's reply total is reached.

use crate::api::CommentsApi;
use instafram_common::{ApiError, Comment};
use query_cache::{InfiniteQuery, Keys, QueryCache};
use tracing::debug;

pub struct ReplyThread {
    parent: Comment,
    query: InfiniteQuery<Comment>,
}

impl ReplyThread {
    pub fn new(cache: QueryCache, api: CommentsApi, parent: Comment) -> Result<Self, ApiError> {
        let parent_id = parent.id.clone();
        let query = InfiniteQuery::new(cache, Keys::replies(&parent.id), move |page| {
            let api = api.clone();
            let id = parent_id.clone();
            async move { api.replies(&id, page).await }
        });

        if !parent.replies.is_empty() && query.seed(&parent.replies)? {
            debug!(comment = %parent.id, embedded = parent.replies.len(), "Seeded reply thread");
        }

        Ok(Self { parent, query })
    }

    pub fn parent(&self) -> &Comment {
        &self.parent
    }

    pub fn replies(&self) -> Vec<Comment> {
        self.query.data()
    }

    pub fn loaded(&self) -> usize {
        self.replies().len()
    }

    /// Replies the server holds beyond those loaded
    pub fn remaining(&self) -> u32 {
        self.parent.remaining_replies(self.loaded())
    }

    pub fn has_more(&self) -> bool {
        self.query.has_next() && self.remaining() > 0
    }

    pub fn is_loading(&self) -> bool {
        self.query.is_fetching()
    }

    /// Load the next page of replies. Returns whether a request was issued.
    pub async fn load_more(&self) -> Result<bool, ApiError> {
        if !self.has_more() {
            return Ok(false);
        }
        self.query.fetch_next().await
    }
}
