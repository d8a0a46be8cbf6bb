//! Query key schema
//!
//! A key is the full dependency tuple of a query: the resource path plus every
//! filter or search parameter. Invalidation matches on key prefixes, so
//! `["posts"]` covers every post listing while `["post", id]` names one post.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered tuple of key segments
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Append a segment
    pub fn with(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    /// True when `prefix` matches the leading segments of this key
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0.iter().zip(&prefix.0).all(|(a, b)| a == b)
    }

    /// First segment, used for metrics labels
    pub fn resource(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or("unknown")
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(":"))
    }
}

impl<const N: usize> From<[&str; N]> for QueryKey {
    fn from(segments: [&str; N]) -> Self {
        Self::new(segments)
    }
}

/// Key builders for every InstaFram query
pub struct Keys;

impl Keys {
    // ============= Post Keys =============

    /// Single post
    /// Format: post:{post_id}
    pub fn post(post_id: &str) -> QueryKey {
        QueryKey::from(["post", post_id])
    }

    /// Prefix of every post listing
    pub fn post_lists() -> QueryKey {
        QueryKey::from(["posts"])
    }

    /// General feed
    /// Format: posts:feed
    pub fn feed() -> QueryKey {
        QueryKey::from(["posts", "feed"])
    }

    /// Top posts under a filter
    /// Format: posts:top:{filter}
    pub fn top_posts(filter: &str) -> QueryKey {
        Self::top_posts_all().with(filter)
    }

    /// Prefix of every top-posts filter
    pub fn top_posts_all() -> QueryKey {
        QueryKey::from(["posts", "top"])
    }

    /// Search results
    /// Format: posts:search:{search}:{filter}
    pub fn search(search: &str, filter: &str) -> QueryKey {
        QueryKey::from(["posts", "search", search, filter])
    }

    /// Posts created by a user
    pub fn user_posts(user_id: &str) -> QueryKey {
        QueryKey::from(["posts", "user", user_id])
    }

    /// Posts saved by a user
    pub fn saved_posts(user_id: &str) -> QueryKey {
        QueryKey::from(["posts", "saved", user_id])
    }

    /// Prefix of every saved-posts listing
    pub fn saved_posts_all() -> QueryKey {
        QueryKey::from(["posts", "saved"])
    }

    /// Posts liked by a user
    pub fn liked_posts(user_id: &str) -> QueryKey {
        QueryKey::from(["posts", "liked", user_id])
    }

    /// Posts related to a post
    pub fn related_posts(post_id: &str) -> QueryKey {
        QueryKey::from(["posts", "related", post_id])
    }

    // ============= User Keys =============

    /// User profile
    /// Format: user:{user_id}
    pub fn user(user_id: &str) -> QueryKey {
        QueryKey::from(["user", user_id])
    }

    /// Signed-in user
    pub fn current_user() -> QueryKey {
        QueryKey::from(["session", "me"])
    }

    /// Top creators listing
    pub fn top_creators() -> QueryKey {
        QueryKey::from(["users", "top-creators"])
    }

    // ============= Comment Keys =============

    /// Top-level comments of a post
    /// Format: comments:{post_id}
    pub fn comments(post_id: &str) -> QueryKey {
        QueryKey::from(["comments", post_id])
    }

    /// Reply pages of a comment
    /// Format: comments:replies:{comment_id}
    pub fn replies(comment_id: &str) -> QueryKey {
        QueryKey::from(["comments", "replies", comment_id])
    }
}
