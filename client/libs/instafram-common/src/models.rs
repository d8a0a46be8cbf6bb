//! Shared data models for the InstaFram REST contract
//!
//! Every entity is owned by the backend. The client only holds read-through
//! copies, so all collections default to empty when the server omits them.

use crate::error::{ApiError, ErrorCode, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// RESPONSE ENVELOPE
// ============================================================================

/// Wrapper every API response uses
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub message: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(default)]
    pub metadata: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(status: u16, message: impl Into<String>, metadata: T) -> Self {
        Self {
            message: message.into(),
            status,
            code: None,
            metadata: Some(metadata),
        }
    }

    pub fn error(status: u16, code: Option<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status,
            code,
            metadata: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Unwrap the payload, turning non-success envelopes into rejections
    pub fn into_result(self) -> Result<T> {
        if !self.is_success() {
            return Err(ApiError::rejected(self.status, self.code, self.message));
        }
        self.metadata
            .ok_or_else(|| ApiError::Decode(format!("envelope without metadata: {}", self.message)))
    }

    /// Accept a success envelope whose payload is irrelevant
    pub fn into_ack(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(ApiError::rejected(self.status, self.code, self.message))
        }
    }
}

// ============================================================================
// REFERENCES
// ============================================================================

/// Entities addressable by their backend `_id`
pub trait Identified {
    fn id(&self) -> &str;
}

/// A reference the backend sends either as a bare ID or a populated document
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Ref<T> {
    Id(String),
    Doc(Box<T>),
}

impl<T: Identified> Ref<T> {
    pub fn id(&self) -> &str {
        match self {
            Ref::Id(id) => id,
            Ref::Doc(doc) => doc.id(),
        }
    }

    pub fn doc(&self) -> Option<&T> {
        match self {
            Ref::Id(_) => None,
            Ref::Doc(doc) => Some(doc),
        }
    }
}

impl<T> From<&str> for Ref<T> {
    fn from(id: &str) -> Self {
        Ref::Id(id.to_string())
    }
}

// ============================================================================
// USERS
// ============================================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub followers: Vec<String>,
    #[serde(default)]
    pub following: Vec<String>,
    #[serde(default)]
    pub posts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// Alias for routing and display, falling back to the ID
    pub fn handle(&self) -> &str {
        match self.alias.as_deref() {
            Some(alias) if !alias.trim().is_empty() => alias,
            _ => &self.id,
        }
    }

    pub fn is_followed_by(&self, user_id: &str) -> bool {
        self.followers.iter().any(|id| id == user_id)
    }

    pub fn follows(&self, user_id: &str) -> bool {
        self.following.iter().any(|id| id == user_id)
    }

    /// Flip `user_id` in this user's followers; returns the new membership
    pub fn toggle_follower(&mut self, user_id: &str) -> bool {
        toggle_member(&mut self.followers, user_id)
    }

    /// Flip `user_id` in this user's following; returns the new membership
    pub fn toggle_following(&mut self, user_id: &str) -> bool {
        toggle_member(&mut self.following, user_id)
    }
}

fn toggle_member(ids: &mut Vec<String>, id: &str) -> bool {
    if ids.iter().any(|x| x == id) {
        ids.retain(|x| x != id);
        false
    } else {
        ids.push(id.to_string());
        true
    }
}

impl Identified for User {
    fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// POSTS
// ============================================================================

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Followers,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "Public"),
            Visibility::Private => write!(f, "Private"),
            Visibility::Followers => write!(f, "Followers"),
        }
    }
}

impl FromStr for Visibility {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "followers" => Ok(Visibility::Followers),
            other => Err(ApiError::Validation(format!("unknown visibility: {}", other))),
        }
    }
}

/// A user + post pair recorded when a post is saved
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Save {
    pub user: Ref<User>,
    pub post: Ref<Post>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub likes: Vec<Ref<User>>,
    #[serde(default)]
    pub saves: Vec<Save>,
    /// Full comment list; its length is authoritative even when only IDs are sent
    #[serde(default)]
    pub comments: Vec<Ref<Comment>>,
    pub creator: Ref<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|r| r.id() == user_id)
    }

    pub fn saved_by(&self, user_id: &str) -> bool {
        self.saves.iter().any(|s| s.user.id() == user_id)
    }

    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    /// Flip `user_id`'s like; returns the new membership
    pub fn toggle_like(&mut self, user_id: &str) -> bool {
        if self.liked_by(user_id) {
            self.likes.retain(|r| r.id() != user_id);
            false
        } else {
            self.likes.push(Ref::from(user_id));
            true
        }
    }

    /// Flip `user_id`'s save; returns the new membership
    pub fn toggle_save(&mut self, user_id: &str) -> bool {
        if self.saved_by(user_id) {
            self.saves.retain(|s| s.user.id() != user_id);
            false
        } else {
            self.saves.push(Save {
                user: Ref::from(user_id),
                post: Ref::Id(self.id.clone()),
            });
            true
        }
    }
}

impl Identified for Post {
    fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// COMMENTS
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub content: String,
    pub author: Ref<User>,
    pub post: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub likes: Vec<Ref<User>>,
    /// First page of replies embedded by the server
    #[serde(default)]
    pub replies: Vec<Comment>,
    #[serde(default)]
    pub is_child: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_replies: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Comment {
    /// Authoritative reply count
    pub fn reply_total(&self) -> u32 {
        self.total_replies.unwrap_or(self.replies.len() as u32)
    }

    /// Replies not yet loaded, given how many are on screen
    pub fn remaining_replies(&self, loaded: usize) -> u32 {
        self.reply_total().saturating_sub(loaded as u32)
    }
}

impl Identified for Comment {
    fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// PAGINATION
// ============================================================================

/// Fixed page size of every paginated endpoint; a shorter page ends a listing
pub const PAGE_SIZE: usize = 10;

// ============================================================================
// AUTH
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Registration {
    pub name: String,
    pub alias: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Payload of a successful login or registration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthPayload {
    pub user: User,
    pub tokens: Tokens,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmailCheck {
    pub email: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmailAvailability {
    pub exists: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmailVerification {
    pub email: String,
    pub otp: String,
}

// ============================================================================
// WRITE PAYLOADS
// ============================================================================

/// Body of `POST /comments`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub post_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post_json() -> serde_json::Value {
        json!({
            "_id": "p1",
            "content": "sunset",
            "visibility": "Followers",
            "tags": ["sky"],
            "likes": ["u1", {"_id": "u2", "name": "Bea"}],
            "saves": [{"user": "u3", "post": "p1"}],
            "comments": ["c1", "c2", "c3"],
            "creator": {"_id": "u9", "name": "Cam", "alias": "cam"},
            "createdAt": "2024-05-01T10:00:00Z"
        })
    }

    #[test]
    fn test_post_decodes_mixed_refs() {
        let post: Post = serde_json::from_value(post_json()).unwrap();
        assert_eq!(post.visibility, Visibility::Followers);
        assert!(post.liked_by("u1"));
        assert!(post.liked_by("u2"));
        assert!(post.saved_by("u3"));
        assert_eq!(post.comment_count(), 3);
        assert_eq!(post.creator.doc().map(|u| u.handle()), Some("cam"));
    }

    #[test]
    fn test_toggle_like_is_a_flip() {
        let mut post: Post = serde_json::from_value(post_json()).unwrap();
        assert!(post.toggle_like("u7"));
        assert!(post.liked_by("u7"));
        assert!(!post.toggle_like("u7"));
        assert_eq!(post.like_count(), 2);
    }

    #[test]
    fn test_handle_falls_back_to_id() {
        let mut user = User {
            id: "u1".into(),
            ..Default::default()
        };
        assert_eq!(user.handle(), "u1");
        user.alias = Some("  ".into());
        assert_eq!(user.handle(), "u1");
        user.alias = Some("ana".into());
        assert_eq!(user.handle(), "ana");
    }

    #[test]
    fn test_follow_toggles() {
        let mut user = User {
            id: "u1".into(),
            followers: vec!["u2".into()],
            ..Default::default()
        };
        assert!(!user.toggle_follower("u2"));
        assert!(!user.is_followed_by("u2"));
        assert!(user.toggle_following("u3"));
        assert!(user.follows("u3"));
    }

    #[test]
    fn test_envelope_rejection_uses_code() {
        let env: Envelope<User> = serde_json::from_value(json!({
            "message": "Email is already exist",
            "status": 409,
            "code": "EMAIL_ALREADY_EXISTS"
        }))
        .unwrap();

        let err = env.into_result().unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmailAlreadyExists);
    }

    #[test]
    fn test_envelope_success_without_metadata() {
        let env: Envelope<User> =
            serde_json::from_value(json!({"message": "ok", "status": 200})).unwrap();
        assert!(matches!(env.clone().into_result(), Err(ApiError::Decode(_))));
        assert!(env.into_ack().is_ok());
    }

    #[test]
    fn test_reply_counts() {
        let comment: Comment = serde_json::from_value(json!({
            "_id": "c1",
            "content": "nice",
            "author": "u1",
            "post": "p1",
            "replies": [
                {"_id": "r1", "author": "u2", "post": "p1", "isChild": true}
            ],
            "totalReplies": 14
        }))
        .unwrap();

        assert_eq!(comment.reply_total(), 14);
        assert_eq!(comment.remaining_replies(1), 13);
        assert_eq!(comment.remaining_replies(20), 0);
        assert!(comment.replies[0].is_child);
    }
}
