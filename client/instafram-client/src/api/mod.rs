//! Typed REST client
//!
//! One client per backend resource, all sharing a [`Transport`]. Every call
//! unwraps the response envelope; non-success envelopes become
//! [`ApiError::Rejected`] carrying the structured error code.

pub mod auth;
pub mod comments;
pub mod posts;
pub mod users;

pub use auth::AuthApi;
pub use comments::CommentsApi;
pub use posts::{PostFilter, PostsApi};
pub use users::UsersApi;

use crate::transport::{ApiRequest, Transport};
use instafram_common::ApiError;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Send `request` and decode the envelope payload as `T`
pub(crate) async fn fetch<T: DeserializeOwned>(
    transport: &dyn Transport,
    request: ApiRequest,
) -> Result<T, ApiError> {
    let value = transport.send(request).await?.into_result()?;
    Ok(serde_json::from_value(value)?)
}

/// Send `request`, only checking that it succeeded
pub(crate) async fn acknowledge(
    transport: &dyn Transport,
    request: ApiRequest,
) -> Result<(), ApiError> {
    transport.send(request).await?.into_ack()
}

/// Segment-safe path building for user-supplied IDs
pub(crate) fn path(prefix: &str, id: &str) -> String {
    format!("{}/{}", prefix, urlencoding::encode(id))
}

/// Every resource client over one transport
#[derive(Clone)]
pub struct Api {
    auth: AuthApi,
    posts: PostsApi,
    users: UsersApi,
    comments: CommentsApi,
}

impl Api {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            auth: AuthApi::new(transport.clone()),
            posts: PostsApi::new(transport.clone()),
            users: UsersApi::new(transport.clone()),
            comments: CommentsApi::new(transport),
        }
    }

    pub fn auth(&self) -> &AuthApi {
        &self.auth
    }

    pub fn posts(&self) -> &PostsApi {
        &self.posts
    }

    pub fn users(&self) -> &UsersApi {
        &self.users
    }

    pub fn comments(&self) -> &CommentsApi {
        &self.comments
    }
}
