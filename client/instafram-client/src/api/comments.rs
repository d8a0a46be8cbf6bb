//! Comment endpoints

use super::{fetch, path};
use crate::forms::{self, CommentForm};
use crate::transport::{ApiRequest, Transport};
use instafram_common::{ApiError, Comment, NewComment};
use std::sync::Arc;

#[derive(Clone)]
pub struct CommentsApi {
    transport: Arc<dyn Transport>,
}

impl CommentsApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Top-level comments of a post, each with its first page of replies
    pub async fn for_post(&self, post_id: &str, page: u32) -> Result<Vec<Comment>, ApiError> {
        fetch(&*self.transport, ApiRequest::get(path("/comments", post_id)).page(page)).await
    }

    pub async fn replies(&self, comment_id: &str, page: u32) -> Result<Vec<Comment>, ApiError> {
        let request = ApiRequest::get(path("/comments/replies", comment_id)).page(page);
        fetch(&*self.transport, request).await
    }

    pub async fn create(&self, comment: &NewComment) -> Result<Comment, ApiError> {
        forms::check(&CommentForm::from(comment))?;
        fetch(&*self.transport, ApiRequest::post("/comments").json(comment)?).await
    }
}
