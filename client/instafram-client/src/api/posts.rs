//! Post endpoints

use super::{acknowledge, fetch, path};
use crate::forms::{self, PostForm};
use crate::transport::{ApiRequest, Transport};
use instafram_common::{ApiError, Post};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Time window of the top-posts and search listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PostFilter {
    #[default]
    All,
    Day,
    Week,
    Month,
    Year,
}

impl PostFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostFilter::All => "all",
            PostFilter::Day => "day",
            PostFilter::Week => "week",
            PostFilter::Month => "month",
            PostFilter::Year => "year",
        }
    }
}

impl fmt::Display for PostFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostFilter {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "all" => Ok(PostFilter::All),
            "day" | "today" => Ok(PostFilter::Day),
            "week" => Ok(PostFilter::Week),
            "month" => Ok(PostFilter::Month),
            "year" => Ok(PostFilter::Year),
            other => Err(ApiError::Validation(format!("unknown filter: {}", other))),
        }
    }
}

#[derive(Clone)]
pub struct PostsApi {
    transport: Arc<dyn Transport>,
}

impl PostsApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// General feed, newest first
    pub async fn feed(&self, page: u32) -> Result<Vec<Post>, ApiError> {
        fetch(&*self.transport, ApiRequest::get("/posts").page(page)).await
    }

    pub async fn get(&self, post_id: &str) -> Result<Post, ApiError> {
        fetch(&*self.transport, ApiRequest::get(path("/posts", post_id))).await
    }

    pub async fn top(&self, filter: PostFilter, page: u32) -> Result<Vec<Post>, ApiError> {
        let request = ApiRequest::get("/posts/top")
            .page(page)
            .query("filter", filter);
        fetch(&*self.transport, request).await
    }

    pub async fn search(
        &self,
        search: &str,
        filter: PostFilter,
        page: u32,
    ) -> Result<Vec<Post>, ApiError> {
        let request = ApiRequest::get("/posts/search")
            .query("search", search)
            .query("filter", filter)
            .page(page);
        fetch(&*self.transport, request).await
    }

    pub async fn by_user(&self, user_id: &str, page: u32) -> Result<Vec<Post>, ApiError> {
        fetch(&*self.transport, ApiRequest::get(path("/posts/user", user_id)).page(page)).await
    }

    pub async fn saved(&self, user_id: &str, page: u32) -> Result<Vec<Post>, ApiError> {
        fetch(&*self.transport, ApiRequest::get(path("/posts/saved", user_id)).page(page)).await
    }

    pub async fn liked(&self, user_id: &str, page: u32) -> Result<Vec<Post>, ApiError> {
        fetch(&*self.transport, ApiRequest::get(path("/posts/liked", user_id)).page(page)).await
    }

    pub async fn related(&self, post_id: &str) -> Result<Vec<Post>, ApiError> {
        let request = ApiRequest::get(format!("{}/related", path("/posts", post_id)));
        fetch(&*self.transport, request).await
    }

    pub async fn create(&self, form: &PostForm) -> Result<Post, ApiError> {
        forms::check(form)?;
        let (fields, files) = form.to_multipart();
        debug!(files = files.len(), "Creating post");
        fetch(&*self.transport, ApiRequest::post("/posts").multipart(fields, files)).await
    }

    pub async fn update(&self, post_id: &str, form: &PostForm) -> Result<Post, ApiError> {
        forms::check(form)?;
        let (fields, files) = form.to_multipart();
        let request = ApiRequest::put(path("/posts", post_id)).multipart(fields, files);
        fetch(&*self.transport, request).await
    }

    pub async fn delete(&self, post_id: &str) -> Result<(), ApiError> {
        acknowledge(&*self.transport, ApiRequest::delete(path("/posts", post_id))).await
    }

    /// Flip the caller's like on the server
    pub async fn like(&self, post_id: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post(format!("{}/like", path("/posts", post_id)));
        acknowledge(&*self.transport, request).await
    }

    /// Flip the caller's save on the server
    pub async fn save(&self, post_id: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post(format!("{}/save", path("/posts", post_id)));
        acknowledge(&*self.transport, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{ok, MockTransport};
    use crate::transport::{Body, Method};
    use instafram_common::{Envelope, ErrorCode, Visibility};
    use serde_json::json;

    fn post_json(id: &str) -> serde_json::Value {
        json!({ "_id": id, "content": "hello", "creator": "u1" })
    }

    #[tokio::test]
    async fn test_search_request_shape() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|req| {
                req.method == Method::Get
                    && req.path == "/posts/search"
                    && req.query_param("search") == Some("cats")
                    && req.query_param("filter") == Some("week")
                    && req.query_param("page") == Some("3")
            })
            .times(1)
            .returning(|_| ok(json!([post_json("p1")])));

        let api = PostsApi::new(Arc::new(transport));
        let posts = api.search("cats", PostFilter::Week, 3).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "p1");
    }

    #[tokio::test]
    async fn test_like_posts_to_like_route() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|req| req.method == Method::Post && req.path == "/posts/p9/like")
            .times(1)
            .returning(|_| ok(json!(null)));

        let api = PostsApi::new(Arc::new(transport));
        tokio_test::assert_ok!(api.like("p9").await);
    }

    #[tokio::test]
    async fn test_rejection_keeps_code() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .returning(|_| Ok(Envelope::error(404, None, "Post not found")));

        let api = PostsApi::new(Arc::new(transport));
        let err = api.get("missing").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(err.status_code(), Some(404));
    }

    #[tokio::test]
    async fn test_create_sends_multipart() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|req| match &req.body {
                Body::Multipart { fields, files } => {
                    req.path == "/posts"
                        && fields.iter().any(|(k, v)| k == "visibility" && v == "Followers")
                        && fields.iter().any(|(k, v)| k == "tags" && v == "sky,sea")
                        && files.len() == 1
                }
                _ => false,
            })
            .times(1)
            .returning(|_| ok(post_json("p2")));

        let form = PostForm {
            content: "Beach day".to_string(),
            location: Some("Lisbon".to_string()),
            tags: "sky, sea".to_string(),
            visibility: Visibility::Followers,
            image: Some(forms::ImageUpload {
                file_name: "beach.jpg".to_string(),
                mime: "image/jpeg".to_string(),
                bytes: vec![0xff, 0xd8],
            }),
        };

        let api = PostsApi::new(Arc::new(transport));
        assert_eq!(api.create(&form).await.unwrap().id, "p2");
    }

    #[tokio::test]
    async fn test_invalid_form_never_sends() {
        let mut transport = MockTransport::new();
        transport.expect_send().times(0);

        let form = PostForm {
            content: "x".repeat(3000),
            ..PostForm::default()
        };
        let api = PostsApi::new(Arc::new(transport));
        assert!(matches!(api.create(&form).await, Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!("Week".parse::<PostFilter>().unwrap(), PostFilter::Week);
        assert_eq!("".parse::<PostFilter>().unwrap(), PostFilter::All);
        assert!("decade".parse::<PostFilter>().is_err());
    }
}
