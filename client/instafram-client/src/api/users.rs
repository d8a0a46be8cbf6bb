//! User endpoints

use super::{acknowledge, fetch, path};
use crate::forms::{self, ProfileForm};
use crate::transport::{ApiRequest, Transport};
use instafram_common::{ApiError, User};
use std::sync::Arc;

#[derive(Clone)]
pub struct UsersApi {
    transport: Arc<dyn Transport>,
}

impl UsersApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn get(&self, user_id: &str) -> Result<User, ApiError> {
        fetch(&*self.transport, ApiRequest::get(path("/users", user_id))).await
    }

    pub async fn top_creators(&self) -> Result<Vec<User>, ApiError> {
        fetch(&*self.transport, ApiRequest::get("/users/top-creators")).await
    }

    /// Update the signed-in user's profile
    pub async fn update(&self, form: &ProfileForm) -> Result<User, ApiError> {
        forms::check(form)?;
        let (fields, files) = form.to_multipart();
        fetch(&*self.transport, ApiRequest::put("/users/update").multipart(fields, files)).await
    }

    /// Flip the caller's follow of `user_id` on the server
    pub async fn follow(&self, user_id: &str) -> Result<(), ApiError> {
        acknowledge(&*self.transport, ApiRequest::post(path("/users/follow", user_id))).await
    }
}
