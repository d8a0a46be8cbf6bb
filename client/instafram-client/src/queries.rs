//! Query factory
//!
//! Binds every cache key to the API call that fills it, so views and loaders
//! never pair keys and fetchers by hand.

use crate::api::{Api, PostFilter};
use crate::threads::ReplyThread;
use instafram_common::{ApiError, Comment, Post, User};
use query_cache::{InfiniteQuery, Keys, QueryCache, QueryKey, ResourceQuery};
use std::future::Future;

#[derive(Clone)]
pub struct Queries {
    api: Api,
    cache: QueryCache,
}

impl Queries {
    pub fn new(api: Api, cache: QueryCache) -> Self {
        Self { api, cache }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    fn post_pages<F, Fut>(&self, call: F) -> impl Fn(u32) -> Fut + Send + Sync + 'static
    where
        F: Fn(Api, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Post>, ApiError>> + Send + 'static,
    {
        let api = self.api.clone();
        move |page| call(api.clone(), page)
    }

    fn listing<F, Fut>(&self, key: QueryKey, call: F) -> InfiniteQuery<Post>
    where
        F: Fn(Api, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Post>, ApiError>> + Send + 'static,
    {
        InfiniteQuery::new(self.cache.clone(), key, self.post_pages(call))
    }

    // ===== Post listings =====

    pub fn feed(&self) -> InfiniteQuery<Post> {
        self.listing(Keys::feed(), |api, page| async move { api.posts().feed(page).await })
    }

    pub fn top_posts(&self, filter: PostFilter) -> InfiniteQuery<Post> {
        self.listing(Keys::top_posts(filter.as_str()), move |api, page| async move {
            api.posts().top(filter, page).await
        })
    }

    pub fn search(&self, search: &str, filter: PostFilter) -> InfiniteQuery<Post> {
        let term = search.trim().to_string();
        self.listing(Keys::search(&term, filter.as_str()), move |api, page| {
            let term = term.clone();
            async move { api.posts().search(&term, filter, page).await }
        })
    }

    /// Search when a term is given, top posts otherwise
    pub fn explore(&self, search: Option<&str>, filter: PostFilter) -> InfiniteQuery<Post> {
        match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => self.search(term, filter),
            None => self.top_posts(filter),
        }
    }

    /// Point an explore listing at new parameters; the sequence starts empty
    /// unless the new key is already cached
    pub fn retarget_explore(
        &self,
        query: &mut InfiniteQuery<Post>,
        search: Option<&str>,
        filter: PostFilter,
    ) {
        match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => {
                let key = Keys::search(term, filter.as_str());
                let term = term.to_string();
                let fetch = self.post_pages(move |api, page| {
                    let term = term.clone();
                    async move { api.posts().search(&term, filter, page).await }
                });
                query.set_key(key, fetch);
            }
            None => {
                let fetch = self.post_pages(move |api, page| async move {
                    api.posts().top(filter, page).await
                });
                query.set_key(Keys::top_posts(filter.as_str()), fetch);
            }
        }
    }

    pub fn user_posts(&self, user_id: &str) -> InfiniteQuery<Post> {
        let id = user_id.to_string();
        self.listing(Keys::user_posts(user_id), move |api, page| {
            let id = id.clone();
            async move { api.posts().by_user(&id, page).await }
        })
    }

    pub fn saved_posts(&self, user_id: &str) -> InfiniteQuery<Post> {
        let id = user_id.to_string();
        self.listing(Keys::saved_posts(user_id), move |api, page| {
            let id = id.clone();
            async move { api.posts().saved(&id, page).await }
        })
    }

    pub fn liked_posts(&self, user_id: &str) -> InfiniteQuery<Post> {
        let id = user_id.to_string();
        self.listing(Keys::liked_posts(user_id), move |api, page| {
            let id = id.clone();
            async move { api.posts().liked(&id, page).await }
        })
    }

    // ===== Comments =====

    pub fn comments(&self, post_id: &str) -> InfiniteQuery<Comment> {
        let api = self.api.clone();
        let id = post_id.to_string();
        InfiniteQuery::new(self.cache.clone(), Keys::comments(post_id), move |page| {
            let api = api.clone();
            let id = id.clone();
            async move { api.comments().for_post(&id, page).await }
        })
    }

    pub fn replies(&self, parent: Comment) -> Result<ReplyThread, ApiError> {
        ReplyThread::new(self.cache.clone(), self.api.comments().clone(), parent)
    }

    // ===== Single resources =====

    pub fn post(&self, post_id: &str) -> ResourceQuery<Post> {
        let api = self.api.clone();
        ResourceQuery::by_id(self.cache.clone(), post_id, Keys::post, move |id| {
            let api = api.clone();
            async move { api.posts().get(&id).await }
        })
    }

    pub fn related_posts(&self, post_id: &str) -> ResourceQuery<Vec<Post>> {
        let api = self.api.clone();
        ResourceQuery::by_id(self.cache.clone(), post_id, Keys::related_posts, move |id| {
            let api = api.clone();
            async move { api.posts().related(&id).await }
        })
    }

    pub fn user(&self, user_id: &str) -> ResourceQuery<User> {
        let api = self.api.clone();
        ResourceQuery::by_id(self.cache.clone(), user_id, Keys::user, move |id| {
            let api = api.clone();
            async move { api.users().get(&id).await }
        })
    }

    pub fn current_user(&self) -> ResourceQuery<User> {
        let api = self.api.clone();
        ResourceQuery::new(self.cache.clone(), Keys::current_user(), true, move || {
            let api = api.clone();
            async move { api.auth().me().await }
        })
    }

    pub fn top_creators(&self) -> ResourceQuery<Vec<User>> {
        let api = self.api.clone();
        ResourceQuery::new(self.cache.clone(), Keys::top_creators(), true, move || {
            let api = api.clone();
            async move { api.users().top_creators().await }
        })
    }
}
