//! Route loaders
//!
//! Each [`Route`] declares what it reads. [`Loader::load`] warms those queries
//! into the shared cache before the route is shown, so views only read from
//! the cache and never fetch on their own.

use crate::api::PostFilter;
use crate::queries::Queries;
use crate::session::Session;
use futures::future::{self, BoxFuture, FutureExt};
use instafram_common::ApiError;
use query_cache::{InfiniteQuery, ResourceQuery};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Explore {
        search: Option<String>,
        filter: PostFilter,
    },
    PostDetail {
        id: String,
    },
    Profile {
        id: String,
    },
    Saved,
    Liked,
    EditPost {
        id: String,
    },
    TopCreators,
}

impl Route {
    /// Parse an in-app path such as `/posts/p1` or `/explore?search=cats&filter=week`
    pub fn parse(path: &str) -> Option<Route> {
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let route = match segments.as_slice() {
            [] => Route::Home,
            ["explore"] => {
                let mut search = None;
                let mut filter = PostFilter::All;
                for pair in query.unwrap_or_default().split('&') {
                    let Some((name, value)) = pair.split_once('=') else {
                        continue;
                    };
                    let value = urlencoding::decode(value).ok()?.into_owned();
                    match name {
                        "search" if !value.trim().is_empty() => search = Some(value),
                        "filter" => filter = value.parse().ok()?,
                        _ => {}
                    }
                }
                Route::Explore { search, filter }
            }
            ["posts", id] => Route::PostDetail { id: decode(id)? },
            ["profile", id] => Route::Profile { id: decode(id)? },
            ["update-post", id] => Route::EditPost { id: decode(id)? },
            ["saved"] => Route::Saved,
            ["liked"] => Route::Liked,
            ["all-users"] => Route::TopCreators,
            _ => return None,
        };
        Some(route)
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Explore { search, filter } => {
                let mut path = format!("/explore?filter={}", filter);
                if let Some(search) = search {
                    path.push_str(&format!("&search={}", urlencoding::encode(search)));
                }
                path
            }
            Route::PostDetail { id } => format!("/posts/{}", urlencoding::encode(id)),
            Route::Profile { id } => format!("/profile/{}", urlencoding::encode(id)),
            Route::EditPost { id } => format!("/update-post/{}", urlencoding::encode(id)),
            Route::Saved => "/saved".to_string(),
            Route::Liked => "/liked".to_string(),
            Route::TopCreators => "/all-users".to_string(),
        }
    }

    /// Routes that only make sense for a signed-in user
    pub fn requires_session(&self) -> bool {
        matches!(self, Route::Saved | Route::Liked | Route::EditPost { .. })
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

fn decode(segment: &str) -> Option<String> {
    let id = urlencoding::decode(segment).ok()?.trim().to_string();
    (!id.is_empty()).then_some(id)
}

type Warm = BoxFuture<'static, Result<(), ApiError>>;

fn first_page<T>(query: InfiniteQuery<T>) -> Warm
where
    T: DeserializeOwned + Serialize + Send + 'static,
{
    async move { query.ensure().await.map(|_| ()) }.boxed()
}

fn resource<T>(query: ResourceQuery<T>) -> Warm
where
    T: DeserializeOwned + Serialize + Send + 'static,
{
    async move { query.load().await.map(|_| ()) }.boxed()
}

/// Prefetches everything a route reads
#[derive(Clone)]
pub struct Loader {
    queries: Queries,
    session: Arc<Session>,
}

impl Loader {
    pub fn new(queries: Queries, session: Arc<Session>) -> Self {
        Self { queries, session }
    }

    /// Warm every query `route` reads. Fails with the first error; whatever
    /// arrived before it stays cached.
    pub async fn load(&self, route: &Route) -> Result<(), ApiError> {
        let warms = self.plan(route)?;
        debug!(route = %route, queries = warms.len(), "Loading route");

        future::try_join_all(warms).await?;
        info!(route = %route, "Route loaded");
        Ok(())
    }

    fn plan(&self, route: &Route) -> Result<Vec<Warm>, ApiError> {
        let q = &self.queries;
        let warms = match route {
            Route::Home => vec![first_page(q.feed()), resource(q.top_creators())],
            Route::Explore { search, filter } => {
                vec![first_page(q.explore(search.as_deref(), *filter))]
            }
            Route::PostDetail { id } => vec![
                resource(q.post(id)),
                resource(q.related_posts(id)),
                first_page(q.comments(id)),
            ],
            Route::Profile { id } => vec![resource(q.user(id)), first_page(q.user_posts(id))],
            Route::Saved => vec![first_page(q.saved_posts(&self.session.require_user()?))],
            Route::Liked => vec![first_page(q.liked_posts(&self.session.require_user()?))],
            Route::EditPost { id } => {
                self.session.require_user()?;
                vec![resource(q.post(id))]
            }
            Route::TopCreators => vec![resource(q.top_creators())],
        };
        Ok(warms)
    }
}
