//! In-process fake of the InstaFram backend
//!
//! Holds posts, users and comments in memory and answers the REST routes the
//! client uses. Writes can be held at a gate or made to fail.

#![allow(dead_code)]

use async_trait::async_trait;
use instafram_client::transport::{ApiRequest, Body, Method, Transport};
use instafram_client::{ClientConfig, InstaFram, Session};
use instafram_common::{
    ApiError, Comment, Envelope, ErrorCode, Post, Ref, Tokens, User, PAGE_SIZE,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub const ME: &str = "me";

#[derive(Default)]
struct State {
    posts: Vec<Post>,
    users: Vec<User>,
    comments: Vec<Comment>,
}

pub struct FakeServer {
    /// User whose tokens the client sends
    acting_user: String,
    state: Mutex<State>,
    requests: Mutex<Vec<ApiRequest>>,
    fail_writes: AtomicBool,
    hold_writes: AtomicBool,
    gate: Semaphore,
    next_id: AtomicUsize,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            acting_user: ME.to_string(),
            state: Mutex::new(State::default()),
            requests: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
            hold_writes: AtomicBool::new(false),
            gate: Semaphore::new(0),
            next_id: AtomicUsize::new(0),
        })
    }

    // ===== Seeding =====

    pub fn add_post(&self, id: &str, creator: &str, content: &str) {
        let post: Post = serde_json::from_value(json!({
            "_id": id, "content": content, "creator": creator
        }))
        .expect("valid post");
        self.state.lock().unwrap().posts.push(post);
    }

    /// `count` posts `p0..pN` by `creator`, newest first
    pub fn add_posts(&self, count: usize, creator: &str) {
        for i in 0..count {
            self.add_post(&format!("p{}", i), creator, &format!("post number {}", i));
        }
    }

    pub fn add_user(&self, id: &str) {
        self.state.lock().unwrap().users.push(User {
            id: id.to_string(),
            name: format!("User {}", id),
            alias: Some(id.to_string()),
            ..User::default()
        });
    }

    pub fn add_comment(&self, id: &str, post: &str, parent: Option<&str>) {
        let comment: Comment = serde_json::from_value(json!({
            "_id": id, "content": format!("comment {}", id), "author": ME,
            "post": post, "parent": parent, "isChild": parent.is_some()
        }))
        .expect("valid comment");
        self.state.lock().unwrap().comments.push(comment);
    }

    pub fn post(&self, id: &str) -> Option<Post> {
        self.state.lock().unwrap().posts.iter().find(|p| p.id == id).cloned()
    }

    pub fn user(&self, id: &str) -> Option<User> {
        self.state.lock().unwrap().users.iter().find(|u| u.id == id).cloned()
    }

    // ===== Failure and timing control =====

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Park every write until [`FakeServer::release_writes`]
    pub fn hold_writes(&self) {
        self.hold_writes.store(true, Ordering::SeqCst);
    }

    pub fn release_writes(&self, count: usize) {
        self.gate.add_permits(count);
    }

    // ===== Request log =====

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    fn handle(&self, request: &ApiRequest) -> Result<Value, (u16, Option<ErrorCode>, String)> {
        let segments: Vec<String> = request
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                urlencoding::decode(s)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            })
            .collect();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        let page: usize = request
            .query_param("page")
            .and_then(|p| p.parse().ok())
            .unwrap_or(0);
        let me = self.acting_user.as_str();
        let mut state = self.state.lock().unwrap();

        let value = match (request.method, segments.as_slice()) {
            (Method::Get, ["posts"]) => paged(&state.posts, page),
            (Method::Get, ["posts", "top"]) => {
                let mut posts = state.posts.clone();
                posts.sort_by_key(|p| std::cmp::Reverse(p.like_count()));
                paged(&posts, page)
            }
            (Method::Get, ["posts", "search"]) => {
                let term = request.query_param("search").unwrap_or_default().to_lowercase();
                let found: Vec<Post> = state
                    .posts
                    .iter()
                    .filter(|p| p.content.to_lowercase().contains(&term))
                    .cloned()
                    .collect();
                paged(&found, page)
            }
            (Method::Get, ["posts", "user", id]) => {
                let found: Vec<Post> =
                    state.posts.iter().filter(|p| p.creator.id() == *id).cloned().collect();
                paged(&found, page)
            }
            (Method::Get, ["posts", "liked", id]) => {
                let found: Vec<Post> =
                    state.posts.iter().filter(|p| p.liked_by(id)).cloned().collect();
                paged(&found, page)
            }
            (Method::Get, ["posts", "saved", id]) => {
                let found: Vec<Post> =
                    state.posts.iter().filter(|p| p.saved_by(id)).cloned().collect();
                paged(&found, page)
            }
            (Method::Get, ["posts", id, "related"]) => {
                let found: Vec<Post> =
                    state.posts.iter().filter(|p| p.id != *id).take(3).cloned().collect();
                to_value(&found)
            }
            (Method::Get, ["posts", id]) => match state.posts.iter().find(|p| p.id == *id) {
                Some(post) => to_value(post),
                None => return Err(not_found("Post")),
            },
            (Method::Post, ["posts", id, "like"]) => {
                match state.posts.iter_mut().find(|p| p.id == *id) {
                    Some(post) => {
                        post.toggle_like(me);
                        Value::Null
                    }
                    None => return Err(not_found("Post")),
                }
            }
            (Method::Post, ["posts", id, "save"]) => {
                match state.posts.iter_mut().find(|p| p.id == *id) {
                    Some(post) => {
                        post.toggle_save(me);
                        Value::Null
                    }
                    None => return Err(not_found("Post")),
                }
            }
            (Method::Get, ["users", "top-creators"]) => to_value(&state.users),
            (Method::Get, ["users", id]) => match state.users.iter().find(|u| u.id == *id) {
                Some(user) => to_value(user),
                None => return Err(not_found("User")),
            },
            (Method::Post, ["users", "follow", id]) => {
                for user in state.users.iter_mut() {
                    if user.id == *id {
                        user.toggle_follower(me);
                    } else if user.id == me {
                        user.toggle_following(id);
                    }
                }
                Value::Null
            }
            (Method::Get, ["comments", "replies", id]) => {
                let found: Vec<Comment> = state
                    .comments
                    .iter()
                    .filter(|c| c.parent.as_deref() == Some(*id))
                    .cloned()
                    .collect();
                paged(&found, page)
            }
            (Method::Get, ["comments", post]) => {
                let found: Vec<Comment> = state
                    .comments
                    .iter()
                    .filter(|c| c.post == *post && c.parent.is_none())
                    .cloned()
                    .collect();
                paged(&found, page)
            }
            (Method::Post, ["comments"]) => {
                let Body::Json(body) = &request.body else {
                    return Err((400, None, "Expected JSON".to_string()));
                };
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                let comment: Comment = serde_json::from_value(json!({
                    "_id": format!("c-new-{}", n),
                    "content": body["content"],
                    "author": me,
                    "post": body["postId"],
                    "parent": body.get("parentId"),
                    "isChild": body.get("parentId").is_some(),
                }))
                .map_err(|e| (400, None, e.to_string()))?;
                let post_id = comment.post.clone();
                if let Some(post) = state.posts.iter_mut().find(|p| p.id == post_id) {
                    post.comments.push(Ref::Id(comment.id.clone()));
                }
                state.comments.insert(0, comment.clone());
                to_value(&comment)
            }
            (Method::Post, ["auth", "login"]) => {
                let user = state
                    .users
                    .iter()
                    .find(|u| u.id == me)
                    .cloned()
                    .ok_or_else(|| {
                        let message = "Wrong email or password".to_string();
                        (401, Some(ErrorCode::InvalidCredentials), message)
                    })?;
                json!({
                    "user": user,
                    "tokens": { "accessToken": "access", "refreshToken": "refresh" }
                })
            }
            (Method::Post, ["auth", "me"]) => match state.users.iter().find(|u| u.id == me) {
                Some(user) => to_value(user),
                None => {
                    let message = "Not signed in".to_string();
                    return Err((401, Some(ErrorCode::Unauthenticated), message));
                }
            },
            (Method::Post, ["auth", "logout"]) => Value::Null,
            _ => return Err(not_found("Route")),
        };
        Ok(value)
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).expect("serializable")
}

fn paged<T: Serialize>(items: &[T], page: usize) -> Value {
    let page: Vec<&T> = items.iter().skip(page * PAGE_SIZE).take(PAGE_SIZE).collect();
    to_value(&page)
}

fn not_found(what: &str) -> (u16, Option<ErrorCode>, String) {
    (404, Some(ErrorCode::NotFound), format!("{} not found", what))
}

/// Transport answering from a [`FakeServer`]
pub struct FakeTransport {
    server: Arc<FakeServer>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> Result<Envelope<Value>, ApiError> {
        self.server.requests.lock().unwrap().push(request.clone());

        let is_write = request.method != Method::Get;
        if is_write && self.server.hold_writes.load(Ordering::SeqCst) {
            if let Ok(permit) = self.server.gate.acquire().await {
                permit.forget();
            }
        }
        // Let optimistic edits and other tasks interleave
        tokio::task::yield_now().await;

        let failing = self.server.fail_writes.load(Ordering::SeqCst);
        if is_write && failing && !request.path.starts_with("/auth") {
            return Ok(Envelope::error(503, Some(ErrorCode::Unavailable), "Try again later"));
        }

        Ok(match self.server.handle(&request) {
            Ok(value) => Envelope::ok(200, "OK", value),
            Err((status, code, message)) => Envelope::error(status, code, message),
        })
    }
}

pub fn tokens() -> Tokens {
    Tokens {
        access_token: "access".to_string(),
        refresh_token: "refresh".to_string(),
    }
}

/// Client over `server`, signed in as [`ME`]
pub async fn signed_in_client(server: &Arc<FakeServer>) -> InstaFram {
    let session = Arc::new(Session::in_memory());
    session.sign_in(ME, tokens()).await.expect("sign in");
    client_with_session(server, session)
}

pub fn client_with_session(server: &Arc<FakeServer>, session: Arc<Session>) -> InstaFram {
    let transport = Arc::new(FakeTransport {
        server: server.clone(),
    });
    InstaFram::with_transport(&ClientConfig::default(), transport, session)
}
