//! Optimistic mutations
//!
//! Each mutation edits every cached copy of its target before returning,
//! sends the request on a background task and, once it settles:
//! - on failure, undoes its own edit (toggles are flips, so flipping again is
//!   exact even when other toggles on the same target interleave)
//! - when it is the last mutation in flight for the target, invalidates every
//!   query the change could affect so the next read fetches server truth
//!
//! ```text
//! toggle_like(p1)      cache: likes += me        pending[post:p1] = 1
//! toggle_like(p1)      cache: likes -= me        pending[post:p1] = 2
//! first settles                                  pending[post:p1] = 1
//! second settles                                 pending[post:p1] = 0 -> invalidate
//! ```

use crate::api::Api;
use crate::forms::{self, CommentForm};
use crate::session::Session;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use instafram_common::{ApiError, Comment, NewComment, Post, Ref, User};
use query_cache::{Keys, QueryCache, QueryKey};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of comment IDs that only exist locally
pub const PENDING_PREFIX: &str = "pending-";

pub type MutationHandle<T> = JoinHandle<Result<T, ApiError>>;

/// Mutations in flight for one target and everything they affect
#[derive(Debug, Default)]
struct Pending {
    count: usize,
    affected: Vec<QueryKey>,
}

#[derive(Clone)]
pub struct Mutations {
    api: Api,
    cache: QueryCache,
    session: Arc<Session>,
    pending: Arc<DashMap<String, Pending>>,
}

impl Mutations {
    pub fn new(api: Api, cache: QueryCache, session: Arc<Session>) -> Self {
        Self {
            api,
            cache,
            session,
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Mutations still in flight for a target such as `post:p1`
    pub fn pending(&self, target: &str) -> usize {
        self.pending.get(target).map(|p| p.count).unwrap_or(0)
    }

    fn begin(&self, target: &str, affected: Vec<QueryKey>) {
        let mut entry = self.pending.entry(target.to_string()).or_default();
        entry.count += 1;
        for key in affected {
            if !entry.affected.contains(&key) {
                entry.affected.push(key);
            }
        }
    }

    /// Every key affected by the mutations on `target`, once the last of
    /// them settles
    fn settle(pending: &DashMap<String, Pending>, target: &str) -> Option<Vec<QueryKey>> {
        match pending.entry(target.to_string()) {
            Entry::Occupied(mut entry) => {
                let left = entry.get().count.saturating_sub(1);
                entry.get_mut().count = left;
                if left == 0 {
                    Some(entry.remove().affected)
                } else {
                    None
                }
            }
            Entry::Vacant(_) => None,
        }
    }

    fn finish(cache: &QueryCache, pending: &DashMap<String, Pending>, target: &str) {
        match Self::settle(pending, target) {
            Some(affected) => {
                for key in &affected {
                    cache.invalidate(key);
                }
                debug!(
                    mutation = %target,
                    keys = affected.len(),
                    "Mutation settled, dependents invalidated"
                );
            }
            None => debug!(mutation = %target, "Mutation settled, others still in flight"),
        }
    }

    // ===== Likes and saves =====

    /// Flip the current user's like on a post
    pub fn toggle_like(&self, post_id: &str) -> Result<MutationHandle<()>, ApiError> {
        let user_id = self.session.require_user()?;
        let (liked, creator) = flip_post(&self.cache, post_id, |post| post.toggle_like(&user_id));
        debug!(post_id = %post_id, liked = ?liked, "Optimistic like");

        let mut affected = vec![
            Keys::post(post_id),
            Keys::feed(),
            Keys::liked_posts(&user_id),
            Keys::top_posts_all(),
        ];
        if let Some(creator) = &creator {
            affected.push(Keys::user_posts(creator));
        }

        let target = format!("post:{}", post_id);
        self.begin(&target, affected);

        let api = self.api.clone();
        let cache = self.cache.clone();
        let pending = self.pending.clone();
        let post_id = post_id.to_string();

        Ok(tokio::spawn(async move {
            let result = api.posts().like(&post_id).await;
            if let Err(e) = &result {
                warn!(post_id = %post_id, error = %e, "Like failed, rolling back");
                flip_post(&cache, &post_id, |post| post.toggle_like(&user_id));
            }
            Self::finish(&cache, &pending, &target);
            result
        }))
    }

    /// Flip the current user's save on a post
    pub fn toggle_save(&self, post_id: &str) -> Result<MutationHandle<()>, ApiError> {
        let user_id = self.session.require_user()?;
        let (saved, _) = flip_post(&self.cache, post_id, |post| post.toggle_save(&user_id));
        debug!(post_id = %post_id, saved = ?saved, "Optimistic save");

        let affected = vec![Keys::post(post_id), Keys::saved_posts_all()];
        let target = format!("post:{}", post_id);
        self.begin(&target, affected);

        let api = self.api.clone();
        let cache = self.cache.clone();
        let pending = self.pending.clone();
        let post_id = post_id.to_string();

        Ok(tokio::spawn(async move {
            let result = api.posts().save(&post_id).await;
            if let Err(e) = &result {
                warn!(post_id = %post_id, error = %e, "Save failed, rolling back");
                flip_post(&cache, &post_id, |post| post.toggle_save(&user_id));
            }
            Self::finish(&cache, &pending, &target);
            result
        }))
    }

    // ===== Follows =====

    /// Flip whether the current user follows `user_id`
    pub fn toggle_follow(&self, user_id: &str) -> Result<MutationHandle<()>, ApiError> {
        let me = self.session.require_user()?;
        if me == user_id {
            return Err(ApiError::Validation("You cannot follow yourself".to_string()));
        }

        let following = flip_follow(&self.cache, &me, user_id);
        debug!(user_id = %user_id, following = ?following, "Optimistic follow");

        let affected = vec![
            Keys::user(user_id),
            Keys::user(&me),
            Keys::current_user(),
            Keys::top_creators(),
        ];
        let target = format!("user:{}", user_id);
        self.begin(&target, affected);

        let api = self.api.clone();
        let cache = self.cache.clone();
        let pending = self.pending.clone();
        let user_id = user_id.to_string();

        Ok(tokio::spawn(async move {
            let result = api.users().follow(&user_id).await;
            if let Err(e) = &result {
                warn!(user_id = %user_id, error = %e, "Follow failed, rolling back");
                flip_follow(&cache, &me, &user_id);
            }
            Self::finish(&cache, &pending, &target);
            result
        }))
    }

    // ===== Comments =====

    /// Post a comment, showing a provisional copy until the server answers
    pub fn create_comment(&self, draft: NewComment) -> Result<MutationHandle<Comment>, ApiError> {
        forms::check(&CommentForm::from(&draft))?;
        let me = self.session.require_user()?;

        let provisional = Comment {
            id: format!("{}{}", PENDING_PREFIX, Uuid::new_v4()),
            content: draft.content.trim().to_string(),
            author: Ref::Id(me),
            post: draft.post_id.clone(),
            parent: draft.parent_id.clone(),
            likes: Vec::new(),
            replies: Vec::new(),
            is_child: draft.parent_id.is_some(),
            total_replies: None,
            created_at: Some(Utc::now()),
            updated_at: None,
        };
        insert_provisional(&self.cache, &provisional);
        debug!(post_id = %draft.post_id, provisional = %provisional.id, "Optimistic comment");

        let mut affected = vec![Keys::post(&draft.post_id), Keys::comments(&draft.post_id)];
        if let Some(parent) = &draft.parent_id {
            affected.push(Keys::replies(parent));
        }
        let target = format!("comments:{}", draft.post_id);
        self.begin(&target, affected);

        let api = self.api.clone();
        let cache = self.cache.clone();
        let pending = self.pending.clone();

        Ok(tokio::spawn(async move {
            let result = api.comments().create(&draft).await;
            match &result {
                Ok(comment) => {
                    info!(comment_id = %comment.id, post_id = %draft.post_id, "Comment created")
                }
                Err(e) => {
                    warn!(
                        post_id = %draft.post_id,
                        error = %e,
                        "Comment failed, removing provisional copy"
                    );
                    remove_provisional(&cache, &provisional);
                }
            }
            Self::finish(&cache, &pending, &target);
            result
        }))
    }
}

/// Apply `flip` to every cached copy of a post. Returns the flip result on
/// the first copy found and the post's creator.
fn flip_post<F>(cache: &QueryCache, post_id: &str, flip: F) -> (Option<bool>, Option<String>)
where
    F: Fn(&mut Post) -> bool,
{
    let mut state = None;
    let mut creator = None;
    let mut apply = |post: &mut Post| {
        if post.id != post_id {
            return false;
        }
        let now = flip(post);
        state.get_or_insert(now);
        creator.get_or_insert_with(|| post.creator.id().to_string());
        true
    };

    for prefix in [Keys::post(post_id), Keys::post_lists()] {
        if let Err(e) = cache.update_items::<Post, _>(&prefix, &mut apply) {
            warn!(prefix = %prefix, error = %e, "Optimistic post edit failed");
        }
    }
    (state, creator)
}

/// Flip `me` in the target's followers and the target in `me`'s following
fn flip_follow(cache: &QueryCache, me: &str, target: &str) -> Option<bool> {
    let mut state = None;
    let mut on_target = |user: &mut User| {
        if user.id != target {
            return false;
        }
        let now = user.toggle_follower(me);
        state.get_or_insert(now);
        true
    };
    for prefix in [Keys::user(target), Keys::top_creators()] {
        if let Err(e) = cache.update_items::<User, _>(&prefix, &mut on_target) {
            warn!(prefix = %prefix, error = %e, "Optimistic follow edit failed");
        }
    }

    let mut on_me = |user: &mut User| {
        if user.id != me {
            return false;
        }
        user.toggle_following(target);
        true
    };
    for prefix in [Keys::user(me), Keys::current_user(), Keys::top_creators()] {
        if let Err(e) = cache.update_items::<User, _>(&prefix, &mut on_me) {
            warn!(prefix = %prefix, error = %e, "Optimistic follow edit failed");
        }
    }
    state
}

fn insert_provisional(cache: &QueryCache, comment: &Comment) {
    let post_id = comment.post.as_str();
    let result = match &comment.parent {
        Some(parent) => cache
            .update_items::<Comment, _>(&Keys::comments(post_id), |c| {
                if &c.id != parent {
                    return false;
                }
                c.replies.push(comment.clone());
                c.total_replies = Some(c.reply_total() + 1);
                true
            })
            .map(|_| ()),
        None => cache.prepend_item(&Keys::comments(post_id), comment).map(|_| ()),
    };
    if let Err(e) = result {
        warn!(post_id = %post_id, error = %e, "Could not show provisional comment");
    }

    bump_comment_list(cache, post_id, |comments| comments.push(Ref::Id(comment.id.clone())));
}

fn remove_provisional(cache: &QueryCache, comment: &Comment) {
    let post_id = comment.post.as_str();
    cache.remove_items::<Comment, _>(&Keys::comments(post_id), |c| c.id == comment.id);
    if let Some(parent) = &comment.parent {
        let result = cache.update_items::<Comment, _>(&Keys::comments(post_id), |c| {
            if &c.id != parent {
                return false;
            }
            let before = c.replies.len();
            c.replies.retain(|r| r.id != comment.id);
            if c.replies.len() == before {
                return false;
            }
            c.total_replies = Some(c.reply_total().saturating_sub(1));
            true
        });
        if let Err(e) = result {
            warn!(post_id = %post_id, error = %e, "Could not remove provisional reply");
        }
    }

    bump_comment_list(cache, post_id, |comments| comments.retain(|c| c.id() != comment.id));
}

fn bump_comment_list<F>(cache: &QueryCache, post_id: &str, edit: F)
where
    F: Fn(&mut Vec<Ref<Comment>>),
{
    let mut apply = |post: &mut Post| {
        if post.id != post_id {
            return false;
        }
        edit(&mut post.comments);
        true
    };
    for prefix in [Keys::post(post_id), Keys::post_lists()] {
        if let Err(e) = cache.update_items::<Post, _>(&prefix, &mut apply) {
            warn!(prefix = %prefix, error = %e, "Comment count edit failed");
        }
    }
}
