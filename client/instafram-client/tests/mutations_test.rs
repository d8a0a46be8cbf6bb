//! Optimistic mutation behavior against the fake backend
//!
//! Covers:
//! - local edits visible before the request settles
//! - interleaved toggles on one post
//! - rollback on failure
//! - invalidation once the last mutation on a target settles
//! - provisional comments

mod common;

use common::{client_with_session, signed_in_client, FakeServer, ME};
use instafram_client::mutations::PENDING_PREFIX;
use instafram_client::transport::Method;
use instafram_client::Session;
use instafram_common::{ApiError, ErrorCode, NewComment};
use query_cache::Keys;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

// ============================================================================
// LIKES
// ============================================================================

#[tokio::test]
async fn test_like_shows_immediately_then_refetch_confirms() {
    let server = FakeServer::new();
    server.add_post("p1", "u2", "sunset");
    let app = signed_in_client(&server).await;

    let post = app.queries().post("p1");
    let before = assert_ok!(post.load().await);
    assert!(!before.liked_by(ME));

    server.hold_writes();
    let handle = assert_ok!(app.mutations().toggle_like("p1"));

    // Local state changes before the server has answered
    let local = post.snapshot().data.unwrap();
    assert!(local.liked_by(ME));
    assert!(!server.post("p1").unwrap().liked_by(ME));

    server.release_writes(1);
    assert_ok!(handle.await.unwrap());

    assert!(app.cache().state(&Keys::post("p1")).stale);
    let refetched = post.fetch().await;
    assert!(refetched.data.unwrap().liked_by(ME));
    assert_eq!(server.count(Method::Get, "/posts/p1"), 2);
}

#[tokio::test]
async fn test_like_then_unlike_before_settling_restores_original() {
    let server = FakeServer::new();
    server.add_post("p1", "u2", "sunset");
    let app = signed_in_client(&server).await;

    let post = app.queries().post("p1");
    assert_ok!(post.load().await);

    server.hold_writes();
    let like = assert_ok!(app.mutations().toggle_like("p1"));
    assert!(post.snapshot().data.unwrap().liked_by(ME));
    let unlike = assert_ok!(app.mutations().toggle_like("p1"));
    assert!(!post.snapshot().data.unwrap().liked_by(ME));
    assert_eq!(app.mutations().pending("post:p1"), 2);

    server.release_writes(2);
    assert_ok!(like.await.unwrap());
    assert_ok!(unlike.await.unwrap());
    assert_eq!(app.mutations().pending("post:p1"), 0);

    let settled = post.fetch().await.data.unwrap();
    assert!(!settled.liked_by(ME));
    assert!(!server.post("p1").unwrap().liked_by(ME));
}

#[tokio::test]
async fn test_dependents_wait_for_last_mutation() {
    let server = FakeServer::new();
    server.add_post("p1", "u2", "sunset");
    let app = signed_in_client(&server).await;
    assert_ok!(app.queries().post("p1").load().await);

    server.hold_writes();
    let mut first = assert_ok!(app.mutations().toggle_like("p1"));
    let mut second = assert_ok!(app.mutations().toggle_like("p1"));

    server.release_writes(1);
    // Whichever request got the permit settles first; the other still holds
    let first_done = tokio::select! {
        r = &mut first => {
            assert_ok!(r.unwrap());
            true
        }
        r = &mut second => {
            assert_ok!(r.unwrap());
            false
        }
    };
    assert_eq!(app.mutations().pending("post:p1"), 1);
    assert!(!app.cache().state(&Keys::post("p1")).stale);

    server.release_writes(1);
    let rest = if first_done { second } else { first };
    assert_ok!(rest.await.unwrap());
    assert!(app.cache().state(&Keys::post("p1")).stale);
}

#[tokio::test]
async fn test_failed_like_rolls_back() {
    let server = FakeServer::new();
    server.add_post("p1", "u2", "sunset");
    let app = signed_in_client(&server).await;

    let post = app.queries().post("p1");
    assert_ok!(post.load().await);

    server.fail_writes(true);
    let handle = assert_ok!(app.mutations().toggle_like("p1"));
    let err = assert_err!(handle.await.unwrap());
    assert_eq!(err.code(), ErrorCode::Unavailable);
    assert!(err.is_transient());

    assert!(!post.snapshot().data.unwrap().liked_by(ME));
    assert_eq!(app.mutations().pending("post:p1"), 0);
}

#[tokio::test]
async fn test_like_flips_every_cached_copy() {
    let server = FakeServer::new();
    server.add_posts(3, "u2");
    let app = signed_in_client(&server).await;

    let feed = app.queries().feed();
    let by_creator = app.queries().user_posts("u2");
    assert_ok!(feed.fetch_next().await);
    assert_ok!(by_creator.fetch_next().await);

    server.hold_writes();
    let handle = assert_ok!(app.mutations().toggle_like("p1"));

    for listing in [feed.data(), by_creator.data()] {
        let copy = listing.iter().find(|p| p.id == "p1").unwrap();
        assert!(copy.liked_by(ME));
        assert!(listing.iter().filter(|p| p.id != "p1").all(|p| !p.liked_by(ME)));
    }

    server.release_writes(1);
    assert_ok!(handle.await.unwrap());
    assert!(feed.is_stale());
    assert!(by_creator.is_stale());
}

#[tokio::test]
async fn test_save_invalidates_saved_listing() {
    let server = FakeServer::new();
    server.add_posts(2, "u2");
    let app = signed_in_client(&server).await;

    let saved = app.queries().saved_posts(ME);
    assert_ok!(saved.fetch_next().await);
    assert!(saved.data().is_empty());

    let handle = assert_ok!(app.mutations().toggle_save("p0"));
    assert_ok!(handle.await.unwrap());

    assert!(saved.is_stale());
    assert_ok!(saved.fetch_next().await);
    let ids: Vec<String> = saved.data().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec!["p0".to_string()]);
}

#[tokio::test]
async fn test_overlapping_like_and_save_invalidate_both_dependents() {
    let server = FakeServer::new();
    server.add_posts(3, "u2");
    let app = signed_in_client(&server).await;

    let feed = app.queries().feed();
    let liked = app.queries().liked_posts(ME);
    let saved = app.queries().saved_posts(ME);
    assert_ok!(feed.fetch_next().await);
    assert_ok!(liked.fetch_next().await);
    assert_ok!(saved.fetch_next().await);

    server.hold_writes();
    let like = assert_ok!(app.mutations().toggle_like("p1"));
    let save = assert_ok!(app.mutations().toggle_save("p1"));
    assert_eq!(app.mutations().pending("post:p1"), 2);

    server.release_writes(2);
    assert_ok!(like.await.unwrap());
    assert_ok!(save.await.unwrap());
    assert_eq!(app.mutations().pending("post:p1"), 0);

    // Whichever settled first, both mutations' dependents are refetched
    assert!(feed.is_stale());
    assert!(liked.is_stale());
    assert!(saved.is_stale());

    assert_ok!(saved.fetch_next().await);
    let ids: Vec<String> = saved.data().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec!["p1".to_string()]);
}

#[tokio::test]
async fn test_mutations_need_a_session() {
    let server = FakeServer::new();
    server.add_post("p1", "u2", "sunset");
    let app = client_with_session(&server, Arc::new(Session::in_memory()));

    let result = app.mutations().toggle_like("p1");
    assert!(matches!(result, Err(ApiError::Unauthenticated)));
    assert!(server.requests().is_empty());
}

// ============================================================================
// FOLLOWS
// ============================================================================

#[tokio::test]
async fn test_follow_updates_both_users() {
    let server = FakeServer::new();
    server.add_user(ME);
    server.add_user("u2");
    let app = signed_in_client(&server).await;

    let target = app.queries().user("u2");
    let me = app.queries().user(ME);
    assert_ok!(target.load().await);
    assert_ok!(me.load().await);

    server.hold_writes();
    let handle = assert_ok!(app.mutations().toggle_follow("u2"));
    assert!(target.snapshot().data.unwrap().is_followed_by(ME));
    assert!(me.snapshot().data.unwrap().follows("u2"));

    server.release_writes(1);
    assert_ok!(handle.await.unwrap());
    assert!(server.user("u2").unwrap().is_followed_by(ME));
    assert!(target.fetch().await.data.unwrap().is_followed_by(ME));
}

#[tokio::test]
async fn test_follow_shows_in_top_creators() {
    let server = FakeServer::new();
    server.add_user(ME);
    server.add_user("u2");
    let app = signed_in_client(&server).await;

    let creators = app.queries().top_creators();
    let before = assert_ok!(creators.load().await);
    assert!(before.iter().all(|u| u.followers.is_empty()));

    server.hold_writes();
    let handle = assert_ok!(app.mutations().toggle_follow("u2"));

    let listed = creators.snapshot().data.unwrap();
    let target = listed.iter().find(|u| u.id == "u2").unwrap();
    let me = listed.iter().find(|u| u.id == ME).unwrap();
    assert!(target.is_followed_by(ME));
    assert!(me.follows("u2"));

    server.release_writes(1);
    assert_ok!(handle.await.unwrap());
    assert!(app.cache().state(&Keys::top_creators()).stale);
}

#[tokio::test]
async fn test_cannot_follow_self() {
    let server = FakeServer::new();
    let app = signed_in_client(&server).await;

    let result = app.mutations().toggle_follow(ME);
    assert!(matches!(result, Err(ApiError::Validation(_))));
    assert!(server.requests().is_empty());
}

// ============================================================================
// COMMENTS
// ============================================================================

#[tokio::test]
async fn test_comment_is_provisional_until_confirmed() {
    let server = FakeServer::new();
    server.add_post("p1", "u2", "sunset");
    server.add_comment("c1", "p1", None);
    let app = signed_in_client(&server).await;

    let comments = app.queries().comments("p1");
    assert_ok!(comments.fetch_next().await);
    assert_eq!(comments.data().len(), 1);

    server.hold_writes();
    let handle = assert_ok!(app.mutations().create_comment(NewComment {
        post_id: "p1".to_string(),
        content: "  lovely  ".to_string(),
        parent_id: None,
    }));

    let shown = comments.data();
    assert_eq!(shown.len(), 2);
    assert!(shown[0].id.starts_with(PENDING_PREFIX));
    assert_eq!(shown[0].content, "lovely");

    server.release_writes(1);
    let created = assert_ok!(handle.await.unwrap());
    assert!(!created.id.starts_with(PENDING_PREFIX));

    assert!(comments.is_stale());
    assert_ok!(comments.fetch_next().await);
    let ids: Vec<String> = comments.data().into_iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![created.id, "c1".to_string()]);
}

#[tokio::test]
async fn test_failed_comment_removes_provisional_copy() {
    let server = FakeServer::new();
    server.add_post("p1", "u2", "sunset");
    server.add_comment("c1", "p1", None);
    let app = signed_in_client(&server).await;

    let comments = app.queries().comments("p1");
    assert_ok!(comments.fetch_next().await);

    server.fail_writes(true);
    let handle = assert_ok!(app.mutations().create_comment(NewComment {
        post_id: "p1".to_string(),
        content: "lovely".to_string(),
        parent_id: None,
    }));
    assert_err!(handle.await.unwrap());

    assert!(comments.data().iter().all(|c| !c.id.starts_with(PENDING_PREFIX)));
}

#[tokio::test]
async fn test_empty_comment_never_sent() {
    let server = FakeServer::new();
    let app = signed_in_client(&server).await;

    let result = app.mutations().create_comment(NewComment {
        post_id: "p1".to_string(),
        content: "   ".to_string(),
        parent_id: None,
    });
    assert!(matches!(result, Err(ApiError::Validation(_))));
    assert!(server.requests().is_empty());
}
