use serde_json::json;
use spin_sdk::http::{Method, Request};
use tracing::info;

use crate::config::*;
use crate::core::context::Context;
use crate::core::errors::ApiError;
use crate::core::helpers::now_iso;
use crate::core::pagination::paginate;
use crate::core::query_params::parse_query_params;
use crate::core::reply::Reply;
use crate::core::store::{KvStore, StoreExt};
use crate::models::models::{Level, Profile, Relationship};
use crate::users::{build_user_json, find_by_username, get_profile_or_404, load_user};

const USERS_URL: &str = "/accounts/users/";
const NO_SUCH_USER: &str = "Such user doesn't exist, sorry. Check out users on this page";

/// Get-or-create the (follower, following) edge. Returns whether it was created.
pub fn follow_user(store: &dyn KvStore, follower_id: &str, following_id: &str) -> anyhow::Result<bool> {
    let relationship = Relationship {
        follower_id: follower_id.to_string(),
        following_id: following_id.to_string(),
        created_at: now_iso(),
    };
    store.insert_json_new(&relationship_key(follower_id, following_id), &relationship)
}

/// Delete the edge. Returns whether there was one.
pub fn unfollow_user(store: &dyn KvStore, follower_id: &str, following_id: &str) -> anyhow::Result<bool> {
    let key = relationship_key(follower_id, following_id);
    if store.get(&key)?.is_none() {
        return Ok(false);
    }
    store.delete(&key)?;
    Ok(true)
}

pub fn is_following(store: &dyn KvStore, follower_id: &str, following_id: &str) -> anyhow::Result<bool> {
    Ok(store.get(&relationship_key(follower_id, following_id))?.is_some())
}

fn relationships(store: &dyn KvStore) -> anyhow::Result<Vec<Relationship>> {
    let mut rows = Vec::new();
    for key in store.keys_with_prefix(RELATIONSHIP_PREFIX)? {
        if let Some(row) = store.get_json::<Relationship>(&key)? {
            rows.push(row);
        }
    }
    // newest edge first
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(rows)
}

/// Edges pointing at `user_id`.
pub fn follower_relationships(store: &dyn KvStore, user_id: &str) -> anyhow::Result<Vec<Relationship>> {
    Ok(relationships(store)?
        .into_iter()
        .filter(|r| r.following_id == user_id)
        .collect())
}

/// Edges leaving `user_id`.
pub fn following_relationships(store: &dyn KvStore, user_id: &str) -> anyhow::Result<Vec<Relationship>> {
    let prefix = format!("{}{}:", RELATIONSHIP_PREFIX, user_id);
    let mut rows = Vec::new();
    for key in store.keys_with_prefix(&prefix)? {
        if let Some(row) = store.get_json::<Relationship>(&key)? {
            rows.push(row);
        }
    }
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(rows)
}

pub fn get_followers(store: &dyn KvStore, user_id: &str) -> anyhow::Result<Vec<Profile>> {
    let mut followers = Vec::new();
    for row in follower_relationships(store, user_id)? {
        if let Some(user) = load_user(store, &row.follower_id)? {
            followers.push(user);
        }
    }
    Ok(followers)
}

pub fn get_followings(store: &dyn KvStore, user_id: &str) -> anyhow::Result<Vec<Profile>> {
    let mut followings = Vec::new();
    for row in following_relationships(store, user_id)? {
        if let Some(user) = load_user(store, &row.following_id)? {
            followings.push(user);
        }
    }
    Ok(followings)
}

pub fn get_followers_count(store: &dyn KvStore, user_id: &str) -> anyhow::Result<usize> {
    Ok(follower_relationships(store, user_id)?.len())
}

pub fn get_followings_count(store: &dyn KvStore, user_id: &str) -> anyhow::Result<usize> {
    Ok(following_relationships(store, user_id)?.len())
}

// === HTTP Handlers ===

pub fn handle_follow(cx: &mut Context, req: &Request, username: &str) -> Result<Reply, ApiError> {
    let self_user = cx.login_required(req)?;
    let own_url = self_user.get_absolute_url();

    // POST is a placeholder for now; following happens over GET.
    if matches!(req.method(), Method::Post) {
        return Ok(Reply::redirect(own_url));
    }

    let Some(follow_user_profile) = find_by_username(cx.store, username)? else {
        return Ok(cx.redirect_with(Level::Error, NO_SUCH_USER, USERS_URL));
    };

    if self_user.id == follow_user_profile.id {
        return Ok(cx.redirect_with(Level::Error, "Follow yourself, seriously?", own_url));
    }

    if follow_user(cx.store, &self_user.id, &follow_user_profile.id)? {
        info!(follower = %self_user.id, following = %follow_user_profile.id, "Followed profile");
        cx.flash(
            Level::Success,
            format!("Yeap, now you are following {}", follow_user_profile.username),
        );
    } else {
        cx.flash(
            Level::Error,
            format!("You've already followed user {}", follow_user_profile.username),
        );
    }

    Ok(Reply::redirect(own_url))
}

pub fn handle_unfollow(cx: &mut Context, req: &Request, username: &str) -> Result<Reply, ApiError> {
    let self_user = cx.login_required(req)?;
    let own_url = self_user.get_absolute_url();

    if matches!(req.method(), Method::Post) {
        return Ok(cx.redirect_with(Level::Info, "To unfollow a user use a GET request", own_url));
    }

    let Some(unfollow_user_profile) = find_by_username(cx.store, username)? else {
        return Ok(cx.redirect_with(Level::Error, NO_SUCH_USER, USERS_URL));
    };

    if self_user.id == unfollow_user_profile.id {
        return Ok(cx.redirect_with(Level::Error, "Unfollow yourself, seriously?", own_url));
    }

    if !unfollow_user(cx.store, &self_user.id, &unfollow_user_profile.id)? {
        return Ok(cx.redirect_with(
            Level::Error,
            "First you need to follow this user!",
            unfollow_user_profile.get_absolute_url(),
        ));
    }

    info!(follower = %self_user.id, following = %unfollow_user_profile.id, "Unfollowed profile");
    Ok(cx.redirect_with(
        Level::Success,
        format!("Successfully unfollowed {}", unfollow_user_profile.username),
        own_url,
    ))
}

pub fn get_followers_list(cx: &mut Context, req: &Request, username: &str) -> Result<Reply, ApiError> {
    cx.login_required(req)?;
    let user = get_profile_or_404(cx.store, username)?;

    let params = parse_query_params(req.uri());
    let followers: Vec<_> = get_followers(cx.store, &user.id)?.iter().map(build_user_json).collect();
    let page = paginate(followers, params.get("page").map(String::as_str), cx.config.page_size)?;

    Ok(cx.render(json!({
        "user": build_user_json(&user),
        "followers": page,
    })))
}

pub fn get_followings_list(cx: &mut Context, req: &Request, username: &str) -> Result<Reply, ApiError> {
    cx.login_required(req)?;
    let user = get_profile_or_404(cx.store, username)?;

    let params = parse_query_params(req.uri());
    let followings: Vec<_> = get_followings(cx.store, &user.id)?.iter().map(build_user_json).collect();
    let page = paginate(followings, params.get("page").map(String::as_str), cx.config.page_size)?;

    Ok(cx.render(json!({
        "user": build_user_json(&user),
        "followings": page,
    })))
}
