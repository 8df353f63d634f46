use std::collections::{BTreeMap, HashMap};

use serde_json::json;
use spin_sdk::http::{Method, Request};
use tracing::info;
use uuid::Uuid;

use crate::auth::anonymous_redirect;
use crate::config::*;
use crate::core::context::Context;
use crate::core::errors::ApiError;
use crate::core::helpers::{hash_password, is_valid_username, now_iso, sanitize_text, verify_password};
use crate::core::pagination::paginate;
use crate::core::query_params::{get_string, parse_form, parse_query_params};
use crate::core::reply::Reply;
use crate::core::session::delete_user_sessions;
use crate::core::store::{KvStore, StoreExt};
use crate::follow::{get_followers_count, get_followings_count, is_following};
use crate::models::models::{Level, Profile};
use crate::templates;

type FormErrors = BTreeMap<&'static str, String>;

pub fn build_user_json(user: &Profile) -> serde_json::Value {
    json!({
        "id": user.id,
        "username": user.username,
        "bio": user.bio.as_ref().unwrap_or(&String::new()),
        "registration_date": user.registration_date,
        "url": user.get_absolute_url(),
    })
}

pub fn load_user(store: &dyn KvStore, user_id: &str) -> anyhow::Result<Option<Profile>> {
    store.get_json(&user_key(user_id))
}

pub fn find_by_username(store: &dyn KvStore, username: &str) -> anyhow::Result<Option<Profile>> {
    match store.get_json::<String>(&username_key(username))? {
        Some(id) => load_user(store, &id),
        None => Ok(None),
    }
}

pub fn get_profile_or_404(store: &dyn KvStore, username: &str) -> Result<Profile, ApiError> {
    find_by_username(store, username)?.ok_or_else(|| ApiError::not_found("User"))
}

/// Every profile in registration order.
pub fn all_profiles(store: &dyn KvStore) -> anyhow::Result<Vec<Profile>> {
    let ids: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    let mut users = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(user) = load_user(store, &id)? {
            users.push(user);
        }
    }
    Ok(users)
}

/// The `count` most recently registered profiles, newest first.
pub fn newest_profiles(store: &dyn KvStore, count: usize) -> anyhow::Result<Vec<Profile>> {
    let mut users = all_profiles(store)?;
    users.reverse();
    users.sort_by(|a, b| b.registration_date.cmp(&a.registration_date));
    users.truncate(count);
    Ok(users)
}

/// Persist a new profile. Returns `None` when the username is taken.
pub fn create_profile(store: &dyn KvStore, username: &str, password: &str) -> anyhow::Result<Option<Profile>> {
    let id = Uuid::new_v4().to_string();

    if !store.insert_json_new(&username_key(username), &id)? {
        return Ok(None);
    }

    let user = Profile {
        id: id.clone(),
        username: username.to_string(),
        password: hash_password(password)?,
        bio: None,
        registration_date: now_iso(),
        is_active: true,
    };
    store.set_json(&user_key(&id), &user)?;

    let mut users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    users.push(id);
    store.set_json(USERS_LIST_KEY, &users)?;

    Ok(Some(user))
}

fn validate_registration(form: &HashMap<String, String>) -> Result<(String, String), FormErrors> {
    let mut errors = FormErrors::new();
    let username = get_string(form, "username").unwrap_or_default();
    let password = form.get("password").cloned().unwrap_or_default();

    if username.is_empty() {
        errors.insert("username", "Username is required".to_string());
    } else if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&username.chars().count()) {
        errors.insert("username", "Username must be 3-50 characters".to_string());
    } else if !is_valid_username(&username) {
        errors.insert(
            "username",
            "Username may contain only letters, numbers, and @/./+/-/_ characters".to_string(),
        );
    } else if RESERVED_USERNAMES.contains(&username.as_str()) {
        errors.insert("username", "This username is reserved".to_string());
    }

    if password.is_empty() {
        errors.insert("password", "Password is required".to_string());
    } else if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.insert("password", "Password must be at least 3 characters".to_string());
    } else if let Some(confirm) = form.get("password_confirm") {
        if confirm != &password {
            errors.insert("password_confirm", "The two password fields didn't match".to_string());
        }
    }

    if errors.is_empty() {
        Ok((username, password))
    } else {
        Err(errors)
    }
}

fn render_register_form(cx: &mut Context, username: &str, errors: &FormErrors) -> Reply {
    cx.render(json!({
        "form": { "username": username },
        "errors": errors,
    }))
}

pub fn register(cx: &mut Context, req: &Request) -> Result<Reply, ApiError> {
    if let Some(reply) = anonymous_redirect(cx) {
        return Ok(reply);
    }

    match req.method() {
        Method::Get => Ok(render_register_form(cx, "", &FormErrors::new())),
        Method::Post => {
            let form = parse_form(req);
            let (username, password) = match validate_registration(&form) {
                Ok(valid) => valid,
                Err(errors) => {
                    let username = get_string(&form, "username").unwrap_or_default();
                    return Ok(render_register_form(cx, &username, &errors));
                }
            };

            let Some(user) = create_profile(cx.store, &username, &password)? else {
                let mut errors = FormErrors::new();
                errors.insert("username", "A user with that username already exists".to_string());
                return Ok(render_register_form(cx, &username, &errors));
            };

            info!(user_id = %user.id, username = %user.username, "Registered new profile");
            cx.flash(Level::Success, "Successfully created your account");
            Ok(cx.redirect_with(Level::Success, "Registration completed! Now log in", "/accounts/login/"))
        }
        _ => Err(ApiError::MethodNotAllowed),
    }
}

pub fn users_list(cx: &mut Context, req: &Request) -> Result<Reply, ApiError> {
    cx.login_required(req)?;

    let params = parse_query_params(req.uri());
    let users: Vec<_> = all_profiles(cx.store)?.iter().map(build_user_json).collect();
    let page = paginate(users, params.get("page").map(String::as_str), cx.config.page_size)?;

    Ok(cx.render(json!({ "users": page })))
}

pub fn profile_detail(cx: &mut Context, req: &Request, username: &str) -> Result<Reply, ApiError> {
    let self_user = cx.login_required(req)?;
    let user = get_profile_or_404(cx.store, username)?;

    let followers_count = get_followers_count(cx.store, &user.id)?;
    let followings_count = get_followings_count(cx.store, &user.id)?;
    let new_users = newest_profiles(cx.store, NEW_USERS_COUNT)?;
    let is_following = is_following(cx.store, &self_user.id, &user.id)?;

    if templates::wants_html(req) {
        let messages = cx.session.take_messages();
        let html = templates::render_user_profile(&templates::ProfilePage {
            user: &user,
            self_user: &self_user,
            followers_count,
            followings_count,
            new_users: &new_users,
            is_following,
            messages: &messages,
        })?;
        return Ok(Reply::Html(html));
    }

    Ok(cx.render(json!({
        "user": build_user_json(&user),
        "self_user": build_user_json(&self_user),
        "followers_count": followers_count,
        "followings_count": followings_count,
        "new_users": new_users.iter().map(build_user_json).collect::<Vec<_>>(),
        "is_following": is_following,
    })))
}

pub fn update_profile(cx: &mut Context, req: &Request) -> Result<Reply, ApiError> {
    let mut user = cx.login_required(req)?;

    match req.method() {
        Method::Get => Ok(cx.render(json!({
            "user": build_user_json(&user),
            "errors": FormErrors::new(),
        }))),
        Method::Post => {
            let form = parse_form(req);
            let mut errors = FormErrors::new();
            let mut password_changed = false;

            // Update bio if provided
            if let Some(bio) = form.get("bio") {
                if bio.chars().count() > MAX_BIO_LENGTH {
                    errors.insert("bio", "Bio too long (max 500 chars)".to_string());
                } else {
                    let sanitized_bio = sanitize_text(bio.trim());
                    user.bio = if sanitized_bio.is_empty() { None } else { Some(sanitized_bio) };
                }
            }

            // Update password if provided
            if let Some(new_password) = form.get("new_password").filter(|p| !p.is_empty()) {
                let old_password = form.get("old_password").map(String::as_str).unwrap_or_default();
                if new_password.chars().count() < MIN_PASSWORD_LENGTH {
                    errors.insert("new_password", "Password must be 3+ characters".to_string());
                } else if !verify_password(old_password, &user.password) {
                    errors.insert("old_password", "Your old password was entered incorrectly".to_string());
                } else {
                    user.password = hash_password(new_password)?;
                    password_changed = true;
                }
            }

            if !errors.is_empty() {
                return Ok(cx.render(json!({
                    "user": build_user_json(&user),
                    "errors": errors,
                })));
            }

            cx.store.set_json(&user_key(&user.id), &user)?;

            if password_changed {
                // Every other login of this user ends; this one gets a new id.
                delete_user_sessions(cx.store, &user.id, cx.session.id())?;
                cx.session.cycle_id();
                info!(user_id = %user.id, "Password changed, other sessions revoked");
            }

            let url = user.get_absolute_url();
            cx.user = Some(user);
            Ok(cx.redirect_with(Level::Success, "Your profile has been updated", url))
        }
        _ => Err(ApiError::MethodNotAllowed),
    }
}
