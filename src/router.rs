use spin_sdk::http::{Method, Request, Response};
use tracing::{debug, error};

use crate::config::Config;
use crate::core::context::Context;
use crate::core::errors::ApiError;
use crate::core::helpers::{is_valid_slug, is_valid_username};
use crate::core::reply::Reply;
use crate::core::store::KvStore;
use crate::static_server::serve_static;
use crate::{auth, boards, follow, pins, users};

fn method_name(method: &Method) -> &'static str {
    match method {
        Method::Get => "GET",
        Method::Post => "POST",
        Method::Put => "PUT",
        Method::Delete => "DELETE",
        Method::Patch => "PATCH",
        Method::Head => "HEAD",
        Method::Options => "OPTIONS",
        _ => "OTHER",
    }
}

fn allow_get(req: &Request) -> Result<(), ApiError> {
    match req.method() {
        Method::Get => Ok(()),
        _ => Err(ApiError::MethodNotAllowed),
    }
}

fn allow_get_post(req: &Request) -> Result<(), ApiError> {
    match req.method() {
        Method::Get | Method::Post => Ok(()),
        _ => Err(ApiError::MethodNotAllowed),
    }
}

/// Percent-decoded username from a path segment.
fn username_segment(segment: &str) -> Result<String, ApiError> {
    match urlencoding::decode(segment) {
        Ok(username) if is_valid_username(&username) => Ok(username.into_owned()),
        _ => Err(ApiError::not_found("User")),
    }
}

fn slug_segment<'a>(segment: &'a str, what: &str) -> Result<&'a str, ApiError> {
    if is_valid_slug(segment) {
        Ok(segment)
    } else {
        Err(ApiError::not_found(what))
    }
}

/// Handle one request end to end: load the session, run the view, persist the session.
pub fn route(store: &dyn KvStore, config: &Config, req: &Request) -> Response {
    debug!(method = method_name(req.method()), path = req.path(), "Routing request");

    let mut cx = match Context::load(store, config, req) {
        Ok(cx) => cx,
        Err(err) => {
            error!("Failed to load session: {:#}", err);
            return Reply::from(ApiError::InternalError(err)).into_response(None);
        }
    };

    let reply = match dispatch(&mut cx, req) {
        Ok(reply) => reply,
        Err(err) => {
            if let ApiError::InternalError(inner) = &err {
                error!(path = req.path(), "Request failed: {:#}", inner);
            }
            Reply::from(err)
        }
    };

    match cx.session.save(store) {
        Ok(cookie) => reply.into_response(cookie),
        Err(err) => {
            error!("Failed to save session: {:#}", err);
            Reply::from(ApiError::InternalError(err)).into_response(None)
        }
    }
}

fn dispatch(cx: &mut Context, req: &Request) -> Result<Reply, ApiError> {
    let path = req.path().to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [] | ["index.html"] => {
            allow_get(req)?;
            serve_static(&path)
        }
        ["static", rest @ ..] => {
            allow_get(req)?;
            if rest.is_empty() || rest.iter().any(|s| *s == "..") {
                return Err(ApiError::not_found("File"));
            }
            serve_static(&path)
        }

        // === Accounts ===
        ["accounts", "register"] => users::register(cx, req),
        ["accounts", "login"] => auth::login_user(cx, req),
        ["accounts", "logout"] => auth::logout_user(cx, req),
        ["accounts", "users"] => {
            allow_get(req)?;
            users::users_list(cx, req)
        }
        ["accounts", "update"] => users::update_profile(cx, req),
        ["accounts", username] => {
            allow_get(req)?;
            users::profile_detail(cx, req, &username_segment(username)?)
        }
        ["accounts", username, "followers"] => {
            allow_get(req)?;
            follow::get_followers_list(cx, req, &username_segment(username)?)
        }
        ["accounts", username, "followings"] => {
            allow_get(req)?;
            follow::get_followings_list(cx, req, &username_segment(username)?)
        }
        ["accounts", username, "follow"] => {
            allow_get_post(req)?;
            follow::handle_follow(cx, req, &username_segment(username)?)
        }
        ["accounts", username, "unfollow"] => {
            allow_get_post(req)?;
            follow::handle_unfollow(cx, req, &username_segment(username)?)
        }

        // === Pins ===
        ["pins", "create"] => pins::handle_create_pin(cx, req),
        ["pins", "tag", tag] => {
            allow_get(req)?;
            pins::handle_pins_by_tag(cx, req, slug_segment(tag, "Tag")?)
        }
        ["pins", slug] => {
            allow_get(req)?;
            pins::handle_pin_detail(cx, req, slug_segment(slug, "Pin")?)
        }
        ["pins", slug, action] => {
            let slug = slug_segment(slug, "Pin")?;
            allow_get_post(req)?;
            match *action {
                "pinit" => pins::handle_pin_image(cx, req, slug),
                "unpinit" => pins::handle_unpin_image(cx, req, slug),
                "update" => pins::handle_update_pin(cx, req, slug),
                "delete" => pins::handle_delete_pin(cx, req, slug),
                "like" => pins::handle_like(cx, req, slug),
                "dislike" => pins::handle_dislike(cx, req, slug),
                _ => Err(ApiError::NotFound("No route found".to_string())),
            }
        }

        // === Boards ===
        ["boards", "create"] => boards::handle_create_board(cx, req),
        ["boards", slug] => {
            allow_get(req)?;
            boards::handle_board_detail(cx, req, slug_segment(slug, "Board")?)
        }
        ["boards", slug, "delete"] => {
            allow_get_post(req)?;
            boards::handle_delete_board(cx, req, slug_segment(slug, "Board")?)
        }

        _ => Err(ApiError::NotFound("No route found".to_string())),
    }
}
