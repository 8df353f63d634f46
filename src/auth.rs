use serde_json::json;
use spin_sdk::http::{Method, Request};
use tracing::{info, warn};

use crate::core::context::Context;
use crate::core::errors::ApiError;
use crate::core::helpers::{is_safe_redirect, verify_password};
use crate::core::query_params::{get_string, parse_form, parse_query_params};
use crate::core::reply::Reply;
use crate::core::store::KvStore;
use crate::models::models::{Level, Profile};
use crate::users::find_by_username;

const LOGIN_URL: &str = "/accounts/login/";

/// Authenticated users have no business on the register and login pages.
pub fn anonymous_redirect(cx: &Context) -> Option<Reply> {
    cx.user
        .as_ref()
        .map(|user| Reply::redirect(user.get_absolute_url()))
}

/// Check credentials against the stored argon2 hash. Inactive users never authenticate.
pub fn authenticate(store: &dyn KvStore, username: &str, password: &str) -> anyhow::Result<Option<Profile>> {
    Ok(find_by_username(store, username)?
        .filter(|user| user.is_active && verify_password(password, &user.password)))
}

fn render_login_form(cx: &mut Context, username: &str, error: Option<&str>) -> Reply {
    let errors = match error {
        Some(msg) => json!({ "__all__": msg }),
        None => json!({}),
    };
    cx.render(json!({
        "form": { "username": username },
        "errors": errors,
    }))
}

pub fn login_user(cx: &mut Context, req: &Request) -> Result<Reply, ApiError> {
    if let Some(reply) = anonymous_redirect(cx) {
        return Ok(reply);
    }

    match req.method() {
        Method::Get => Ok(render_login_form(cx, "", None)),
        Method::Post => {
            let form = parse_form(req);
            let username = get_string(&form, "username").unwrap_or_default();
            let password = form.get("password").cloned().unwrap_or_default();

            if username.is_empty() || password.is_empty() {
                return Ok(render_login_form(cx, &username, Some("Username and password are required")));
            }

            let Some(user) = authenticate(cx.store, &username, &password)? else {
                warn!(username = %username, "Failed login attempt");
                return Ok(render_login_form(
                    cx,
                    &username,
                    Some("Please enter a correct username and password"),
                ));
            };

            cx.session.login(&user.id);
            info!(user_id = %user.id, "User logged in");
            cx.user = Some(user);

            let next = parse_query_params(req.uri())
                .remove("next")
                .or_else(|| form.get("next").cloned())
                .filter(|target| is_safe_redirect(target))
                .unwrap_or_else(|| LOGIN_URL.to_string());

            Ok(cx.redirect_with(Level::Success, "Great! Now you can use this service like a pro", next))
        }
        _ => Err(ApiError::MethodNotAllowed),
    }
}

pub fn logout_user(cx: &mut Context, _req: &Request) -> Result<Reply, ApiError> {
    if let Some(user) = cx.user.take() {
        info!(user_id = %user.id, "User logged out");
    }
    cx.session.flush();
    Ok(cx.redirect_with(Level::Success, "You've logged out successfully", "/accounts/register/"))
}
