use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use spin_sdk::http::Request;

use crate::models::models::{FlashMessage, Profile};
use crate::static_server::Assets;

pub struct ProfilePage<'a> {
    pub user: &'a Profile,
    pub self_user: &'a Profile,
    pub followers_count: usize,
    pub followings_count: usize,
    pub new_users: &'a [Profile],
    pub is_following: bool,
    pub messages: &'a [FlashMessage],
}

/// Browsers ask for HTML; everything else gets the JSON context.
pub fn wants_html(req: &Request) -> bool {
    req.header("accept")
        .and_then(|h| h.as_str())
        .is_some_and(|accept| accept.contains("text/html"))
}

fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"PROFILE_[A-Z_]+").expect("Regex should compile"))
}

fn load_template(name: &str) -> anyhow::Result<String> {
    let template = Assets::get(&format!("templates/{}", name))
        .ok_or_else(|| anyhow::anyhow!("Template {} not found", name))?
        .data
        .to_vec();
    Ok(String::from_utf8(template)?)
}

pub fn render_user_profile(page: &ProfilePage) -> anyhow::Result<String> {
    let template = load_template("profile.html")?;
    let user = page.user;

    let escaped_username = html_escape::encode_text(&user.username).to_string();
    let escaped_user_url = html_escape::encode_double_quoted_attribute(&user.get_absolute_url()).to_string();

    let bio_section = user
        .bio
        .as_ref()
        .map(|bio| {
            format!(
                r#"<div class="profile-field">
                <div class="profile-field-label">Bio</div>
                <div class="profile-field-value">{}</div>
            </div>"#,
                html_escape::encode_text(bio)
            )
        })
        .unwrap_or_default();

    // No follow button on your own page.
    let follow_action = if user.id == page.self_user.id {
        String::new()
    } else if page.is_following {
        format!(r#"<a class="button" href="{}unfollow/">Unfollow</a>"#, escaped_user_url)
    } else {
        format!(r#"<a class="button" href="{}follow/">Follow</a>"#, escaped_user_url)
    };

    let messages: String = page
        .messages
        .iter()
        .map(|m| {
            let level = serde_json::to_value(m.level)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            format!(
                r#"<li class="message {}">{}</li>"#,
                level,
                html_escape::encode_text(&m.message)
            )
        })
        .collect();

    let new_users: String = page
        .new_users
        .iter()
        .map(|u| {
            format!(
                r#"<li><a href="{}">{}</a></li>"#,
                html_escape::encode_double_quoted_attribute(&u.get_absolute_url()),
                html_escape::encode_text(&u.username)
            )
        })
        .collect();

    let values: HashMap<&str, String> = HashMap::from([
        ("PROFILE_USERNAME", escaped_username),
        ("PROFILE_URL", escaped_user_url),
        ("PROFILE_BIO", bio_section),
        ("PROFILE_FOLLOWERS_COUNT", page.followers_count.to_string()),
        ("PROFILE_FOLLOWINGS_COUNT", page.followings_count.to_string()),
        ("PROFILE_FOLLOW_ACTION", follow_action),
        ("PROFILE_MESSAGES", messages),
        ("PROFILE_NEW_USERS", new_users),
    ]);

    // Single pass, so substituted user text is never scanned for placeholders again.
    let html = placeholder_regex().replace_all(&template, |caps: &regex::Captures| {
        values
            .get(&caps[0])
            .cloned()
            .unwrap_or_else(|| caps[0].to_string())
    });

    Ok(html.into_owned())
}
