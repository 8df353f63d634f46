use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

// === Validation limits ===
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 3;
pub const MAX_BIO_LENGTH: usize = 500;
pub const MAX_PIN_TITLE_LENGTH: usize = 200;
pub const MAX_PIN_DESCRIPTION_LENGTH: usize = 5000;
pub const MAX_BOARD_NAME_LENGTH: usize = 100;
pub const MAX_TAG_LENGTH: usize = 50;
pub const SLUG_LENGTH: usize = 12;
pub const NEW_USERS_COUNT: usize = 5;
pub const DEFAULT_BOARD_NAME: &str = "My pins";

/// Usernames that would shadow a fixed `/accounts/...` route.
pub const RESERVED_USERNAMES: &[&str] = &["users", "register", "login", "logout", "update"];

pub const SESSION_COOKIE: &str = "pinboard_session";

// === Store keys ===
pub const USERS_LIST_KEY: &str = "users_list";
pub const RELATIONSHIP_PREFIX: &str = "relationship:";

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

pub fn relationship_key(follower_id: &str, following_id: &str) -> String {
    format!("{}{}:{}", RELATIONSHIP_PREFIX, follower_id, following_id)
}

pub fn session_key(id: &str) -> String {
    format!("session:{}", id)
}

pub fn user_sessions_key(user_id: &str) -> String {
    format!("sessions:{}", user_id)
}

pub fn pin_key(slug: &str) -> String {
    format!("pin:{}", slug)
}

pub fn tag_key(slug: &str) -> String {
    format!("tag:{}", slug)
}

pub fn board_key(slug: &str) -> String {
    format!("board:{}", slug)
}

pub fn user_boards_key(user_id: &str) -> String {
    format!("boards:{}", user_id)
}

// === Runtime configuration ===
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub session_expiration_hours: i64,
    pub page_size: usize,
    pub seed_demo_data: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:80".to_string(),
            session_expiration_hours: 24,
            page_size: 10,
            seed_demo_data: false,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let defaults = Self::default();
        Self {
            bind_address: try_load("PINBOARD_BIND_ADDRESS", defaults.bind_address),
            session_expiration_hours: try_load(
                "PINBOARD_SESSION_EXPIRATION_HOURS",
                defaults.session_expiration_hours,
            ),
            page_size: try_load("PINBOARD_PAGE_SIZE", defaults.page_size).max(1),
            seed_demo_data: try_load("PINBOARD_SEED_DEMO_DATA", defaults.seed_demo_data),
        }
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}
