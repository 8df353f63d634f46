use std::collections::HashSet;
use std::sync::OnceLock;

use ammonia::Builder;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use regex::Regex;
use uuid::Uuid;

use crate::config::SLUG_LENGTH;

pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn validate_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

/// Short unique-ish slug for boards and pins: the first hex digits of a v4 UUID.
pub fn generate_slug() -> String {
    Uuid::new_v4().simple().to_string()[..SLUG_LENGTH].to_string()
}

/// Strips every HTML tag, leaving plain text.
pub fn sanitize_text(text: &str) -> String {
    Builder::default()
        .tags(HashSet::new())
        .clean(text)
        .to_string()
}

/// Lowercases and collapses runs of anything but `[a-z0-9_]` into single dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn slug_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[0-9A-Za-z_\-]+$").expect("Regex should compile"))
}

fn username_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[\w.@+\-]+$").expect("Regex should compile"))
}

fn image_url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^https?://[^\s<>]+$").expect("Regex should compile"))
}

pub fn is_valid_slug(slug: &str) -> bool {
    slug_regex().is_match(slug)
}

pub fn is_valid_username(username: &str) -> bool {
    username_regex().is_match(username)
}

pub fn is_valid_image_url(url: &str) -> bool {
    image_url_regex().is_match(url)
}

/// Only same-site absolute paths are accepted as post-login targets.
pub fn is_safe_redirect(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Street Art!! 2016 "), "street-art-2016");
        assert_eq!(slugify("--cats--"), "cats");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn generated_slugs_are_url_safe() {
        let slug = generate_slug();
        assert_eq!(slug.len(), SLUG_LENGTH);
        assert!(is_valid_slug(&slug));
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("other", &hash));
        assert!(!verify_password("s3cret", "not-a-phc-string"));
    }

    #[test]
    fn redirect_targets_must_stay_local() {
        assert!(is_safe_redirect("/accounts/users/"));
        assert!(!is_safe_redirect("//evil.example"));
        assert!(!is_safe_redirect("https://evil.example"));
    }

    #[test]
    fn sanitize_text_strips_markup() {
        assert_eq!(sanitize_text("<b>hi</b><script>x</script>"), "hi");
    }
}
