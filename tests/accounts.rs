mod common;

use common::App;
use pinboard::config::{session_key, user_key, user_sessions_key};
use pinboard::core::db::{init_test_data, reset_db_data};
use pinboard::core::store::{KvStore, StoreExt};
use pinboard::models::models::SessionData;
use pinboard::users::find_by_username;

#[test]
fn test_register_then_login_flow() {
    let app = App::new();
    let mut client = app.client();

    let form = client.get("/accounts/register/");
    assert_eq!(form.status, 200);
    assert_eq!(form.json()["form"]["username"], "");

    let resp = client.register("alice", "secret");
    assert_eq!(resp.status, 302);
    assert_eq!(resp.location(), "/accounts/login/");

    let messages = client.messages_after(&resp);
    assert!(messages.contains(&"Successfully created your account".to_string()));
    assert!(messages.contains(&"Registration completed! Now log in".to_string()));

    let resp = client.login("alice", "secret");
    assert_eq!(resp.status, 302);
    assert_eq!(resp.location(), "/accounts/login/");

    // An authenticated visit to the login page lands on the own profile.
    let resp = client.get("/accounts/login/");
    assert_eq!(resp.status, 302);
    assert_eq!(resp.location(), "/accounts/alice/");
    let messages = client.messages_after(&resp);
    assert_eq!(messages, vec!["Great! Now you can use this service like a pro".to_string()]);
}

#[test]
fn test_register_rejects_duplicate_username() {
    let app = App::new();
    app.client().register("bob", "pw1");

    let mut other = app.client();
    let resp = other.register("bob", "pw2");
    assert_eq!(resp.status, 200);
    let body = resp.json();
    assert_eq!(body["errors"]["username"], "A user with that username already exists");
    assert_eq!(body["form"]["username"], "bob");

    // The first password still works, the second one never took.
    assert_eq!(other.login("bob", "pw2").status, 200);
    assert_eq!(other.login("bob", "pw1").status, 302);
}

#[test]
fn test_register_validation_errors() {
    let app = App::new();
    let mut client = app.client();

    let resp = client.register("users", "pw1");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.json()["errors"]["username"], "This username is reserved");

    let resp = client.register("ab", "pw1");
    assert!(resp.json()["errors"]["username"].is_string());

    let resp = client.register("bad name", "pw1");
    assert!(resp.json()["errors"]["username"].is_string());

    let resp = client.post(
        "/accounts/register/",
        &[("username", "carol"), ("password", "abc"), ("password_confirm", "abd")],
    );
    assert_eq!(resp.status, 200);
    assert_eq!(resp.json()["errors"]["password_confirm"], "The two password fields didn't match");

    let resp = client.register("carol", "");
    assert_eq!(resp.json()["errors"]["password"], "Password is required");

    // Nothing was created along the way.
    assert_eq!(client.login("carol", "abc").status, 200);
}

#[test]
fn test_login_failures_rerender_form() {
    let app = App::new();
    app.client().register("dave", "pass");

    let mut client = app.client();
    let resp = client.login("dave", "wrong");
    assert_eq!(resp.status, 200);
    let body = resp.json();
    assert_eq!(body["errors"]["__all__"], "Please enter a correct username and password");
    assert_eq!(body["form"]["username"], "dave");

    let resp = client.login("nobody", "pass");
    assert_eq!(resp.json()["errors"]["__all__"], "Please enter a correct username and password");

    let resp = client.login("", "");
    assert_eq!(resp.json()["errors"]["__all__"], "Username and password are required");
}

#[test]
fn test_login_required_redirects_with_next() {
    let app = App::new();
    app.client().register("erin", "pass");

    let mut client = app.client();
    let resp = client.get("/accounts/users/?page=1");
    assert_eq!(resp.status, 302);
    assert_eq!(resp.location(), "/accounts/login/?next=%2Faccounts%2Fusers%2F%3Fpage%3D1");

    let resp = client.post(
        "/accounts/login/?next=%2Faccounts%2Fusers%2F%3Fpage%3D1",
        &[("username", "erin"), ("password", "pass")],
    );
    assert_eq!(resp.status, 302);
    assert_eq!(resp.location(), "/accounts/users/?page=1");
    assert_eq!(client.get(resp.location()).status, 200);
}

#[test]
fn test_login_ignores_offsite_next() {
    let app = App::new();
    let mut client = app.client();
    client.register("frank", "pass");

    let resp = client.post(
        "/accounts/login/",
        &[("username", "frank"), ("password", "pass"), ("next", "//evil.example.com/")],
    );
    assert_eq!(resp.status, 302);
    assert_eq!(resp.location(), "/accounts/login/");
}

#[test]
fn test_logout_ends_session() {
    let app = App::new();
    let mut client = app.user("gina");
    assert_eq!(client.get("/accounts/users/").status, 200);

    let resp = client.get("/accounts/logout/");
    assert_eq!(resp.status, 302);
    assert_eq!(resp.location(), "/accounts/register/");
    let messages = client.messages_after(&resp);
    assert!(messages.contains(&"You've logged out successfully".to_string()));

    let resp = client.get("/accounts/users/");
    assert_eq!(resp.status, 302);
    assert!(resp.location().starts_with("/accounts/login/?next="));
}

#[test]
fn test_stale_cookie_is_cleared() {
    let app = App::new();
    let mut client = app.client();
    client.cookie = Some("not-a-session".to_string());

    let resp = client.get("/accounts/register/");
    assert_eq!(resp.status, 200);
    assert!(resp.set_cookie.as_deref().is_some_and(|c| c.contains("Max-Age=0")));
    assert!(client.cookie.is_none());
}

#[test]
fn test_authenticated_user_skips_register_page() {
    let app = App::new();
    let mut client = app.user("hank");

    let resp = client.get("/accounts/register/");
    assert_eq!(resp.status, 302);
    assert_eq!(resp.location(), "/accounts/hank/");
}

#[test]
fn test_profile_detail_context() {
    let app = App::new();
    let mut alice = app.user("alice");
    let mut bob = app.user("bob");
    alice.get("/accounts/bob/follow/");

    let body = alice.get("/accounts/bob/").json();
    assert_eq!(body["user"]["username"], "bob");
    assert_eq!(body["user"]["url"], "/accounts/bob/");
    assert_eq!(body["self_user"]["username"], "alice");
    assert_eq!(body["followers_count"], 1);
    assert_eq!(body["followings_count"], 0);
    assert_eq!(body["is_following"], true);
    assert!(body["user"].get("password").is_none());

    let new_users: Vec<&str> = body["new_users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(new_users, vec!["bob", "alice"]);

    let body = bob.get("/accounts/alice/").json();
    assert_eq!(body["is_following"], false);
    assert_eq!(body["followings_count"], 1);
}

#[test]
fn test_profile_detail_html() {
    let app = App::new();
    let mut client = app.user("ivy");
    client.post("/accounts/update/", &[("bio", "<b>Loves</b> ferns")]);

    let resp = client.get_html("/accounts/ivy/");
    assert_eq!(resp.status, 200);
    assert!(resp.content_type.as_deref().unwrap().starts_with("text/html"));
    let html = resp.text();
    assert!(html.contains("<h1>ivy</h1>"));
    assert!(html.contains("Loves ferns"));
    assert!(html.contains("Your profile has been updated"));
    assert!(!html.contains("PROFILE_"));
}

#[test]
fn test_unknown_profile_is_404() {
    let app = App::new();
    let mut client = app.user("jack");
    assert_eq!(client.get("/accounts/nobody/").status, 404);
    assert_eq!(client.get("/accounts/nobody/followers/").status, 404);
}

#[test]
fn test_users_list_pagination() {
    let app = App::with_page_size(2);
    for name in ["u1", "u2", "u3"] {
        app.client().register(name, name);
    }
    let mut client = app.client();
    client.login("u1", "u1");

    let body = client.get("/accounts/users/").json();
    let page = &body["users"];
    assert_eq!(page["count"], 3);
    assert_eq!(page["num_pages"], 2);
    assert_eq!(page["has_next"], true);
    assert_eq!(page["items"][0]["username"], "u1");
    assert_eq!(page["items"][1]["username"], "u2");

    let body = client.get("/accounts/users/?page=last").json();
    assert_eq!(body["users"]["number"], 2);
    assert_eq!(body["users"]["items"][0]["username"], "u3");
    assert_eq!(body["users"]["has_previous"], true);

    assert_eq!(client.get("/accounts/users/?page=abc").status, 404);
    assert_eq!(client.get("/accounts/users/?page=3").status, 404);
    assert_eq!(client.get("/accounts/users/?page=0").status, 404);
}

#[test]
fn test_update_profile_bio() {
    let app = App::new();
    let mut client = app.user("kate");

    let resp = client.post("/accounts/update/", &[("bio", "Hello <script>alert(1)</script>there")]);
    assert_eq!(resp.status, 302);
    assert_eq!(resp.location(), "/accounts/kate/");

    let body = client.get("/accounts/kate/").json();
    assert_eq!(body["user"]["bio"], "Hello there");

    let long_bio = "x".repeat(501);
    let resp = client.post("/accounts/update/", &[("bio", &long_bio)]);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.json()["errors"]["bio"], "Bio too long (max 500 chars)");
}

#[test]
fn test_password_change_revokes_other_sessions() {
    let app = App::new();
    let mut laptop = app.user("leo");
    let mut phone = app.client();
    phone.login("leo", "leo");
    assert_eq!(phone.get("/accounts/users/").status, 200);

    let resp = laptop.post(
        "/accounts/update/",
        &[("old_password", "wrong"), ("new_password", "newpass")],
    );
    assert_eq!(resp.status, 200);
    assert_eq!(resp.json()["errors"]["old_password"], "Your old password was entered incorrectly");

    let old_cookie = laptop.cookie.clone();
    let resp = laptop.post(
        "/accounts/update/",
        &[("old_password", "leo"), ("new_password", "newpass")],
    );
    assert_eq!(resp.status, 302);
    assert_ne!(laptop.cookie, old_cookie);
    assert_eq!(laptop.get("/accounts/users/").status, 200);

    let resp = phone.get("/accounts/users/");
    assert_eq!(resp.status, 302);
    assert!(resp.location().starts_with("/accounts/login/"));

    let mut fresh = app.client();
    assert_eq!(fresh.login("leo", "leo").status, 200);
    assert_eq!(fresh.login("leo", "newpass").status, 302);
}

#[test]
fn test_wrong_method_is_rejected() {
    let app = App::new();
    let mut client = app.user("mia");
    let resp = client.post("/accounts/users/", &[]);
    assert_eq!(resp.status, 405);
}

#[test]
fn test_demo_data_seed_and_reset() {
    let app = App::new();
    init_test_data(&app.store).unwrap();
    init_test_data(&app.store).unwrap();

    let mut client = app.client();
    assert_eq!(client.login("test", "test").status, 302);

    let body = client.get("/accounts/test/").json();
    assert_eq!(body["followings_count"], 1);
    assert_eq!(body["is_following"], false);

    let body = client.get("/accounts/users/").json();
    assert_eq!(body["users"]["count"], 3);

    let body = client.get("/pins/tag/baking/").json();
    assert_eq!(body["pins"]["count"], 1);

    reset_db_data(&app.store).unwrap();
    assert!(app.store.keys().unwrap().is_empty());
}

fn backdate_session(app: &App, id: &str) {
    let key = session_key(id);
    let mut data: SessionData = app.store.get_json(&key).unwrap().unwrap();
    data.created_at = "2000-01-01T00:00:00Z".to_string();
    app.store.set_json(&key, &data).unwrap();
}

#[test]
fn test_expired_session_is_discarded() {
    let app = App::new();
    let mut client = app.user("nina");
    assert_eq!(client.get("/accounts/users/").status, 200);

    let id = client.cookie.clone().unwrap();
    backdate_session(&app, &id);

    let resp = client.get("/accounts/users/");
    assert_eq!(resp.status, 302);
    assert!(resp.location().starts_with("/accounts/login/?next="));
    assert!(client.cookie.is_none());
    assert!(app.store.get(&session_key(&id)).unwrap().is_none());
}

#[test]
fn test_inactive_user_becomes_anonymous() {
    let app = App::new();
    let mut client = app.user("oscar");
    assert_eq!(client.get("/accounts/users/").status, 200);
    let id = client.cookie.clone().unwrap();

    let mut user = find_by_username(&app.store, "oscar").unwrap().unwrap();
    user.is_active = false;
    app.store.set_json(&user_key(&user.id), &user).unwrap();

    let resp = client.get("/accounts/users/");
    assert_eq!(resp.status, 302);
    assert!(resp.location().starts_with("/accounts/login/"));
    assert!(app.store.get(&session_key(&id)).unwrap().is_none());

    // Inactive accounts cannot log back in either.
    assert_eq!(client.login("oscar", "oscar").status, 200);
}

#[test]
fn test_login_prunes_expired_sessions() {
    let app = App::new();
    let mut old_device = app.user("paula");
    let old_id = old_device.cookie.clone().unwrap();
    backdate_session(&app, &old_id);

    let mut new_device = app.client();
    assert_eq!(new_device.login("paula", "paula").status, 302);
    let new_id = new_device.cookie.clone().unwrap();

    let user = find_by_username(&app.store, "paula").unwrap().unwrap();
    let index: Vec<String> = app.store.get_json(&user_sessions_key(&user.id)).unwrap().unwrap();
    assert_eq!(index, vec![new_id]);
    assert!(app.store.get(&session_key(&old_id)).unwrap().is_none());
}

#[test]
fn test_username_length_counts_characters() {
    let app = App::new();
    let mut client = app.client();

    let accented = "é".repeat(26);
    let resp = client.register(&accented, "pw1");
    assert_eq!(resp.status, 302);

    let too_long = "é".repeat(51);
    let resp = client.register(&too_long, "pw1");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.json()["errors"]["username"], "Username must be 3-50 characters");
}
