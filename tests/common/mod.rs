#![allow(dead_code)]

use pinboard::config::{Config, SESSION_COOKIE};
use pinboard::core::store::MemoryStore;
use pinboard::router;
use serde_json::Value;
use spin_sdk::http::{Method, Request};

/// One application instance: a store plus its configuration.
pub struct App {
    pub store: MemoryStore,
    pub config: Config,
}

impl App {
    pub fn new() -> Self {
        Self::with_page_size(10)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            store: MemoryStore::new(),
            config: Config {
                page_size,
                ..Config::default()
            },
        }
    }

    pub fn client(&self) -> Client<'_> {
        Client { app: self, cookie: None }
    }

    /// Register `username` (password equal to the username) and return a logged-in client.
    pub fn user(&self, username: &str) -> Client<'_> {
        let mut client = self.client();
        client.register(username, username);
        client.login(username, username);
        client
    }
}

pub struct TestResponse {
    pub status: u16,
    pub location: Option<String>,
    pub set_cookie: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body should be JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn location(&self) -> &str {
        self.location.as_deref().expect("response should redirect")
    }

    /// Flash message texts carried by a rendered context.
    pub fn messages(&self) -> Vec<String> {
        self.json()["messages"]
            .as_array()
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|m| m["message"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A browser-like client: remembers the session cookie between requests.
pub struct Client<'a> {
    pub app: &'a App,
    pub cookie: Option<String>,
}

impl<'a> Client<'a> {
    pub fn request(&mut self, method: Method, uri: &str, body: &str, headers: &[(&str, &str)]) -> TestResponse {
        let mut builder = Request::builder();
        builder.method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder.header("cookie", format!("{}={}", SESSION_COOKIE, cookie));
        }
        for (name, value) in headers {
            builder.header(*name, *value);
        }
        let req = builder.body(body.as_bytes().to_vec()).build();

        let resp = router::route(&self.app.store, &self.app.config, &req);
        let header = |name: &str| resp.header(name).and_then(|h| h.as_str()).map(str::to_string);
        let response = TestResponse {
            status: *resp.status(),
            location: header("location"),
            set_cookie: header("set-cookie"),
            content_type: header("content-type"),
            body: resp.body().to_vec(),
        };

        if let Some(set_cookie) = &response.set_cookie {
            self.store_cookie(set_cookie);
        }
        response
    }

    fn store_cookie(&mut self, set_cookie: &str) {
        if set_cookie.contains("Max-Age=0") {
            self.cookie = None;
            return;
        }
        let prefix = format!("{}=", SESSION_COOKIE);
        self.cookie = set_cookie
            .split(';')
            .next()
            .and_then(|pair| pair.trim().strip_prefix(&prefix))
            .map(str::to_string);
    }

    pub fn get(&mut self, uri: &str) -> TestResponse {
        self.request(Method::Get, uri, "", &[])
    }

    pub fn get_html(&mut self, uri: &str) -> TestResponse {
        self.request(Method::Get, uri, "", &[("accept", "text/html,application/xhtml+xml")])
    }

    pub fn post(&mut self, uri: &str, form: &[(&str, &str)]) -> TestResponse {
        let body = form
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        self.request(
            Method::Post,
            uri,
            &body,
            &[("content-type", "application/x-www-form-urlencoded")],
        )
    }

    pub fn post_json(&mut self, uri: &str, body: &Value) -> TestResponse {
        self.request(
            Method::Post,
            uri,
            &body.to_string(),
            &[("content-type", "application/json")],
        )
    }

    /// Follow a redirect and return the flash messages rendered there.
    pub fn messages_after(&mut self, resp: &TestResponse) -> Vec<String> {
        let location = resp.location().to_string();
        self.get(&location).messages()
    }

    pub fn register(&mut self, username: &str, password: &str) -> TestResponse {
        self.post(
            "/accounts/register/",
            &[
                ("username", username),
                ("password", password),
                ("password_confirm", password),
            ],
        )
    }

    pub fn login(&mut self, username: &str, password: &str) -> TestResponse {
        self.post("/accounts/login/", &[("username", username), ("password", password)])
    }

    /// Create a pin and return its slug.
    pub fn create_pin(&mut self, title: &str, tags: &str) -> String {
        let resp = self.post(
            "/pins/create/",
            &[
                ("title", title),
                ("description", "A description"),
                ("image_url", "https://images.example.com/pin.jpg"),
                ("tags", tags),
            ],
        );
        assert_eq!(resp.status, 302, "pin creation failed: {}", resp.text());
        resp.location()
            .trim_start_matches("/pins/")
            .trim_end_matches('/')
            .to_string()
    }
}
