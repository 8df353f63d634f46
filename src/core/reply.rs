use http::StatusCode;
use serde_json::{json, Value};
use spin_sdk::http::Response;

use crate::core::errors::ApiError;

/// What a view produced, before the session cookie is attached.
#[derive(Debug)]
pub enum Reply {
    Json { status: StatusCode, body: Value },
    Redirect(String),
    Html(String),
    Asset { content_type: String, body: Vec<u8> },
}

impl Reply {
    pub fn redirect(location: impl Into<String>) -> Self {
        Reply::Redirect(location.into())
    }

    pub fn into_response(self, set_cookie: Option<String>) -> Response {
        let mut builder = Response::builder();
        if let Some(cookie) = set_cookie {
            builder.header("set-cookie", cookie);
        }

        match self {
            Reply::Json { status, body } => builder
                .status(status.as_u16())
                .header("content-type", "application/json")
                .body(body.to_string().into_bytes())
                .build(),
            Reply::Redirect(location) => builder
                .status(StatusCode::FOUND.as_u16())
                .header("location", location)
                .body(Vec::new())
                .build(),
            Reply::Html(html) => builder
                .status(StatusCode::OK.as_u16())
                .header("content-type", "text/html; charset=utf-8")
                .body(html.into_bytes())
                .build(),
            Reply::Asset { content_type, body } => builder
                .status(StatusCode::OK.as_u16())
                .header("content-type", content_type)
                .body(body)
                .build(),
        }
    }
}

impl From<ApiError> for Reply {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::LoginRequired { next } => Reply::Redirect(format!(
                "/accounts/login/?next={}",
                urlencoding::encode(&next)
            )),
            other => Reply::Json {
                status: other.status(),
                body: json!({ "error": other.public_message() }),
            },
        }
    }
}
