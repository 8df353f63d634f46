use http::StatusCode;
use serde_json::Value;
use spin_sdk::http::Request;
use tracing::debug;

use crate::config::{user_key, Config};
use crate::core::errors::ApiError;
use crate::core::reply::Reply;
use crate::core::session::Session;
use crate::core::store::{KvStore, StoreExt};
use crate::models::models::{Level, Profile};

/// Per-request state shared by the views.
pub struct Context<'a> {
    pub store: &'a dyn KvStore,
    pub config: &'a Config,
    pub session: Session,
    pub user: Option<Profile>,
}

impl<'a> Context<'a> {
    pub fn load(store: &'a dyn KvStore, config: &'a Config, req: &Request) -> anyhow::Result<Self> {
        let mut session = Session::load(store, config, req)?;

        let user = match session.user_id() {
            Some(id) => match store.get_json::<Profile>(&user_key(id))? {
                Some(profile) if profile.is_active => Some(profile),
                _ => {
                    debug!("Session user is gone or inactive, treating request as anonymous");
                    session.flush();
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            store,
            config,
            session,
            user,
        })
    }

    pub fn login_required(&self, req: &Request) -> Result<Profile, ApiError> {
        self.user.clone().ok_or_else(|| ApiError::LoginRequired {
            next: request_path(req),
        })
    }

    pub fn flash(&mut self, level: Level, message: impl Into<String>) {
        self.session.add_message(level, message);
    }

    /// Queue a notice and redirect, the usual ending of an action view.
    pub fn redirect_with(&mut self, level: Level, message: impl Into<String>, to: impl Into<String>) -> Reply {
        self.flash(level, message);
        Reply::redirect(to)
    }

    /// Render a JSON context, draining pending flash messages into it.
    pub fn render(&mut self, context: Value) -> Reply {
        let mut context = match context {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        let messages = self.session.take_messages();
        context.insert(
            "messages".to_string(),
            serde_json::to_value(messages).unwrap_or(Value::Array(Vec::new())),
        );
        Reply::Json {
            status: StatusCode::OK,
            body: Value::Object(context),
        }
    }
}

/// Path plus query string of the request, used as a post-login target.
pub fn request_path(req: &Request) -> String {
    let uri = req.uri();
    match uri.find('?') {
        Some(idx) => format!("{}{}", req.path(), &uri[idx..]),
        None => req.path().to_string(),
    }
}
