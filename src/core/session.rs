use spin_sdk::http::Request;
use tracing::debug;
use uuid::Uuid;

use crate::config::{session_key, user_sessions_key, Config, SESSION_COOKIE};
use crate::core::helpers::{now_iso, validate_uuid};
use crate::core::store::{KvStore, StoreExt};
use crate::models::models::{FlashMessage, Level, SessionData};

/// Cookie-backed session: the logged-in user plus queued flash messages.
///
/// A record is only written once there is something to remember, so
/// anonymous visitors without pending messages never get a cookie.
pub struct Session {
    id: Option<String>,
    data: SessionData,
    modified: bool,
    stale: Vec<String>,
    expiration_hours: i64,
}

impl Session {
    fn fresh(expiration_hours: i64) -> Self {
        Self {
            id: None,
            data: SessionData {
                user_id: None,
                created_at: now_iso(),
                messages: Vec::new(),
            },
            modified: false,
            stale: Vec::new(),
            expiration_hours,
        }
    }

    pub fn load(store: &dyn KvStore, config: &Config, req: &Request) -> anyhow::Result<Self> {
        let Some(id) = cookie_value(req, SESSION_COOKIE) else {
            return Ok(Self::fresh(config.session_expiration_hours));
        };
        if !validate_uuid(&id) {
            let mut session = Self::fresh(config.session_expiration_hours);
            session.stale.push(id);
            return Ok(session);
        }

        match store.get_json::<SessionData>(&session_key(&id))? {
            Some(data) if !is_expired(&data, config.session_expiration_hours) => Ok(Self {
                id: Some(id),
                data,
                modified: false,
                stale: Vec::new(),
                expiration_hours: config.session_expiration_hours,
            }),
            _ => {
                debug!("Discarding unknown or expired session");
                let mut session = Self::fresh(config.session_expiration_hours);
                session.stale.push(id);
                Ok(session)
            }
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.data.user_id.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Attach `user_id` under a new session id; queued messages survive.
    pub fn login(&mut self, user_id: &str) {
        self.cycle_id();
        self.data.user_id = Some(user_id.to_string());
        self.data.created_at = now_iso();
        self.modified = true;
    }

    /// Forget everything, including queued messages.
    pub fn flush(&mut self) {
        if let Some(old) = self.id.take() {
            self.stale.push(old);
        }
        self.data = Self::fresh(self.expiration_hours).data;
        self.modified = true;
    }

    pub fn cycle_id(&mut self) {
        if let Some(old) = self.id.take() {
            self.stale.push(old);
        }
        self.modified = true;
    }

    pub fn add_message(&mut self, level: Level, message: impl Into<String>) {
        self.data.messages.push(FlashMessage {
            level,
            message: message.into(),
        });
        self.modified = true;
    }

    pub fn take_messages(&mut self) -> Vec<FlashMessage> {
        if !self.data.messages.is_empty() {
            self.modified = true;
        }
        std::mem::take(&mut self.data.messages)
    }

    /// Persist changes and return the `set-cookie` value the response needs, if any.
    pub fn save(&mut self, store: &dyn KvStore) -> anyhow::Result<Option<String>> {
        let had_stale = !self.stale.is_empty();
        let had_cookie = self.id.is_some() || had_stale;
        for old in std::mem::take(&mut self.stale) {
            delete_session(store, &old)?;
        }

        if !self.modified {
            return Ok((had_stale && self.id.is_none()).then(expired_cookie));
        }
        self.modified = false;

        let is_empty = self.data.user_id.is_none() && self.data.messages.is_empty();
        if is_empty {
            if let Some(id) = self.id.take() {
                delete_session(store, &id)?;
            }
            return Ok(had_cookie.then(expired_cookie));
        }

        let (id, is_new) = match &self.id {
            Some(id) => (id.clone(), false),
            None => (Uuid::new_v4().to_string(), true),
        };
        store.set_json(&session_key(&id), &self.data)?;

        if let Some(user_id) = &self.data.user_id {
            let key = user_sessions_key(user_id);
            let ids: Vec<String> = store.get_json(&key)?.unwrap_or_default();
            if !ids.contains(&id) {
                let mut live = prune_sessions(store, ids, self.expiration_hours)?;
                live.push(id.clone());
                store.set_json(&key, &live)?;
            }
        }

        self.id = Some(id.clone());
        Ok(is_new.then(|| session_cookie(&id)))
    }
}

/// Remove a session record and its entry in the owner's session index.
pub fn delete_session(store: &dyn KvStore, id: &str) -> anyhow::Result<()> {
    let key = session_key(id);
    if let Some(data) = store.get_json::<SessionData>(&key)? {
        if let Some(user_id) = data.user_id {
            let index_key = user_sessions_key(&user_id);
            let mut ids: Vec<String> = store.get_json(&index_key)?.unwrap_or_default();
            ids.retain(|s| s != id);
            store.set_json(&index_key, &ids)?;
        }
    }
    store.delete(&key)
}

/// Delete every session of `user_id` except `keep`.
pub fn delete_user_sessions(store: &dyn KvStore, user_id: &str, keep: Option<&str>) -> anyhow::Result<()> {
    let ids: Vec<String> = store.get_json(&user_sessions_key(user_id))?.unwrap_or_default();
    for id in ids.iter().filter(|id| Some(id.as_str()) != keep) {
        delete_session(store, id)?;
    }
    Ok(())
}

/// Drop records that are gone or expired from an index, deleting the expired ones.
fn prune_sessions(store: &dyn KvStore, ids: Vec<String>, expiration_hours: i64) -> anyhow::Result<Vec<String>> {
    let mut live = Vec::with_capacity(ids.len());
    for id in ids {
        let key = session_key(&id);
        match store.get_json::<SessionData>(&key)? {
            Some(data) if !is_expired(&data, expiration_hours) => live.push(id),
            Some(_) => store.delete(&key)?,
            None => {}
        }
    }
    Ok(live)
}

fn is_expired(data: &SessionData, expiration_hours: i64) -> bool {
    let Ok(created) = chrono::DateTime::parse_from_rfc3339(&data.created_at) else {
        return true;
    };
    let Some(limit) = chrono::Duration::try_hours(expiration_hours) else {
        return false;
    };
    chrono::Utc::now() - created.with_timezone(&chrono::Utc) > limit
}

pub fn cookie_value(req: &Request, name: &str) -> Option<String> {
    let header = req.header("cookie")?.as_str()?;
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

fn session_cookie(id: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id)
}

fn expired_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}
