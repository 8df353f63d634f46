use std::collections::{BTreeMap, HashMap};

use serde_json::json;
use spin_sdk::http::{Method, Request};
use tracing::info;
use uuid::Uuid;

use crate::config::*;
use crate::core::context::Context;
use crate::core::errors::ApiError;
use crate::core::helpers::{generate_slug, now_iso, sanitize_text};
use crate::core::pagination::paginate;
use crate::core::query_params::{get_string, parse_form, parse_query_params};
use crate::core::reply::Reply;
use crate::core::store::{KvStore, StoreExt};
use crate::models::models::{Board, Level};
use crate::pins::{build_pin_json, load_pin};
use crate::users::{build_user_json, load_user};

const SLUG_ATTEMPTS: usize = 8;

/// Store a value under a freshly generated slug, retrying on collision.
pub fn insert_with_unique_slug<T, F>(store: &dyn KvStore, key_for: fn(&str) -> String, mut build: F) -> anyhow::Result<T>
where
    T: serde::Serialize,
    F: FnMut(&str) -> T,
{
    for _ in 0..SLUG_ATTEMPTS {
        let slug = generate_slug();
        let value = build(&slug);
        if store.insert_json_new(&key_for(&slug), &value)? {
            return Ok(value);
        }
    }
    anyhow::bail!("could not generate a unique slug after {} attempts", SLUG_ATTEMPTS)
}

pub fn load_board(store: &dyn KvStore, slug: &str) -> anyhow::Result<Option<Board>> {
    store.get_json(&board_key(slug))
}

pub fn save_board(store: &dyn KvStore, board: &Board) -> anyhow::Result<()> {
    store.set_json(&board_key(&board.slug), board)
}

pub fn get_board_or_404(store: &dyn KvStore, slug: &str) -> Result<Board, ApiError> {
    load_board(store, slug)?.ok_or_else(|| ApiError::not_found("Board"))
}

/// Boards owned by `user_id`, oldest first.
pub fn user_boards(store: &dyn KvStore, user_id: &str) -> anyhow::Result<Vec<Board>> {
    let slugs: Vec<String> = store.get_json(&user_boards_key(user_id))?.unwrap_or_default();
    let mut boards = Vec::with_capacity(slugs.len());
    for slug in slugs {
        if let Some(board) = load_board(store, &slug)? {
            boards.push(board);
        }
    }
    Ok(boards)
}

/// Every board in the store, whoever owns it.
pub fn all_boards(store: &dyn KvStore) -> anyhow::Result<Vec<Board>> {
    let mut boards = Vec::new();
    for key in store.keys_with_prefix("board:")? {
        if let Some(board) = store.get_json::<Board>(&key)? {
            boards.push(board);
        }
    }
    Ok(boards)
}

pub fn create_board(store: &dyn KvStore, owner_id: &str, name: &str, description: &str) -> anyhow::Result<Board> {
    let board = insert_with_unique_slug(store, board_key, |slug| Board {
        id: Uuid::new_v4().to_string(),
        slug: slug.to_string(),
        owner_id: owner_id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        pins: Vec::new(),
        created_at: now_iso(),
    })?;

    let key = user_boards_key(owner_id);
    let mut slugs: Vec<String> = store.get_json(&key)?.unwrap_or_default();
    slugs.push(board.slug.clone());
    store.set_json(&key, &slugs)?;

    info!(board = %board.slug, owner = %owner_id, "Created board");
    Ok(board)
}

pub fn delete_board(store: &dyn KvStore, board: &Board) -> anyhow::Result<()> {
    let key = user_boards_key(&board.owner_id);
    let mut slugs: Vec<String> = store.get_json(&key)?.unwrap_or_default();
    slugs.retain(|s| s != &board.slug);
    store.set_json(&key, &slugs)?;
    store.delete(&board_key(&board.slug))
}

pub fn build_board_json(board: &Board) -> serde_json::Value {
    json!({
        "slug": board.slug,
        "name": board.name,
        "description": board.description,
        "pins_count": board.pins.len(),
        "created_at": board.created_at,
        "url": board.get_absolute_url(),
    })
}

fn validate_board_form(form: &HashMap<String, String>) -> Result<(String, String), BTreeMap<&'static str, String>> {
    let mut errors = BTreeMap::new();
    let name = sanitize_text(&get_string(form, "name").unwrap_or_default());
    let description = sanitize_text(&get_string(form, "description").unwrap_or_default());

    if name.is_empty() {
        errors.insert("name", "Board name is required".to_string());
    } else if name.chars().count() > MAX_BOARD_NAME_LENGTH {
        errors.insert("name", "Board name must be at most 100 characters".to_string());
    }
    if description.chars().count() > MAX_PIN_DESCRIPTION_LENGTH {
        errors.insert("description", "Description too long".to_string());
    }

    if errors.is_empty() {
        Ok((name, description))
    } else {
        Err(errors)
    }
}

// === HTTP Handlers ===

pub fn handle_create_board(cx: &mut Context, req: &Request) -> Result<Reply, ApiError> {
    let user = cx.login_required(req)?;

    match req.method() {
        Method::Get => Ok(cx.render(json!({ "form": {}, "errors": {} }))),
        Method::Post => {
            let form = parse_form(req);
            match validate_board_form(&form) {
                Ok((name, description)) => {
                    let board = create_board(cx.store, &user.id, &name, &description)?;
                    Ok(cx.redirect_with(
                        Level::Success,
                        format!("Board {} created", board.name),
                        board.get_absolute_url(),
                    ))
                }
                Err(errors) => Ok(cx.render(json!({
                    "form": {
                        "name": get_string(&form, "name"),
                        "description": get_string(&form, "description"),
                    },
                    "errors": errors,
                }))),
            }
        }
        _ => Err(ApiError::MethodNotAllowed),
    }
}

pub fn handle_board_detail(cx: &mut Context, req: &Request, slug: &str) -> Result<Reply, ApiError> {
    let board = get_board_or_404(cx.store, slug)?;
    let owner = load_user(cx.store, &board.owner_id)?;

    let mut pins = Vec::with_capacity(board.pins.len());
    for pin_slug in &board.pins {
        if let Some(pin) = load_pin(cx.store, pin_slug)? {
            pins.push(build_pin_json(&pin));
        }
    }

    let params = parse_query_params(req.uri());
    let page = paginate(pins, params.get("page").map(String::as_str), cx.config.page_size)?;
    let is_owner = cx.user.as_ref().is_some_and(|u| u.id == board.owner_id);

    Ok(cx.render(json!({
        "board": build_board_json(&board),
        "owner": owner.as_ref().map(build_user_json),
        "is_owner": is_owner,
        "pins": page,
    })))
}

pub fn handle_delete_board(cx: &mut Context, req: &Request, slug: &str) -> Result<Reply, ApiError> {
    let user = cx.login_required(req)?;
    let board = get_board_or_404(cx.store, slug)?;
    if board.owner_id != user.id {
        return Err(ApiError::Forbidden);
    }

    match req.method() {
        Method::Get => Ok(cx.render(json!({ "board": build_board_json(&board) }))),
        Method::Post => {
            delete_board(cx.store, &board)?;
            info!(board = %board.slug, owner = %user.id, "Deleted board");
            Ok(cx.redirect_with(
                Level::Success,
                format!("Board {} deleted", board.name),
                user.get_absolute_url(),
            ))
        }
        _ => Err(ApiError::MethodNotAllowed),
    }
}
