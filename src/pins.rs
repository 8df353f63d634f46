use std::collections::{BTreeMap, HashMap};

use serde_json::json;
use spin_sdk::http::{Method, Request};
use tracing::info;
use uuid::Uuid;

use crate::boards::{all_boards, build_board_json, create_board, insert_with_unique_slug, load_board, save_board, user_boards};
use crate::config::*;
use crate::core::context::Context;
use crate::core::errors::ApiError;
use crate::core::helpers::{is_valid_image_url, now_iso, sanitize_text, slugify};
use crate::core::pagination::paginate;
use crate::core::query_params::{get_string, parse_form, parse_query_params};
use crate::core::reply::Reply;
use crate::core::store::{KvStore, StoreExt};
use crate::models::models::{Board, Level, Pin, Profile};
use crate::users::{build_user_json, load_user};

type FormErrors = BTreeMap<&'static str, String>;

struct PinForm {
    title: String,
    description: String,
    image_url: String,
    tags: Vec<String>,
}

pub fn load_pin(store: &dyn KvStore, slug: &str) -> anyhow::Result<Option<Pin>> {
    store.get_json(&pin_key(slug))
}

pub fn get_pin_or_404(store: &dyn KvStore, slug: &str) -> Result<Pin, ApiError> {
    load_pin(store, slug)?.ok_or_else(|| ApiError::not_found("Pin"))
}

fn save_pin(store: &dyn KvStore, pin: &Pin) -> anyhow::Result<()> {
    store.set_json(&pin_key(&pin.slug), pin)
}

pub fn build_pin_json(pin: &Pin) -> serde_json::Value {
    json!({
        "slug": pin.slug,
        "title": pin.title,
        "description": pin.description,
        "image_url": pin.image_url,
        "tags": pin.tags,
        "likes_count": pin.likes.len(),
        "created_at": pin.created_at,
        "updated_at": pin.updated_at,
        "url": pin.get_absolute_url(),
    })
}

/// Split a comma separated tag field into unique slugs, keeping the given order.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(slugify) {
        if !tag.is_empty() && tag.len() <= MAX_TAG_LENGTH && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

fn add_to_tag(store: &dyn KvStore, tag: &str, pin_slug: &str) -> anyhow::Result<()> {
    let key = tag_key(tag);
    let mut slugs: Vec<String> = store.get_json(&key)?.unwrap_or_default();
    if !slugs.iter().any(|s| s == pin_slug) {
        slugs.insert(0, pin_slug.to_string());
        store.set_json(&key, &slugs)?;
    }
    Ok(())
}

fn remove_from_tag(store: &dyn KvStore, tag: &str, pin_slug: &str) -> anyhow::Result<()> {
    let key = tag_key(tag);
    let mut slugs: Vec<String> = store.get_json(&key)?.unwrap_or_default();
    slugs.retain(|s| s != pin_slug);
    if slugs.is_empty() {
        store.delete(&key)
    } else {
        store.set_json(&key, &slugs)
    }
}

pub fn create_pin(
    store: &dyn KvStore,
    owner_id: &str,
    title: &str,
    description: &str,
    image_url: &str,
    tags: Vec<String>,
) -> anyhow::Result<Pin> {
    let pin = insert_with_unique_slug(store, pin_key, |slug| Pin {
        id: Uuid::new_v4().to_string(),
        slug: slug.to_string(),
        owner_id: owner_id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        image_url: image_url.to_string(),
        tags: tags.clone(),
        likes: Vec::new(),
        created_at: now_iso(),
        updated_at: None,
    })?;

    for tag in &pin.tags {
        add_to_tag(store, tag, &pin.slug)?;
    }

    info!(pin = %pin.slug, owner = %owner_id, "Created pin");
    Ok(pin)
}

/// Remove the pin together with its tag index entries and board placements.
pub fn delete_pin(store: &dyn KvStore, pin: &Pin) -> anyhow::Result<()> {
    for tag in &pin.tags {
        remove_from_tag(store, tag, &pin.slug)?;
    }
    for mut board in all_boards(store)? {
        if board.pins.contains(&pin.slug) {
            board.pins.retain(|s| s != &pin.slug);
            save_board(store, &board)?;
        }
    }
    store.delete(&pin_key(&pin.slug))
}

/// Pins carrying `tag`, newest first.
pub fn pins_by_tag(store: &dyn KvStore, tag: &str) -> anyhow::Result<Vec<Pin>> {
    let slugs: Vec<String> = store.get_json(&tag_key(tag))?.unwrap_or_default();
    let mut pins = Vec::with_capacity(slugs.len());
    for slug in slugs {
        if let Some(pin) = load_pin(store, &slug)? {
            pins.push(pin);
        }
    }
    pins.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(pins)
}

fn validate_pin_form(form: &HashMap<String, String>) -> Result<PinForm, FormErrors> {
    let mut errors = FormErrors::new();
    let title = sanitize_text(&get_string(form, "title").unwrap_or_default());
    let description = sanitize_text(&get_string(form, "description").unwrap_or_default());
    let image_url = get_string(form, "image_url").unwrap_or_default();
    let tags = parse_tags(form.get("tags").map(String::as_str).unwrap_or_default());

    if title.is_empty() {
        errors.insert("title", "Title is required".to_string());
    } else if title.chars().count() > MAX_PIN_TITLE_LENGTH {
        errors.insert("title", "Title must be at most 200 characters".to_string());
    }
    if description.chars().count() > MAX_PIN_DESCRIPTION_LENGTH {
        errors.insert("description", "Description must be at most 5000 characters".to_string());
    }
    if image_url.is_empty() {
        errors.insert("image_url", "Image URL is required".to_string());
    } else if !is_valid_image_url(&image_url) {
        errors.insert("image_url", "Enter a valid http or https URL".to_string());
    }

    if errors.is_empty() {
        Ok(PinForm {
            title,
            description,
            image_url,
            tags,
        })
    } else {
        Err(errors)
    }
}

fn render_pin_form(cx: &mut Context, form: &HashMap<String, String>, errors: &FormErrors) -> Reply {
    cx.render(json!({
        "form": {
            "title": get_string(form, "title"),
            "description": get_string(form, "description"),
            "image_url": get_string(form, "image_url"),
            "tags": get_string(form, "tags"),
        },
        "errors": errors,
    }))
}

fn require_owner(user: &Profile, pin: &Pin) -> Result<(), ApiError> {
    if pin.owner_id == user.id {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

// === HTTP Handlers ===

pub fn handle_create_pin(cx: &mut Context, req: &Request) -> Result<Reply, ApiError> {
    let user = cx.login_required(req)?;

    match req.method() {
        Method::Get => Ok(render_pin_form(cx, &HashMap::new(), &FormErrors::new())),
        Method::Post => {
            let form = parse_form(req);
            let valid = match validate_pin_form(&form) {
                Ok(valid) => valid,
                Err(errors) => return Ok(render_pin_form(cx, &form, &errors)),
            };

            let pin = create_pin(
                cx.store,
                &user.id,
                &valid.title,
                &valid.description,
                &valid.image_url,
                valid.tags,
            )?;
            Ok(cx.redirect_with(Level::Success, "Your pin has been created", pin.get_absolute_url()))
        }
        _ => Err(ApiError::MethodNotAllowed),
    }
}

pub fn handle_pin_detail(cx: &mut Context, _req: &Request, slug: &str) -> Result<Reply, ApiError> {
    let pin = get_pin_or_404(cx.store, slug)?;
    let owner = load_user(cx.store, &pin.owner_id)?;

    let (is_liked, is_owner, boards) = match &cx.user {
        Some(user) => {
            let boards: Vec<_> = user_boards(cx.store, &user.id)?
                .iter()
                .filter(|b| b.pins.contains(&pin.slug))
                .map(build_board_json)
                .collect();
            (pin.likes.contains(&user.id), pin.owner_id == user.id, boards)
        }
        None => (false, false, Vec::new()),
    };

    Ok(cx.render(json!({
        "pin": build_pin_json(&pin),
        "owner": owner.as_ref().map(build_user_json),
        "tags": pin.tags,
        "likes_count": pin.likes.len(),
        "is_liked": is_liked,
        "is_owner": is_owner,
        "boards": boards,
    })))
}

pub fn handle_update_pin(cx: &mut Context, req: &Request, slug: &str) -> Result<Reply, ApiError> {
    let user = cx.login_required(req)?;
    let mut pin = get_pin_or_404(cx.store, slug)?;
    require_owner(&user, &pin)?;

    match req.method() {
        Method::Get => {
            let mut current = HashMap::new();
            current.insert("title".to_string(), pin.title.clone());
            current.insert("description".to_string(), pin.description.clone());
            current.insert("image_url".to_string(), pin.image_url.clone());
            current.insert("tags".to_string(), pin.tags.join(", "));
            Ok(render_pin_form(cx, &current, &FormErrors::new()))
        }
        Method::Post => {
            let form = parse_form(req);
            let valid = match validate_pin_form(&form) {
                Ok(valid) => valid,
                Err(errors) => return Ok(render_pin_form(cx, &form, &errors)),
            };

            for tag in pin.tags.iter().filter(|t| !valid.tags.contains(t)) {
                remove_from_tag(cx.store, tag, &pin.slug)?;
            }
            for tag in valid.tags.iter().filter(|t| !pin.tags.contains(t)) {
                add_to_tag(cx.store, tag, &pin.slug)?;
            }

            pin.title = valid.title;
            pin.description = valid.description;
            pin.image_url = valid.image_url;
            pin.tags = valid.tags;
            pin.updated_at = Some(now_iso());
            save_pin(cx.store, &pin)?;

            info!(pin = %pin.slug, "Updated pin");
            Ok(cx.redirect_with(Level::Success, "Your pin has been updated", pin.get_absolute_url()))
        }
        _ => Err(ApiError::MethodNotAllowed),
    }
}

pub fn handle_delete_pin(cx: &mut Context, req: &Request, slug: &str) -> Result<Reply, ApiError> {
    let user = cx.login_required(req)?;
    let pin = get_pin_or_404(cx.store, slug)?;
    require_owner(&user, &pin)?;

    match req.method() {
        Method::Get => Ok(cx.render(json!({ "pin": build_pin_json(&pin) }))),
        Method::Post => {
            delete_pin(cx.store, &pin)?;
            info!(pin = %pin.slug, owner = %user.id, "Deleted pin");
            Ok(cx.redirect_with(Level::Success, "Your pin has been deleted", user.get_absolute_url()))
        }
        _ => Err(ApiError::MethodNotAllowed),
    }
}

/// Board named by `?board=`, which must belong to `user`.
fn requested_board(cx: &Context, req: &Request, user: &Profile) -> Result<Option<Board>, ApiError> {
    let params = parse_query_params(req.uri());
    let Some(slug) = params.get("board").filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let board = load_board(cx.store, slug)?.ok_or_else(|| ApiError::not_found("Board"))?;
    if board.owner_id != user.id {
        return Err(ApiError::Forbidden);
    }
    Ok(Some(board))
}

pub fn handle_pin_image(cx: &mut Context, req: &Request, slug: &str) -> Result<Reply, ApiError> {
    let user = cx.login_required(req)?;
    let pin = get_pin_or_404(cx.store, slug)?;

    let mut board = match requested_board(cx, req, &user)? {
        Some(board) => board,
        None => match user_boards(cx.store, &user.id)?.into_iter().next() {
            Some(board) => board,
            None => create_board(cx.store, &user.id, DEFAULT_BOARD_NAME, "")?,
        },
    };

    if board.pins.contains(&pin.slug) {
        return Ok(cx.redirect_with(
            Level::Error,
            format!("This pin is already on board {}", board.name),
            pin.get_absolute_url(),
        ));
    }

    board.pins.insert(0, pin.slug.clone());
    save_board(cx.store, &board)?;
    info!(pin = %pin.slug, board = %board.slug, "Pinned to board");

    Ok(cx.redirect_with(
        Level::Success,
        format!("Pinned to {}", board.name),
        pin.get_absolute_url(),
    ))
}

pub fn handle_unpin_image(cx: &mut Context, req: &Request, slug: &str) -> Result<Reply, ApiError> {
    let user = cx.login_required(req)?;
    let pin = get_pin_or_404(cx.store, slug)?;

    let board = match requested_board(cx, req, &user)? {
        Some(board) => Some(board).filter(|b| b.pins.contains(&pin.slug)),
        None => user_boards(cx.store, &user.id)?
            .into_iter()
            .find(|b| b.pins.contains(&pin.slug)),
    };

    let Some(mut board) = board else {
        return Ok(cx.redirect_with(
            Level::Error,
            "This pin is not on any of your boards",
            pin.get_absolute_url(),
        ));
    };

    board.pins.retain(|s| s != &pin.slug);
    save_board(cx.store, &board)?;
    info!(pin = %pin.slug, board = %board.slug, "Unpinned from board");

    Ok(cx.redirect_with(
        Level::Success,
        format!("Removed from {}", board.name),
        pin.get_absolute_url(),
    ))
}

pub fn handle_like(cx: &mut Context, req: &Request, slug: &str) -> Result<Reply, ApiError> {
    let user = cx.login_required(req)?;
    let mut pin = get_pin_or_404(cx.store, slug)?;

    if pin.likes.contains(&user.id) {
        return Ok(cx.redirect_with(Level::Error, "You already like this pin", pin.get_absolute_url()));
    }

    pin.likes.push(user.id.clone());
    save_pin(cx.store, &pin)?;
    info!(pin = %pin.slug, user = %user.id, "Liked pin");
    Ok(cx.redirect_with(Level::Success, "You liked this pin", pin.get_absolute_url()))
}

pub fn handle_dislike(cx: &mut Context, req: &Request, slug: &str) -> Result<Reply, ApiError> {
    let user = cx.login_required(req)?;
    let mut pin = get_pin_or_404(cx.store, slug)?;

    if !pin.likes.contains(&user.id) {
        return Ok(cx.redirect_with(
            Level::Error,
            "You need to like this pin first",
            pin.get_absolute_url(),
        ));
    }

    pin.likes.retain(|id| id != &user.id);
    save_pin(cx.store, &pin)?;
    info!(pin = %pin.slug, user = %user.id, "Withdrew like");
    Ok(cx.redirect_with(Level::Success, "You no longer like this pin", pin.get_absolute_url()))
}

pub fn handle_pins_by_tag(cx: &mut Context, req: &Request, tag: &str) -> Result<Reply, ApiError> {
    let tag = tag.to_ascii_lowercase();
    let pins: Vec<_> = pins_by_tag(cx.store, &tag)?.iter().map(build_pin_json).collect();
    let params = parse_query_params(req.uri());
    let page = paginate(pins, params.get("page").map(String::as_str), cx.config.page_size)?;

    Ok(cx.render(json!({
        "tag": tag,
        "pins": page,
    })))
}
