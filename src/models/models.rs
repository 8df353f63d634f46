use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub password: String,
    pub bio: Option<String>,
    pub registration_date: String,
    pub is_active: bool,
}

impl Profile {
    pub fn get_absolute_url(&self) -> String {
        format!("/accounts/{}/", urlencoding::encode(&self.username))
    }
}

/// Directed follow edge, stored under its (follower, following) pair.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Relationship {
    pub follower_id: String,
    pub following_id: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Pin {
    pub id: String,
    pub slug: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub tags: Vec<String>,
    pub likes: Vec<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl Pin {
    pub fn get_absolute_url(&self) -> String {
        format!("/pins/{}/", self.slug)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Board {
    pub id: String,
    pub slug: String,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub pins: Vec<String>,
    pub created_at: String,
}

impl Board {
    pub fn get_absolute_url(&self) -> String {
        format!("/boards/{}/", self.slug)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
    Info,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FlashMessage {
    pub level: Level,
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SessionData {
    pub user_id: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub messages: Vec<FlashMessage>,
}
