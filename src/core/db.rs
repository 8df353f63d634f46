use tracing::info;

use crate::boards::{create_board, save_board};
use crate::config::{user_key, DEFAULT_BOARD_NAME};
use crate::core::store::{KvStore, StoreExt};
use crate::follow::follow_user;
use crate::models::models::Profile;
use crate::pins::{create_pin, parse_tags};
use crate::users::{create_profile, find_by_username};

struct DemoPin {
    title: &'static str,
    description: &'static str,
    image_url: &'static str,
    tags: &'static str,
}

struct DemoUser {
    username: &'static str,
    bio: &'static str,
    pins: &'static [DemoPin],
}

const DEMO_USERS: &[DemoUser] = &[
    DemoUser {
        username: "test",
        bio: "Test user bio",
        pins: &[DemoPin {
            title: "My first pin",
            description: "This is my first pin on Pinboard!",
            image_url: "https://images.example.com/first-pin.jpg",
            tags: "hello, first",
        }],
    },
    DemoUser {
        username: "alice",
        bio: "Hello, I'm Alice!",
        pins: &[
            DemoPin {
                title: "Reading nook",
                description: "A window seat with too many cushions.",
                image_url: "https://images.example.com/reading-nook.jpg",
                tags: "interior, cozy",
            },
            DemoPin {
                title: "Sourdough, attempt 12",
                description: "Finally got the ear right.",
                image_url: "https://images.example.com/sourdough.jpg",
                tags: "baking, bread",
            },
        ],
    },
    DemoUser {
        username: "bob",
        bio: "Bob's corner of the internet",
        pins: &[DemoPin {
            title: "Street art in Lisbon",
            description: "Found on a walk through Alfama.",
            image_url: "https://images.example.com/lisbon-mural.jpg",
            tags: "street art, travel",
        }],
    },
];

fn ensure_demo_user(store: &dyn KvStore, demo: &DemoUser) -> anyhow::Result<Profile> {
    if let Some(existing) = find_by_username(store, demo.username)? {
        return Ok(existing);
    }

    // Passwords match the usernames.
    let mut user = create_profile(store, demo.username, demo.username)?
        .ok_or_else(|| anyhow::anyhow!("username {} taken while seeding", demo.username))?;
    user.bio = Some(demo.bio.to_string());
    store.set_json(&user_key(&user.id), &user)?;

    let mut board = create_board(store, &user.id, DEFAULT_BOARD_NAME, "")?;
    for pin in demo.pins {
        let created = create_pin(
            store,
            &user.id,
            pin.title,
            pin.description,
            pin.image_url,
            parse_tags(pin.tags),
        )?;
        board.pins.insert(0, created.slug);
    }
    save_board(store, &board)?;

    Ok(user)
}

/// Seed the demo accounts, their pins and `test -> bob`. Safe to run repeatedly.
pub fn init_test_data(store: &dyn KvStore) -> anyhow::Result<()> {
    let mut seeded = Vec::with_capacity(DEMO_USERS.len());
    for demo in DEMO_USERS {
        seeded.push(ensure_demo_user(store, demo)?);
    }

    let test = seeded.iter().find(|u| u.username == "test");
    let bob = seeded.iter().find(|u| u.username == "bob");
    if let (Some(test), Some(bob)) = (test, bob) {
        follow_user(store, &test.id, &bob.id)?;
    }

    info!(users = seeded.len(), "Demo data ready");
    Ok(())
}

/// Delete every key in the store.
pub fn reset_db_data(store: &dyn KvStore) -> anyhow::Result<()> {
    for key in store.keys()? {
        store.delete(&key)?;
    }
    Ok(())
}
