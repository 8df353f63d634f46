pub mod auth;
pub mod boards;
pub mod config;
pub mod core;
pub mod follow;
pub mod models;
pub mod pins;
pub mod router;
pub mod static_server;
pub mod templates;
pub mod users;

#[cfg(not(target_arch = "wasm32"))]
pub mod server;

// === Component entrypoint ===
#[cfg(target_arch = "wasm32")]
#[spin_sdk::http_component]
fn handle(req: spin_sdk::http::Request) -> anyhow::Result<impl spin_sdk::http::IntoResponse> {
    let store = spin_sdk::key_value::Store::open_default()
        .map_err(|e| anyhow::anyhow!("KV store must exist: {:?}", e))?;
    let config = crate::config::Config::load();

    if config.seed_demo_data {
        if let Err(err) = crate::core::db::init_test_data(&store) {
            tracing::warn!("Failed to seed demo data: {:#}", err);
        }
    }

    Ok(crate::router::route(&store, &config, &req))
}
