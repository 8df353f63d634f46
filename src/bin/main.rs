#[cfg(not(target_arch = "wasm32"))]
mod native {
    use pinboard::config::Config;
    use pinboard::core::db::init_test_data;
    use pinboard::core::store::MemoryStore;
    use pinboard::server::{self, AppState};
    use tracing::{info, warn};
    use tracing_subscriber::{fmt, EnvFilter};

    pub async fn run() -> std::io::Result<()> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt().with_env_filter(filter).init();

        info!("Loading configuration...");
        let config = Config::load();
        let store = MemoryStore::new();

        if config.seed_demo_data {
            if let Err(err) = init_test_data(&store) {
                warn!("Failed to seed demo data: {:#}", err);
            }
        }

        let (server, _) = server::build(AppState { store, config })?;
        server.await?;

        info!("Server shut down");
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
