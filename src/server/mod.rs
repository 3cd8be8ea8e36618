//! chatline gateway: HTTP API and live channel over axum.
//!
//! Wires the SQLite-backed identity and message store, the presence
//! registry, and the delivery pipeline into one [`AppState`], then serves
//! the router built in [`router`].

pub mod auth;
pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod utils;

use std::sync::Arc;

use axum::Router;

use crate::assets::{AssetStore, FsAssetStore};
use crate::delivery::DeliveryPipeline;
use crate::identity::SqliteIdentity;
use crate::presence::PresenceRegistry;
use crate::storage::{db_path, Db, Storage};
use crate::store::SqliteMessageStore;

use config::{Config, MAX_ASSET_SIZE};
use state::AppState;

/// Assemble the shared state over an already-open database.
pub fn build_state(db: Db, config: &Config) -> AppState {
    let identity = Arc::new(SqliteIdentity::new(db.clone()));
    let store = Arc::new(SqliteMessageStore::new(db));
    let presence = Arc::new(PresenceRegistry::new());
    let pipeline = Arc::new(DeliveryPipeline::new(store, presence, config.store_timeout));

    let assets = config.asset_dir.as_ref().map(|dir| {
        Arc::new(FsAssetStore::new(
            dir.clone(),
            config.asset_base_url.clone(),
            MAX_ASSET_SIZE,
        )) as Arc<dyn AssetStore>
    });

    AppState {
        auth: identity.clone(),
        users: identity,
        pipeline,
        assets,
    }
}

/// The complete router, ready to serve.
pub fn app(state: AppState) -> Router {
    router::build_router(state)
}

/// Open the database under the configured data directory.
pub fn open_db(config: &Config) -> std::io::Result<Db> {
    let path = db_path(&config.data_dir);
    let storage = Storage::open(&path).map_err(std::io::Error::other)?;
    tracing::info!("  database: {}", path.display());
    Ok(Db::new(storage))
}

/// Run the server until interrupted.
pub async fn serve(config: Config) -> std::io::Result<()> {
    tracing::info!("chatline starting");
    tracing::info!("  data directory: {}", config.data_dir.display());

    let db = open_db(&config)?;
    match &config.asset_dir {
        Some(dir) => tracing::info!("  assets: {} ({})", dir.display(), config.asset_base_url),
        None => tracing::info!("  assets: none configured (raw references are stored)"),
    }
    tracing::info!("  store timeout: {:?}", config.store_timeout);

    let app = app(build_state(db, &config));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("chatline listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
            }
        })
        .await
}
