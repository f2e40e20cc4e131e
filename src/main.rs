use std::sync::Arc;

use anyhow::Context;
use jo::{auth, config::Config, db, search::YouTubeSearch, sync::{Hub, RoomStore}, AppState};
use tower_http::trace::TraceLayer;
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,jo=debug")))
        .init();

    let config = Config::from_env()?;

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(config.public_url.starts_with("https://"))
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(config.session_minutes)));

    let db_pool = db::connect(&config.database_url)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;
    db::migrate(&db_pool).await?;

    let clients = match std::fs::read_to_string(&config.client_secret_path) {
        Ok(json) => auth::Clients::from_json(serde_json::from_str(&json)?, &config.public_url)
            .map_err(|e| e.0)
            .with_context(|| format!("reading {}", config.client_secret_path))?,
        Err(e) => {
            tracing::warn!(path = %config.client_secret_path, error = %e, "no OAuth keys, sign-in disabled");
            auth::Clients::default()
        }
    };
    if config.youtube_api_key.is_none() {
        tracing::warn!("YOUTUBE_API_KEY not set, search will fail");
    }

    let store = RoomStore::new(db_pool, Arc::new(Hub::new()), config.default_video_id.clone());
    let search = YouTubeSearch::new(config.youtube_api_key.clone(), config.search_max_results);
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState::new(store, search, clients, config);

    let app = jo::router(app_state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
