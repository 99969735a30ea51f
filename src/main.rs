mod auth;
mod cache;
mod config;
mod db;
mod entities;
mod error;
mod images;
mod models;
mod ratings;
mod routes;
mod throttle;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use sea_orm::DatabaseConnection;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth::TokenStore, cache::ListCache, config::Config, images::ImageHost,
    throttle::ClientThrottle,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: DatabaseConnection,
    pub cache: ListCache,
    pub throttle: Arc<ClientThrottle>,
    pub tokens: Arc<TokenStore>,
    pub images: Arc<ImageHost>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,marquee=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    let http = reqwest::Client::builder()
        .user_agent("marquee/0.1")
        .timeout(Duration::from_secs(30))
        .build()?;

    let db = db::connect_and_migrate(&config.database_url).await?;

    if config.image_host_base_url.trim().is_empty() {
        tracing::warn!("IMAGE_HOST_BASE_URL is not set, poster and cover uploads will fail");
    }

    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        cache: ListCache::new(),
        throttle: Arc::new(ClientThrottle::new(config.throttle_per_minute)),
        tokens: Arc::new(TokenStore::new(
            config.access_token_ttl_seconds,
            config.refresh_token_ttl_seconds,
        )),
        images: Arc::new(ImageHost::new(
            http,
            config.image_host_base_url.clone(),
            config.image_upload_preset.clone(),
            config.image_folder.clone(),
        )),
    });

    let app = routes::app(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
