use std::net::SocketAddr;

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub cache_ttl_seconds: i64,
    pub throttle_per_minute: u32,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub image_host_base_url: String,
    pub image_upload_preset: String,
    pub image_folder: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().context("PORT")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://marquee.db?mode=rwc".to_string());

        let cache_ttl_seconds: i64 =
            std::env::var("CACHE_TTL_SECONDS").ok().and_then(|s| s.parse().ok()).unwrap_or(60);

        let throttle_per_minute: u32 =
            std::env::var("THROTTLE_PER_MINUTE").ok().and_then(|s| s.parse().ok()).unwrap_or(30);

        let access_token_ttl_seconds: i64 = std::env::var("ACCESS_TOKEN_TTL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3_600);

        let refresh_token_ttl_seconds: i64 = std::env::var("REFRESH_TOKEN_TTL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(7 * 86_400);

        let image_host_base_url =
            std::env::var("IMAGE_HOST_BASE_URL").unwrap_or_else(|_| "".to_string());
        let image_upload_preset =
            std::env::var("IMAGE_UPLOAD_PRESET").unwrap_or_else(|_| "".to_string());
        let image_folder =
            std::env::var("IMAGE_FOLDER").unwrap_or_else(|_| "categories".to_string());

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            cache_ttl_seconds,
            throttle_per_minute,
            access_token_ttl_seconds,
            refresh_token_ttl_seconds,
            image_host_base_url,
            image_upload_preset,
            image_folder,
        })
    }
}
