use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub template_server_url: String,
    pub render_server_url: String,
    pub workspace_dir: String,
    pub max_preview_age_secs: i64,
    pub render_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            template_server_url: env::var("TEMPLATE_SERVER_URL")
                .context("TEMPLATE_SERVER_URL must be set")?,
            render_server_url: env::var("RENDER_SERVER_URL")
                .context("RENDER_SERVER_URL must be set")?,
            workspace_dir: env::var("WORKSPACE_DIR")
                .unwrap_or_else(|_| "./preview-workspace".to_string()),
            max_preview_age_secs: env::var("MAX_PREVIEW_AGE_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .context("MAX_PREVIEW_AGE_SECS must be a valid number")?,
            render_timeout_secs: env::var("RENDER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .context("RENDER_TIMEOUT_SECS must be a valid number")?,
        })
    }
}
