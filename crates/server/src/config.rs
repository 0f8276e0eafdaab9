//! Unified server configuration
//!
//! Handles loading of all environment variables the binary needs.

use anyhow::{Context, Result};
use std::env;

/// Everything the unified server reads from the environment
#[derive(Debug, Clone)]
pub struct UnifiedConfig {
    /// Notion integration token
    pub notion_token: String,
    /// CalDAV principal (e.g. the Apple ID)
    pub caldav_username: String,
    /// CalDAV app-specific password
    pub caldav_password: String,
    /// Admin surface credential
    pub admin_token: String,
    /// Optional webhook verification token seed
    pub webhook_token_seed: Option<String>,
    /// Path of the JSON state file
    pub state_path: String,
    pub host: String,
    pub port: u16,
}

impl UnifiedConfig {
    /// Load configuration from environment variables
    ///
    /// This will also initialize dotenv if it hasn't been done yet.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            notion_token: env::var("NOTION_TOKEN").context("NOTION_TOKEN must be set")?,
            caldav_username: env::var("CALDAV_USERNAME")
                .context("CALDAV_USERNAME must be set")?,
            caldav_password: env::var("CALDAV_PASSWORD")
                .context("CALDAV_PASSWORD must be set")?,
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_default(),
            webhook_token_seed: env::var("WEBHOOK_VERIFICATION_TOKEN").ok(),
            state_path: env::var("STATE_PATH").unwrap_or_else(|_| "data/state.json".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid integer")?,
        })
    }
}
