//! Configuration for the scheduler
//!
//! Loads configuration from environment variables

use anyhow::{Context, Result};
use std::env;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// How often to check whether a full sync is due, in seconds
    pub poll_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            poll_interval_secs: env::var("WORKER_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("WORKER_POLL_INTERVAL_SECS must be a valid integer")?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self { poll_interval_secs: 60 }
    }
}
