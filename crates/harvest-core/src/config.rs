//! Run configuration.
//!
//! Loaded from `harvest.toml` in the data directory. Every section and
//! field is optional; missing values fall back to the defaults below.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HarvestError, Result};
use crate::paging::Direction;

/// Hard per-request cap on the message listing.
pub const MESSAGE_PAGE_CAP: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub api: ApiConfig,
    pub retry: RetryConfig,
    pub collect: CollectConfig,
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API token.
    pub token_env: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.mts-link.ru/v3".to_string(),
            token_env: "HARVEST_API_TOKEN".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub retry_rate_limited: bool,
    pub max_retry_after_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            retry_rate_limited: true,
            max_retry_after_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// Members processed between checkpoint writes.
    pub checkpoint_every: usize,
    pub member_page_size: usize,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            checkpoint_every: 10,
            member_page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub page_size: usize,
    pub direction: Direction,
    /// Chats archived in parallel by `archive-all`.
    pub concurrency: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            page_size: MESSAGE_PAGE_CAP,
            direction: Direction::Before,
            concurrency: 4,
        }
    }
}

impl ArchiveConfig {
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, MESSAGE_PAGE_CAP)
    }
}

impl HarvestConfig {
    /// Load configuration from a TOML file, or defaults if it doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| HarvestError::io(path, e))?;

        let config: Self = toml::from_str(&contents)
            .map_err(|e| HarvestError::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.collect.checkpoint_every == 0 {
            return Err(HarvestError::Config("collect.checkpoint_every must be at least 1".into()));
        }
        if self.collect.member_page_size == 0 {
            return Err(HarvestError::Config("collect.member_page_size must be at least 1".into()));
        }
        if self.archive.concurrency == 0 {
            return Err(HarvestError::Config("archive.concurrency must be at least 1".into()));
        }
        Ok(())
    }
}
