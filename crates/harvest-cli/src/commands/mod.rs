pub mod archive;
pub mod checkpoint;
pub mod collect;
pub mod endpoints;
pub mod enrich;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use harvest_core::{EndpointRegistry, HarvestConfig, HttpTransport, OutputRoot, RetryExecutor, RetryPolicy};

use crate::paths;

/// Everything a command needs, built once from the data directory.
pub struct Context {
    pub config: HarvestConfig,
    pub output: OutputRoot,
    pub registry: EndpointRegistry,
}

impl Context {
    pub fn load(data_dir: PathBuf) -> Result<Self> {
        let config = HarvestConfig::load(&paths::config_path(&data_dir))?;
        Ok(Self {
            config,
            output: OutputRoot::new(data_dir),
            registry: EndpointRegistry::builtin(),
        })
    }

    /// Build the authenticated executor. Only commands that talk to the API
    /// call this, so offline commands work without a token.
    pub fn executor(&self) -> Result<RetryExecutor> {
        let api = &self.config.api;
        let token = std::env::var(&api.token_env)
            .with_context(|| format!("{} is not set; export your API token first", api.token_env))?;
        let transport = HttpTransport::new(&api.base_url, token, api.timeout())?;
        let policy = RetryPolicy::from_config(&self.config.retry, api.timeout());
        Ok(RetryExecutor::new(Arc::new(transport), policy))
    }
}
