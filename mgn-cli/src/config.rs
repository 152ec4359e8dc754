use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Args;
use mgn_bulk::BulkConfig;
use mgn_client::{HttpInstanceDescriber, HttpMgnClient, MgnApi, ServerInventory};
use serde::{Deserialize, Serialize};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_PROFILE: &str = "default";

fn default_region() -> String {
    std::env::var("AWS_DEFAULT_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string())
}

fn default_profile() -> String {
    std::env::var("AWS_PROFILE").unwrap_or_else(|_| DEFAULT_PROFILE.to_string())
}

/// Connection and tuning settings, from flags or a JSON file
#[derive(Debug, Clone, Serialize, Deserialize, Args, PartialEq)]
#[serde(default)]
pub struct HelperConfig {
    /// Service endpoint; defaults to the regional endpoint
    #[clap(long, global = true, env = "MGN_ENDPOINT")]
    pub endpoint: Option<String>,
    /// Compute service endpoint for test instance state lookups; defaults
    /// to the regional endpoint
    #[clap(long, global = true, env = "MGN_COMPUTE_ENDPOINT")]
    pub compute_endpoint: Option<String>,
    #[clap(long, global = true, short = 'r', env = "AWS_DEFAULT_REGION", default_value = DEFAULT_REGION)]
    pub region: String,
    /// Credential profile name, reported only
    #[clap(long, global = true, env = "AWS_PROFILE", default_value = DEFAULT_PROFILE)]
    pub profile: String,
    #[clap(long, global = true, default_value = "10")]
    pub max_concurrent: usize,
    #[clap(long, global = true, default_value = "50")]
    pub rate_limit_calls: usize,
    #[clap(long, global = true, default_value = "60")]
    pub rate_limit_window_secs: u64,
    #[clap(long, global = true, default_value = "100")]
    pub page_size: usize,
    #[clap(long, global = true, default_value = "30")]
    pub request_timeout_secs: u64,
}

impl Default for HelperConfig {
    fn default() -> Self {
        let bulk = BulkConfig::default();
        Self {
            endpoint: None,
            compute_endpoint: None,
            region: default_region(),
            profile: default_profile(),
            max_concurrent: bulk.max_concurrent,
            rate_limit_calls: bulk.rate_limit_calls,
            rate_limit_window_secs: bulk.rate_limit_window.as_secs(),
            page_size: 100,
            request_timeout_secs: 30,
        }
    }
}

impl HelperConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        log::info!("Reading config from {}", path.as_ref().display());
        let config: HelperConfig = serde_json::from_slice(&std::fs::read(path.as_ref())?)?;
        if config.region.trim().is_empty() {
            return Err(anyhow!("Config file must not set an empty region"));
        }
        Ok(config)
    }

    pub fn endpoint_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://mgn.{}.amazonaws.com", self.region))
    }

    pub fn compute_endpoint_url(&self) -> String {
        self.compute_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://ec2.{}.amazonaws.com", self.region))
    }

    pub fn bulk_config(&self) -> BulkConfig {
        BulkConfig::new(
            self.max_concurrent,
            self.rate_limit_calls,
            Duration::from_secs(self.rate_limit_window_secs),
        )
    }

    pub fn client(&self) -> Arc<dyn MgnApi> {
        Arc::new(
            HttpMgnClient::with_timeout(self.endpoint_url(), Duration::from_secs(self.request_timeout_secs))
                .with_page_size(self.page_size),
        )
    }

    /// Inventory over `api` that also looks up test instance states the
    /// listing left out
    pub fn inventory(&self, api: Arc<dyn MgnApi>) -> ServerInventory {
        let describer = HttpInstanceDescriber::with_timeout(
            self.compute_endpoint_url(),
            Duration::from_secs(self.request_timeout_secs),
        );
        ServerInventory::new(api, self.region.clone()).with_instance_describer(Arc::new(describer))
    }
}
