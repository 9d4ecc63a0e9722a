//! Consul service discovery.
//!
//! [`ConsulDiscovery`] owns one [`ConfigMap`] keyed by [`SdConfig`], so every
//! structurally distinct config gets exactly one [`ApiConfig`] and one
//! [`ConsulWatcher`], no matter how many scrape jobs reference it.
mod agent;
mod api_config;
mod blocking;
mod client;
mod config_map;
mod credentials;
mod service_node;
mod wait_time;
mod watcher;

pub use agent::*;
pub use api_config::*;
pub use blocking::*;
pub use client::*;
pub use config_map::*;
pub use credentials::*;
pub use service_node::*;
pub use wait_time::*;
pub use watcher::*;

#[cfg(test)]
mod api_config_test;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::DiscoverySettings;
use crate::Result;
use crate::SdConfig;

/// Lifecycle-managed registry of shared Consul configs.
///
/// Jobs acquire an [`ApiConfig`] with [`ConsulDiscovery::api_config`] and
/// hand it back with [`ConsulDiscovery::release`]; the watcher stops when
/// the last job releases it.
pub struct ConsulDiscovery {
    settings: DiscoverySettings,
    base_dir: PathBuf,
    configs: ConfigMap<SdConfig, ApiConfig>,
}

impl ConsulDiscovery {
    pub fn new(
        settings: DiscoverySettings,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            settings,
            base_dir: base_dir.into(),
            configs: ConfigMap::new(),
        }
    }

    /// Acquires the shared config for `sdc`, building it on first use
    pub async fn api_config(
        &self,
        sdc: &SdConfig,
    ) -> Result<Arc<ApiConfig>> {
        self.configs
            .get(sdc, || ApiConfig::build(sdc, &self.base_dir, &self.settings))
            .await
    }

    /// Releases one reference; returns `true` if the watcher was stopped
    pub fn release(
        &self,
        sdc: &SdConfig,
    ) -> bool {
        self.configs.release(sdc)
    }

    /// Latest service nodes for an acquired config, `None` if not live
    pub fn service_nodes(
        &self,
        sdc: &SdConfig,
    ) -> Option<HashMap<String, Vec<ServiceNode>>> {
        self.configs.peek(sdc).map(|cfg| cfg.service_nodes())
    }

    /// Number of live watchers
    pub fn active_configs(&self) -> usize {
        self.configs.len()
    }

    pub fn stop_all(&self) {
        info!(active = self.configs.len(), "stopping all Consul watchers");
        self.configs.stop_all();
    }
}
