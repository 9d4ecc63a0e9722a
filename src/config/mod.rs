//! Configuration management module for Consul service discovery.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`CONSUL_SD__` prefix)
//! - Component-wise validation
mod blocking;
mod retry;
mod sd_config;
mod tls;
pub use blocking::*;
pub use retry::*;
pub use sd_config::*;
pub use tls::*;


use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

pub(crate) const ENV_PREFIX: &str = "CONSUL_SD";

/// Process-wide discovery settings
///
/// Sources merged in order (later wins):
/// 1. Default values from code
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables, e.g. `CONSUL_SD__BLOCKING__WAIT_TIME_IN_MS=30000`
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DiscoverySettings {
    /// Long-poll timing shared by every watcher
    #[serde(default)]
    pub blocking: BlockingConfig,

    /// Backoff applied by watchers after a failed poll
    #[serde(default)]
    pub retry: BackoffPolicy,

    /// `consul_sd_configs` entries to watch when running the binary
    #[serde(default)]
    pub sd_configs: Vec<SdConfig>,
}

impl DiscoverySettings {
    /// Loads settings from defaults, `CONFIG_PATH` and the environment.
    ///
    /// Does not validate; call [`DiscoverySettings::validate`] once all
    /// overrides are applied.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Self = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Applies overrides from `path`; environment variables still win.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.blocking.validate()?;
        self.retry.validate()?;
        for sdc in &self.sd_configs {
            sdc.validate()?;
        }
        Ok(self)
    }
}
