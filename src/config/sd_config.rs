use std::collections::BTreeMap;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::TlsConfig;
use crate::Error;
use crate::Result;

/// A single `consul_sd_config` entry.
///
/// Used by value as the deduplication key: two jobs whose entries compare
/// equal share one [`crate::ApiConfig`] and one watcher.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct SdConfig {
    /// Agent address, `host:port` or a full URL. Default: `localhost:8500`
    pub server: String,

    /// Scheme used when `server` carries none. Default: `http`
    pub scheme: String,

    /// Datacenter to query; detected via `/v1/agent/self` when empty
    pub datacenter: String,

    /// ACL token. `Some("")` explicitly disables token auth, `None` falls
    /// back to `CONSUL_HTTP_TOKEN_FILE` / `CONSUL_HTTP_TOKEN`.
    pub token: Option<String>,

    /// Basic auth user; takes precedence over any token
    pub username: String,
    pub password: String,

    pub tls_config: TlsConfig,

    /// HTTP proxy in front of the agent
    pub proxy_url: Option<String>,
    pub proxy_client_config: ProxyClientConfig,

    /// Services to watch; empty means all services
    pub services: Vec<String>,

    /// Only services carrying all of these tags are watched
    pub tags: Vec<String>,

    /// Node metadata filter, sent as `node-meta=key:value`
    pub node_meta: BTreeMap<String, String>,

    /// Separator used to join service tags. Default: `,`
    pub tag_separator: Option<String>,

    /// Allow any agent to answer, not just the leader
    pub allow_stale: bool,
}

impl SdConfig {
    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() && !self.password.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "consul_sd_config: password is set but username is empty".to_string(),
            )));
        }
        self.tls_config.validate()?;
        self.proxy_client_config.validate()
    }
}

/// Credentials presented to the proxy configured by `proxy_url`
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct ProxyClientConfig {
    pub basic_auth: Option<BasicAuthConfig>,
    pub bearer_token: Option<String>,
    /// Read on every config build, relative to the base dir
    pub bearer_token_file: Option<String>,
}

impl ProxyClientConfig {
    pub fn validate(&self) -> Result<()> {
        let bearer = self.bearer_token.is_some() || self.bearer_token_file.is_some();
        if self.basic_auth.is_some() && bearer {
            return Err(Error::Config(ConfigError::Message(
                "proxy_client_config: basic_auth and bearer_token are mutually exclusive".to_string(),
            )));
        }
        if let Some(ba) = &self.basic_auth {
            if ba.password.is_some() && ba.password_file.is_some() {
                return Err(Error::Config(ConfigError::Message(
                    "proxy_client_config: basic_auth password and password_file are mutually exclusive"
                        .to_string(),
                )));
            }
        }
        if self.bearer_token.is_some() && self.bearer_token_file.is_some() {
            return Err(Error::Config(ConfigError::Message(
                "proxy_client_config: bearer_token and bearer_token_file are mutually exclusive"
                    .to_string(),
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: Option<String>,
    pub password_file: Option<String>,
}
