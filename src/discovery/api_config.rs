//! Construction of the shared runtime object for one `consul_sd_config`.
//!
//! ## Build steps
//! 1. Validate the descriptor and resolve credentials; a broken token file
//!    fails fast.
//! 2. Normalize the server address.
//! 3. Load TLS material and proxy credentials.
//! 4. Create the HTTP client.
//! 5. Resolve the datacenter, querying `/v1/agent/self` when not configured.
//! 6. Start the [`ConsulWatcher`].
//!
//! The watcher is started last, so a failure at any step leaves nothing
//! running.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::parse_agent;
use super::AuthConfig;
use super::ConsulWatcher;
use super::DiscoveryClient;
use super::HttpDiscoveryClient;
use super::ProxyAuth;
use super::ProxySettings;
use super::ServiceNode;
use super::Stoppable;
use super::TlsMaterial;
use crate::constants::AGENT_SELF_PATH;
use crate::constants::DEFAULT_SCHEME;
use crate::constants::DEFAULT_SERVER;
use crate::constants::DEFAULT_TAG_SEPARATOR;
use crate::resolve_path;
use crate::DiscoveryError;
use crate::DiscoverySettings;
use crate::Result;
use crate::SdConfig;
use crate::SdConfigError;
use crate::TlsConfig;

pub struct ApiConfig {
    tag_separator: String,
    datacenter: String,
    watcher: ConsulWatcher,
}

impl ApiConfig {
    /// Builds the runtime config for `sdc`; relative file paths are
    /// resolved against `base_dir`.
    pub async fn build(
        sdc: &SdConfig,
        base_dir: &Path,
        settings: &DiscoverySettings,
    ) -> Result<Self> {
        sdc.validate()?;
        let auth = AuthConfig::resolve(sdc)?;
        let api_server = normalize_server(&sdc.server, &sdc.scheme);
        let tls = load_tls_material(base_dir, &sdc.tls_config)?;
        let proxy = resolve_proxy(base_dir, sdc)?;

        let client = HttpDiscoveryClient::new(api_server, auth, tls, proxy, &settings.blocking)?;
        Self::with_client(sdc, Arc::new(client), settings).await
    }

    /// Resolves the datacenter and starts the watcher on top of `client`
    pub async fn with_client(
        sdc: &SdConfig,
        client: Arc<dyn DiscoveryClient>,
        settings: &DiscoverySettings,
    ) -> Result<Self> {
        let datacenter = resolve_datacenter(client.as_ref(), &sdc.datacenter).await?;
        let tag_separator = sdc
            .tag_separator
            .clone()
            .unwrap_or_else(|| DEFAULT_TAG_SEPARATOR.to_string());

        let watcher = ConsulWatcher::start(client, sdc, &datacenter, settings);
        Ok(Self {
            tag_separator,
            datacenter,
            watcher,
        })
    }

    pub fn tag_separator(&self) -> &str {
        &self.tag_separator
    }

    pub fn datacenter(&self) -> &str {
        &self.datacenter
    }

    pub fn watcher(&self) -> &ConsulWatcher {
        &self.watcher
    }

    pub fn service_nodes(&self) -> HashMap<String, Vec<ServiceNode>> {
        self.watcher.service_nodes_snapshot()
    }
}

impl Stoppable for ApiConfig {
    fn stop(&self) {
        self.watcher.stop();
    }
}

/// `localhost:8500` → `http://localhost:8500`; addresses that already
/// carry a scheme are kept as is.
pub fn normalize_server(
    server: &str,
    scheme: &str,
) -> String {
    let server = if server.is_empty() { DEFAULT_SERVER } else { server };
    if server.contains("://") {
        return server.to_string();
    }
    let scheme = if scheme.is_empty() { DEFAULT_SCHEME } else { scheme };
    format!("{scheme}://{server}")
}

/// Returns `explicit` when set, otherwise asks the agent once
pub async fn resolve_datacenter(
    client: &dyn DiscoveryClient,
    explicit: &str,
) -> Result<String> {
    if !explicit.is_empty() {
        return Ok(explicit.to_string());
    }

    let data = client
        .get_api_response(AGENT_SELF_PATH)
        .await
        .map_err(|e| DiscoveryError::DatacenterQuery { source: Box::new(e) })?;
    let agent = parse_agent(&data)?;
    debug!(datacenter = %agent.config.datacenter, "detected datacenter from agent");
    Ok(agent.config.datacenter)
}

fn load_tls_material(
    base_dir: &Path,
    tls: &TlsConfig,
) -> Result<TlsMaterial> {
    let read = |file: &str| {
        let path = resolve_path(base_dir, file);
        std::fs::read(&path).map_err(|source| SdConfigError::TlsFile { path, source })
    };

    let ca_pem = tls.ca_file.as_deref().map(read).transpose()?;
    let identity_pem = match (&tls.cert_file, &tls.key_file) {
        (Some(cert), Some(key)) => {
            let mut pem = read(cert)?;
            pem.push(b'\n');
            pem.extend(read(key)?);
            Some(pem)
        }
        _ => None,
    };

    Ok(TlsMaterial {
        ca_pem,
        identity_pem,
        insecure_skip_verify: tls.insecure_skip_verify,
    })
}

fn resolve_proxy(
    base_dir: &Path,
    sdc: &SdConfig,
) -> Result<Option<ProxySettings>> {
    let Some(url) = sdc.proxy_url.as_ref().filter(|u| !u.is_empty()) else {
        return Ok(None);
    };

    let read_secret = |file: &str| {
        let path = resolve_path(base_dir, file);
        std::fs::read_to_string(&path)
            .map(|s| s.trim_end().to_string())
            .map_err(|e| SdConfigError::ProxyAuth(format!("cannot read {path:?}: {e}")))
    };

    let pcc = &sdc.proxy_client_config;
    let auth = if let Some(ba) = &pcc.basic_auth {
        let password = match (&ba.password, &ba.password_file) {
            (_, Some(file)) => read_secret(file)?,
            (Some(p), None) => p.clone(),
            (None, None) => String::new(),
        };
        ProxyAuth::Basic {
            username: ba.username.clone(),
            password,
        }
    } else if let Some(token) = &pcc.bearer_token {
        ProxyAuth::Bearer(token.clone())
    } else if let Some(file) = &pcc.bearer_token_file {
        ProxyAuth::Bearer(read_secret(file)?)
    } else {
        ProxyAuth::None
    };

    Ok(Some(ProxySettings {
        url: url.clone(),
        auth,
    }))
}
