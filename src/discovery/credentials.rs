use std::env;
use std::path::PathBuf;

use tracing::debug;

use crate::constants::CONSUL_HTTP_TOKEN_ENV;
use crate::constants::CONSUL_HTTP_TOKEN_FILE_ENV;
use crate::Result;
use crate::SdConfig;
use crate::SdConfigError;

/// Authentication presented to the Consul agent.
///
/// Basic auth and bearer tokens are mutually exclusive on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthConfig {
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

impl AuthConfig {
    /// Resolves auth for `sdc`.
    ///
    /// The token is resolved first even when basic auth wins, so a broken
    /// `CONSUL_HTTP_TOKEN_FILE` is always reported.
    pub fn resolve(sdc: &SdConfig) -> Result<Self> {
        let token = resolve_token(sdc.token.as_deref())?;

        if !sdc.username.is_empty() {
            return Ok(AuthConfig::Basic {
                username: sdc.username.clone(),
                password: sdc.password.clone(),
            });
        }
        if token.is_empty() {
            return Ok(AuthConfig::None);
        }
        Ok(AuthConfig::Bearer(token))
    }
}

/// Returns the ACL token to use.
///
/// Precedence: explicit token (an empty string included), then the file
/// named by `CONSUL_HTTP_TOKEN_FILE`, then `CONSUL_HTTP_TOKEN`. An empty
/// token is valid when ACLs are disabled on the agent.
pub fn resolve_token(explicit: Option<&str>) -> Result<String> {
    if let Some(token) = explicit {
        return Ok(token.to_string());
    }

    if let Some(token_file) = env::var_os(CONSUL_HTTP_TOKEN_FILE_ENV).filter(|v| !v.is_empty()) {
        let path = PathBuf::from(token_file);
        debug!(path = ?path, "reading consul token from file");
        return std::fs::read_to_string(&path)
            .map_err(|source| SdConfigError::TokenFile { path, source }.into());
    }

    Ok(env::var(CONSUL_HTTP_TOKEN_ENV).unwrap_or_default())
}
