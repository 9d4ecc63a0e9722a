use std::path::Path;
use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// TLS settings for talking to the Consul agent
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM encoded CA bundle used to verify the agent certificate
    pub ca_file: Option<String>,

    /// Client certificate in PEM format for mTLS
    pub cert_file: Option<String>,

    /// Client private key in PEM format for mTLS
    pub key_file: Option<String>,

    /// Disables certificate verification
    /// Default: false
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cert_file.is_some() != self.key_file.is_some() {
            return Err(Error::Config(ConfigError::Message(
                "tls_config: cert_file and key_file must be set together".to_string(),
            )));
        }
        Ok(())
    }
}

/// Resolves `path` against `base_dir` unless it is already absolute
pub(crate) fn resolve_path(
    base_dir: &Path,
    path: &str,
) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}
