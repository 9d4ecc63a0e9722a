//! Consul Service Discovery Error Hierarchy
//!
//! Errors are split by how the caller is expected to react:
//! configuration errors abort `build` for a job, network errors are transient
//! and the watcher keeps polling, discovery errors cover malformed registry
//! documents and failed datacenter detection.

use std::path::PathBuf;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Process settings loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid `consul_sd_config` entries; fatal to the job, never retried
    #[error(transparent)]
    SdConfig(#[from] SdConfigError),

    /// Transport level failures talking to the Consul agent
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Registry responses that could not be interpreted
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SdConfigError {
    /// `CONSUL_HTTP_TOKEN_FILE` points to a file that cannot be read
    #[error(
        "cannot read consul token file {path:?}; probably, `token` arg is missing in `consul_sd_config`?"
    )]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Credentials for the proxy could not be resolved
    #[error("cannot parse proxy auth config: {0}")]
    ProxyAuth(String),

    /// Proxy url rejected by the HTTP client
    #[error("invalid proxy_url {url:?}: {reason}")]
    InvalidProxyUrl { url: String, reason: String },

    /// TLS material (CA, certificate, key) could not be loaded
    #[error("cannot load tls file {path:?}")]
    TlsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TLS material was read but rejected by the HTTP client
    #[error("invalid tls config: {0}")]
    InvalidTls(String),

    /// HTTP client construction failures
    #[error("cannot create HTTP client for {api_server:?}: {reason}")]
    ClientBuild { api_server: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Request could not be sent or the response body could not be read
    #[error("cannot fetch {url:?}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Registry answered with a non-2xx status code
    #[error("unexpected status code returned from {url:?}: {status}; response body: {body:?}")]
    UnexpectedStatus { url: String, status: u16, body: String },

    /// Long-poll request failure, wrapped with the attempted path
    #[error("cannot perform blocking Consul API request at {path:?}")]
    BlockingQuery {
        path: String,
        #[source]
        source: Box<Error>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// `/v1/agent/self` could not be queried while detecting the datacenter
    #[error("cannot query consul agent info")]
    DatacenterQuery {
        #[source]
        source: Box<Error>,
    },

    /// JSON document returned by the registry is malformed
    #[error("cannot parse {what}")]
    Parse {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
