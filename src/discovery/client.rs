//! HTTP access to the Consul agent.
//!
//! [`DiscoveryClient`] is the seam between the discovery logic and the
//! transport; [`HttpDiscoveryClient`] is the production implementation on
//! top of `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use reqwest::header::HeaderValue;
use reqwest::Certificate;
use reqwest::Identity;
use reqwest::Proxy;
use tracing::trace;

use super::AuthConfig;
use crate::constants::CONSUL_INDEX_HEADER;
use crate::BlockingConfig;
use crate::NetworkError;
use crate::Result;
use crate::SdConfigError;

/// Response of a blocking query
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub body: Bytes,
    /// Raw `X-Consul-Index` header value, if present
    pub index: Option<String>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DiscoveryClient: Send + Sync + 'static {
    /// Base URL of the agent, e.g. `http://localhost:8500`
    fn api_server(&self) -> String;

    /// Plain GET bounded by the request timeout
    async fn get_api_response(
        &self,
        path: &str,
    ) -> Result<Bytes>;

    /// GET bounded by the blocking read timeout; `path` already carries
    /// the `index` and `wait` parameters
    async fn get_blocking_api_response(
        &self,
        path: &str,
    ) -> Result<ApiResponse>;
}

/// TLS material already loaded from disk
#[derive(Debug, Clone, Default)]
pub struct TlsMaterial {
    pub ca_pem: Option<Vec<u8>>,
    /// Client certificate followed by its private key, PEM encoded
    pub identity_pem: Option<Vec<u8>>,
    pub insecure_skip_verify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyAuth {
    None,
    Basic { username: String, password: String },
    Bearer(String),
}

#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub url: String,
    pub auth: ProxyAuth,
}

pub struct HttpDiscoveryClient {
    api_server: String,
    auth: AuthConfig,
    client: reqwest::Client,
    request_timeout: Duration,
    blocking_read_timeout: Duration,
}

impl HttpDiscoveryClient {
    pub fn new(
        api_server: String,
        auth: AuthConfig,
        tls: TlsMaterial,
        proxy: Option<ProxySettings>,
        blocking: &BlockingConfig,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(blocking.request_timeout())
            .danger_accept_invalid_certs(tls.insecure_skip_verify);

        if let Some(ca_pem) = &tls.ca_pem {
            let cert =
                Certificate::from_pem(ca_pem).map_err(|e| SdConfigError::InvalidTls(e.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some(identity_pem) = &tls.identity_pem {
            let identity = Identity::from_pem(identity_pem)
                .map_err(|e| SdConfigError::InvalidTls(e.to_string()))?;
            builder = builder.identity(identity);
        }
        // only an explicitly configured proxy is used
        builder = match proxy {
            Some(proxy) => builder.proxy(build_proxy(proxy)?),
            None => builder.no_proxy(),
        };

        let client = builder.build().map_err(|e| SdConfigError::ClientBuild {
            api_server: api_server.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            api_server,
            auth,
            client,
            request_timeout: blocking.request_timeout(),
            blocking_read_timeout: blocking.read_timeout(),
        })
    }

    async fn get(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<(String, reqwest::Response)> {
        let url = format!("{}{}", self.api_server, path);
        trace!(%url, ?timeout, "GET");

        let request = self.client.get(&url).timeout(timeout);
        let request = match &self.auth {
            AuthConfig::None => request,
            AuthConfig::Bearer(token) => request.bearer_auth(token.trim()),
            AuthConfig::Basic { username, password } => request.basic_auth(username, Some(password)),
        };

        let response = match request.send().await {
            Ok(r) => r,
            Err(source) => return Err(NetworkError::Request { url, source }.into()),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::UnexpectedStatus {
                url,
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok((url, response))
    }
}

#[async_trait]
impl DiscoveryClient for HttpDiscoveryClient {
    fn api_server(&self) -> String {
        self.api_server.clone()
    }

    async fn get_api_response(
        &self,
        path: &str,
    ) -> Result<Bytes> {
        let (url, response) = self.get(path, self.request_timeout).await?;
        match response.bytes().await {
            Ok(body) => Ok(body),
            Err(source) => Err(NetworkError::Request { url, source }.into()),
        }
    }

    async fn get_blocking_api_response(
        &self,
        path: &str,
    ) -> Result<ApiResponse> {
        let (url, response) = self.get(path, self.blocking_read_timeout).await?;
        let index = response
            .headers()
            .get(CONSUL_INDEX_HEADER)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

        match response.bytes().await {
            Ok(body) => Ok(ApiResponse { body, index }),
            Err(source) => Err(NetworkError::Request { url, source }.into()),
        }
    }
}

fn build_proxy(settings: ProxySettings) -> Result<Proxy> {
    let proxy = Proxy::all(settings.url.as_str()).map_err(|e| SdConfigError::InvalidProxyUrl {
        url: settings.url.clone(),
        reason: e.to_string(),
    })?;

    let proxy = match settings.auth {
        ProxyAuth::None => proxy,
        ProxyAuth::Basic { username, password } => proxy.basic_auth(&username, &password),
        ProxyAuth::Bearer(token) => {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|e| SdConfigError::ProxyAuth(e.to_string()))?;
            proxy.custom_http_auth(value)
        }
    };
    Ok(proxy)
}
