use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serial_test::serial;
use temp_env::with_vars;
use tokio::time::sleep;
use tokio::time::timeout;

use super::*;
use crate::constants::CONSUL_HTTP_TOKEN_ENV;
use crate::constants::CONSUL_HTTP_TOKEN_FILE_ENV;
use crate::discovery::client::MockDiscoveryClient;
use crate::BasicAuthConfig;
use crate::DiscoverySettings;
use crate::Error;
use crate::NetworkError;
use crate::ProxyClientConfig;
use crate::SdConfig;
use crate::SdConfigError;
use crate::TlsConfig;

fn agent_unavailable() -> Error {
    NetworkError::UnexpectedStatus {
        url: "http://consul:8500/v1/catalog/services".to_string(),
        status: 503,
        body: "No cluster leader".to_string(),
    }
    .into()
}

fn unavailable_catalog(client: &mut MockDiscoveryClient) {
    client.expect_api_server().return_const("http://consul:8500".to_string());
    client
        .expect_get_blocking_api_response()
        .returning(|_| Err(agent_unavailable()));
}

fn build_blocking(
    sdc: &SdConfig,
    base_dir: &Path,
) -> Result<ApiConfig> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let cfg = ApiConfig::build(sdc, base_dir, &DiscoverySettings::default()).await?;
        cfg.stop();
        Ok(cfg)
    })
}

#[test]
fn normalize_server_cases() {
    assert_eq!(normalize_server("", ""), "http://localhost:8500");
    assert_eq!(normalize_server("consul:8500", ""), "http://consul:8500");
    assert_eq!(normalize_server("consul:8501", "https"), "https://consul:8501");
    assert_eq!(normalize_server("https://consul:8501", "http"), "https://consul:8501");
    assert_eq!(normalize_server("", "https"), "https://localhost:8500");
}

#[tokio::test]
async fn explicit_datacenter_skips_agent_query() {
    let mut client = MockDiscoveryClient::new();
    client.expect_get_api_response().times(0);

    let dc = resolve_datacenter(&client, "eu-1").await.unwrap();
    assert_eq!(dc, "eu-1");
}

#[tokio::test]
async fn empty_datacenter_is_detected_once_and_used_in_queries() {
    let mut client = MockDiscoveryClient::new();
    client
        .expect_get_api_response()
        .withf(|path| path == "/v1/agent/self")
        .times(1)
        .returning(|_| Ok(Bytes::from_static(br#"{"Config": {"Datacenter": "dc7"}}"#)));

    let paths = Arc::new(Mutex::new(Vec::<String>::new()));
    let seen = paths.clone();
    client.expect_api_server().return_const("http://consul:8500".to_string());
    client.expect_get_blocking_api_response().returning(move |path| {
        seen.lock().push(path.to_string());
        Err(agent_unavailable())
    });

    let cfg = ApiConfig::with_client(&SdConfig::default(), Arc::new(client), &DiscoverySettings::default())
        .await
        .unwrap();
    assert_eq!(cfg.datacenter(), "dc7");
    assert_eq!(cfg.tag_separator(), ",");

    timeout(Duration::from_secs(2), async {
        while paths.lock().is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("watcher issued a catalog query");

    assert!(paths.lock()[0].starts_with("/v1/catalog/services?dc=dc7&index=0&wait="));
    cfg.stop();
}

#[tokio::test]
async fn agent_failure_aborts_before_watching() {
    let mut client = MockDiscoveryClient::new();
    client
        .expect_get_api_response()
        .times(1)
        .returning(|_| Err(agent_unavailable()));
    client.expect_get_blocking_api_response().times(0);

    let result = ApiConfig::with_client(&SdConfig::default(), Arc::new(client), &DiscoverySettings::default()).await;

    assert!(matches!(
        result,
        Err(Error::Discovery(crate::DiscoveryError::DatacenterQuery { .. }))
    ));
}

#[tokio::test]
async fn malformed_agent_document_is_reported() {
    let mut client = MockDiscoveryClient::new();
    client
        .expect_get_api_response()
        .returning(|_| Ok(Bytes::from_static(b"not json")));

    let err = resolve_datacenter(&client, "").await.unwrap_err();
    assert!(matches!(err, Error::Discovery(crate::DiscoveryError::Parse { .. })));
}

#[tokio::test]
async fn custom_tag_separator_is_kept() {
    let mut client = MockDiscoveryClient::new();
    unavailable_catalog(&mut client);

    let sdc = SdConfig {
        datacenter: "dc1".to_string(),
        tag_separator: Some(";".to_string()),
        ..Default::default()
    };
    let cfg = ApiConfig::with_client(&sdc, Arc::new(client), &DiscoverySettings::default())
        .await
        .unwrap();

    assert_eq!(cfg.tag_separator(), ";");
    assert!(cfg.watcher().is_running());
    cfg.stop();
}

#[test]
#[serial]
fn missing_token_file_fails_build() {
    let temp_dir = tempfile::tempdir().unwrap();
    let missing = temp_dir.path().join("no-such-token");

    with_vars(
        vec![
            (CONSUL_HTTP_TOKEN_FILE_ENV, Some(missing.to_str().unwrap())),
            (CONSUL_HTTP_TOKEN_ENV, None),
        ],
        || {
            let sdc = SdConfig {
                datacenter: "dc1".to_string(),
                ..Default::default()
            };
            let result = build_blocking(&sdc, temp_dir.path());
            assert!(matches!(
                result,
                Err(Error::SdConfig(SdConfigError::TokenFile { .. }))
            ));
        },
    );
}

#[test]
#[serial]
fn missing_proxy_password_file_fails_build() {
    let temp_dir = tempfile::tempdir().unwrap();

    with_vars(
        vec![
            (CONSUL_HTTP_TOKEN_FILE_ENV, None::<&str>),
            (CONSUL_HTTP_TOKEN_ENV, None),
        ],
        || {
            let sdc = SdConfig {
                datacenter: "dc1".to_string(),
                proxy_url: Some("http://proxy:3128".to_string()),
                proxy_client_config: ProxyClientConfig {
                    basic_auth: Some(BasicAuthConfig {
                        username: "scraper".to_string(),
                        password: None,
                        password_file: Some("proxy-password".to_string()),
                    }),
                    ..Default::default()
                },
                ..Default::default()
            };
            let result = build_blocking(&sdc, temp_dir.path());
            assert!(matches!(result, Err(Error::SdConfig(SdConfigError::ProxyAuth(_)))));
        },
    );
}

#[test]
#[serial]
fn invalid_proxy_url_fails_build() {
    let temp_dir = tempfile::tempdir().unwrap();

    with_vars(
        vec![
            (CONSUL_HTTP_TOKEN_FILE_ENV, None::<&str>),
            (CONSUL_HTTP_TOKEN_ENV, None),
        ],
        || {
            let sdc = SdConfig {
                datacenter: "dc1".to_string(),
                proxy_url: Some("http://[::1".to_string()),
                ..Default::default()
            };
            let result = build_blocking(&sdc, temp_dir.path());
            assert!(matches!(
                result,
                Err(Error::SdConfig(SdConfigError::InvalidProxyUrl { .. }))
            ));
        },
    );
}

#[test]
#[serial]
fn missing_ca_file_is_resolved_against_base_dir() {
    let temp_dir = tempfile::tempdir().unwrap();

    with_vars(
        vec![
            (CONSUL_HTTP_TOKEN_FILE_ENV, None::<&str>),
            (CONSUL_HTTP_TOKEN_ENV, None),
        ],
        || {
            let sdc = SdConfig {
                datacenter: "dc1".to_string(),
                tls_config: TlsConfig {
                    ca_file: Some("ca.pem".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            };
            match build_blocking(&sdc, temp_dir.path()) {
                Err(Error::SdConfig(SdConfigError::TlsFile { path, .. })) => {
                    assert_eq!(path, temp_dir.path().join("ca.pem"));
                }
                Err(other) => panic!("unexpected error: {other:?}"),
                Ok(_) => panic!("build must fail"),
            }
        },
    );
}

#[test]
#[serial]
fn explicit_datacenter_builds_without_network() {
    let temp_dir = tempfile::tempdir().unwrap();
    let password_path = temp_dir.path().join("proxy-password");
    std::fs::write(&password_path, "s3cret\n").unwrap();

    with_vars(
        vec![
            (CONSUL_HTTP_TOKEN_FILE_ENV, None::<&str>),
            (CONSUL_HTTP_TOKEN_ENV, Some("acl-token")),
        ],
        || {
            let sdc = SdConfig {
                server: "127.0.0.1:1".to_string(),
                datacenter: "dc1".to_string(),
                proxy_url: Some("http://proxy:3128".to_string()),
                proxy_client_config: ProxyClientConfig {
                    basic_auth: Some(BasicAuthConfig {
                        username: "scraper".to_string(),
                        password: None,
                        password_file: Some("proxy-password".to_string()),
                    }),
                    ..Default::default()
                },
                ..Default::default()
            };
            let cfg = build_blocking(&sdc, temp_dir.path()).unwrap();
            assert_eq!(cfg.datacenter(), "dc1");
        },
    );
}

#[test]
#[serial]
fn invalid_descriptor_fails_build() {
    let temp_dir = tempfile::tempdir().unwrap();

    with_vars(
        vec![
            (CONSUL_HTTP_TOKEN_FILE_ENV, None::<&str>),
            (CONSUL_HTTP_TOKEN_ENV, None),
        ],
        || {
            let cert_without_key = SdConfig {
                datacenter: "dc1".to_string(),
                token: Some(String::new()),
                tls_config: TlsConfig {
                    cert_file: Some("/nonexistent/cert.pem".to_string()),
                    key_file: None,
                    ..Default::default()
                },
                ..Default::default()
            };
            assert!(matches!(
                build_blocking(&cert_without_key, temp_dir.path()),
                Err(Error::Config(_))
            ));

            let password_without_username = SdConfig {
                datacenter: "dc1".to_string(),
                password: "secret".to_string(),
                ..Default::default()
            };
            assert!(matches!(
                build_blocking(&password_without_username, temp_dir.path()),
                Err(Error::Config(_))
            ));
        },
    );
}
