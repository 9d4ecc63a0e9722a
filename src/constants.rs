// -
// Environment

/// Path to a file holding the ACL token; read when no explicit token is configured
pub(crate) const CONSUL_HTTP_TOKEN_FILE_ENV: &str = "CONSUL_HTTP_TOKEN_FILE";
/// ACL token value; consulted after `CONSUL_HTTP_TOKEN_FILE`
pub(crate) const CONSUL_HTTP_TOKEN_ENV: &str = "CONSUL_HTTP_TOKEN";

// -
// Agent defaults

pub(crate) const DEFAULT_SERVER: &str = "localhost:8500";
pub(crate) const DEFAULT_SCHEME: &str = "http";
pub(crate) const DEFAULT_TAG_SEPARATOR: &str = ",";

// -
// HTTP API

/// Freshness header carried by every blocking query response
pub(crate) const CONSUL_INDEX_HEADER: &str = "X-Consul-Index";

pub(crate) const AGENT_SELF_PATH: &str = "/v1/agent/self";
pub(crate) const CATALOG_SERVICES_PATH: &str = "/v1/catalog/services";
pub(crate) const HEALTH_SERVICE_PATH_PREFIX: &str = "/v1/health/service/";

/// Upper bound Consul accepts for the `wait` parameter
pub(crate) const MAX_BLOCKING_WAIT_SECS: u64 = 10 * 60;
