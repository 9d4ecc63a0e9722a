use serde::Deserialize;

use crate::DiscoveryError;
use crate::Result;

/// Subset of `/v1/agent/self`.
///
/// See <https://developer.hashicorp.com/consul/api-docs/agent#read-configuration>.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Agent {
    #[serde(default)]
    pub config: AgentConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentConfig {
    #[serde(default)]
    pub datacenter: String,
}

pub(crate) fn parse_agent(data: &[u8]) -> Result<Agent> {
    serde_json::from_slice(data).map_err(|source| {
        DiscoveryError::Parse {
            what: "consul agent info",
            source,
        }
        .into()
    })
}
