use std::collections::HashMap;

use serde::Deserialize;
use serde::Deserializer;

use crate::DiscoveryError;
use crate::Result;

/// One entry of `/v1/health/service/<name>`.
///
/// See <https://developer.hashicorp.com/consul/api-docs/health#list-service-instances-for-service>.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceNode {
    pub service: Service,
    pub node: Node,
    #[serde(deserialize_with = "null_as_default")]
    pub checks: Vec<Check>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Service {
    #[serde(rename = "ID")]
    pub id: String,
    pub service: String,
    pub address: String,
    pub namespace: String,
    pub partition: String,
    pub port: u16,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub meta: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Node {
    pub address: String,
    pub datacenter: String,
    pub node: String,
    #[serde(deserialize_with = "null_as_default")]
    pub meta: HashMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub tagged_addresses: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Check {
    #[serde(rename = "CheckID")]
    pub check_id: String,
    pub status: String,
    #[serde(rename = "ServiceID")]
    pub service_id: String,
}

impl ServiceNode {
    /// Aggregated health: the worst status among the checks, `passing`
    /// when there are none.
    pub fn aggregated_status(&self) -> &str {
        let mut status = "passing";
        for check in &self.checks {
            status = match (status, check.status.as_str()) {
                (_, "critical") | ("critical", _) => "critical",
                (_, "maintenance") | ("maintenance", _) => "maintenance",
                (_, "warning") | ("warning", _) => "warning",
                (current, _) => current,
            };
        }
        status
    }

    /// Service tags joined with `separator`, wrapped in it on both ends so
    /// that a single tag can be matched with `.*,tag,.*`.
    pub fn joined_tags(
        &self,
        separator: &str,
    ) -> String {
        if self.service.tags.is_empty() {
            return String::new();
        }
        format!("{separator}{}{separator}", self.service.tags.join(separator))
    }
}

// Consul renders empty collections as `null` in some versions
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn parse_service_nodes(data: &[u8]) -> Result<Vec<ServiceNode>> {
    serde_json::from_slice(data).map_err(|source| {
        DiscoveryError::Parse {
            what: "service nodes",
            source,
        }
        .into()
    })
}

/// Parses `/v1/catalog/services`: service name to its tags
pub(crate) fn parse_service_names(data: &[u8]) -> Result<HashMap<String, Vec<String>>> {
    let names: HashMap<String, Option<Vec<String>>> =
        serde_json::from_slice(data).map_err(|source| DiscoveryError::Parse {
            what: "catalog services",
            source,
        })?;
    Ok(names.into_iter().map(|(name, tags)| (name, tags.unwrap_or_default())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE_NODES: &[u8] = br#"[
      {
        "Node": {
          "ID": "40e4a748-2192-161a-0510-9bf59fe950b5",
          "Node": "foobar",
          "Address": "10.1.10.12",
          "Datacenter": "dc1",
          "TaggedAddresses": {"lan": "10.1.10.12", "wan": "10.1.10.12"},
          "Meta": {"instance_type": "t2.medium"}
        },
        "Service": {
          "ID": "redis",
          "Service": "redis",
          "Tags": ["primary"],
          "Address": "10.1.10.12",
          "Meta": {"redis_version": "4.0"},
          "Port": 8000,
          "Weights": {"Passing": 10, "Warning": 1}
        },
        "Checks": [
          {"Node": "foobar", "CheckID": "service:redis", "Status": "passing", "ServiceID": "redis"},
          {"Node": "foobar", "CheckID": "serfHealth", "Status": "warning", "ServiceID": ""}
        ]
      }
    ]"#;

    #[test]
    fn parse_service_nodes_reads_known_fields() {
        let nodes = parse_service_nodes(SERVICE_NODES).unwrap();
        assert_eq!(nodes.len(), 1);

        let sn = &nodes[0];
        assert_eq!(sn.service.id, "redis");
        assert_eq!(sn.service.port, 8000);
        assert_eq!(sn.service.tags, vec!["primary".to_string()]);
        assert_eq!(sn.node.node, "foobar");
        assert_eq!(sn.node.datacenter, "dc1");
        assert_eq!(sn.node.tagged_addresses.get("lan").map(String::as_str), Some("10.1.10.12"));
        assert_eq!(sn.checks.len(), 2);
        assert_eq!(sn.checks[0].check_id, "service:redis");
        assert_eq!(sn.aggregated_status(), "warning");
    }

    #[test]
    fn null_collections_are_tolerated() {
        let data = br#"[{"Node": {"Node": "n1", "Meta": null}, "Service": {"Service": "web", "Tags": null, "Meta": null}, "Checks": null}]"#;
        let nodes = parse_service_nodes(data).unwrap();
        assert!(nodes[0].service.tags.is_empty());
        assert!(nodes[0].checks.is_empty());
    }

    #[test]
    fn aggregated_status_picks_worst() {
        let mut sn = ServiceNode::default();
        assert_eq!(sn.aggregated_status(), "passing");

        for status in ["passing", "critical", "warning"] {
            sn.checks.push(Check {
                status: status.to_string(),
                ..Default::default()
            });
        }
        assert_eq!(sn.aggregated_status(), "critical");
    }

    #[test]
    fn joined_tags_wraps_with_separator() {
        let mut sn = ServiceNode::default();
        assert_eq!(sn.joined_tags(","), "");

        sn.service.tags = vec!["a".to_string(), "b".to_string()];
        assert_eq!(sn.joined_tags(","), ",a,b,");
        assert_eq!(sn.joined_tags(";"), ";a;b;");
    }

    #[test]
    fn parse_service_names_reads_tag_map() {
        let names = parse_service_names(br#"{"consul": null, "web": ["prod", "v1"]}"#).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names["web"], vec!["prod".to_string(), "v1".to_string()]);
    }
}
