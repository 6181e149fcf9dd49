//! Cluster topology resolved at the start of every poll cycle
//!
//! `cluster/status` returns a flat list of records tagged by `type`:
//! at most one `cluster` record and one `node` record per member.
//! `cluster/ha/status/current` carries the `quorum` record.

use crate::client::schema::{gauge_value, is_strict_one, ClusterStatusRecord, HaStatusRecord};
use crate::client::ApiError;
use crate::labels::{LabelError, LabelSet};
use serde_json::Value;
use tracing::{error, warn};

pub const CLUSTER_STATUS_PATH: &str = "cluster/status";
pub const HA_STATUS_PATH: &str = "cluster/ha/status/current";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Declared member count (`nodes` field)
    pub nodes: Option<f64>,
}

/// One cluster member, valid for a single tick
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub id: Option<String>,
    pub name: String,
    pub online: Option<Value>,
    pub local: Option<Value>,
    pub ip: Option<String>,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            online: None,
            local: None,
            ip: None,
        }
    }

    /// Online only when the API reports the number 1.
    // NOTE: some API versions may report "1"; that counts as offline here.
    pub fn is_online(&self) -> bool {
        is_strict_one(self.online.as_ref())
    }

    /// `parent + {node, nodeid[, nodeip]}`
    pub fn labels(&self, parent: &LabelSet, with_ip: bool) -> Result<LabelSet, LabelError> {
        let mut own = vec![
            ("node", Some(self.name.clone())),
            ("nodeid", self.id.clone()),
        ];
        if with_ip {
            own.push(("nodeip", self.ip.clone()));
        }
        parent.merge(own)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterSnapshot {
    pub cluster: Option<ClusterInfo>,
    pub nodes: Vec<NodeInfo>,
}

impl ClusterSnapshot {
    /// Partition a `cluster/status` document. Fails only when it is not a list;
    /// malformed items are logged and skipped.
    pub fn from_value(value: Value) -> Result<Self, ApiError> {
        let items = match value {
            Value::Array(items) => items,
            other => {
                return Err(ApiError::shape(
                    CLUSTER_STATUS_PATH,
                    format!("expected a list, got {}", json_kind(&other)),
                ))
            }
        };

        let mut snapshot = ClusterSnapshot::default();
        for item in items {
            if !item.is_object() {
                error!("Unexpected cluster status item: {}", item);
                continue;
            }
            let record: ClusterStatusRecord = match serde_json::from_value(item) {
                Ok(r) => r,
                Err(e) => {
                    error!("Undecodable cluster status record: {}", e);
                    continue;
                }
            };

            match record.kind.as_deref() {
                Some("cluster") => {
                    if snapshot.cluster.is_some() {
                        warn!("Several cluster records in one snapshot, keeping the last");
                    }
                    snapshot.cluster = Some(ClusterInfo {
                        id: record.id,
                        name: record.name,
                        nodes: record.nodes,
                    });
                }
                Some("node") => match record.name {
                    Some(name) => snapshot.nodes.push(NodeInfo {
                        id: record.id,
                        name,
                        online: record.online,
                        local: record.local,
                        ip: record.ip,
                    }),
                    None => warn!("Node record without name skipped: id={:?}", record.id),
                },
                _ => {}
            }
        }

        Ok(snapshot)
    }

    pub fn online_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_online()).count()
    }

    pub fn declared_node_count(&self) -> Option<f64> {
        self.cluster.as_ref().and_then(|c| c.nodes)
    }

    /// `{cluster, clusterid}`; both without value when no cluster record exists
    pub fn labels(&self) -> LabelSet {
        let (name, id) = match &self.cluster {
            Some(c) => (c.name.clone(), c.id.clone()),
            None => (None, None),
        };
        // two distinct keys on an empty set cannot collide
        LabelSet::root([("cluster", name), ("clusterid", id)]).unwrap_or_default()
    }
}

/// Quorum record of the HA status
#[derive(Debug, Clone, PartialEq)]
pub struct QuorumStatus {
    pub id: Option<String>,
    /// Passed through as reported (numbers and booleans coerced)
    pub quorate: Option<f64>,
    pub status: Option<String>,
}

impl QuorumStatus {
    /// `status == "OK"` -> 1, anything else -> 0
    pub fn status_value(&self) -> f64 {
        if self.status.as_deref() == Some("OK") {
            1.0
        } else {
            0.0
        }
    }
}

/// `None` when the list holds no `quorum` record.
pub fn parse_ha_status(value: Value) -> Result<Option<QuorumStatus>, ApiError> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(ApiError::shape(
                HA_STATUS_PATH,
                format!("expected a list, got {}", json_kind(&other)),
            ))
        }
    };

    let mut quorum = None;
    for item in items {
        if !item.is_object() {
            error!("Unexpected HA status item: {}", item);
            continue;
        }
        let record: HaStatusRecord = match serde_json::from_value(item) {
            Ok(r) => r,
            Err(e) => {
                error!("Undecodable HA status record: {}", e);
                continue;
            }
        };
        if record.kind.as_deref() == Some("quorum") {
            quorum = Some(QuorumStatus {
                id: record.id,
                quorate: record.quorate.as_ref().and_then(gauge_value),
                status: record.status,
            });
        }
    }
    Ok(quorum)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status_doc() -> Value {
        json!([
            {"type": "cluster", "id": "cluster", "name": "lab", "nodes": 3, "quorate": 1},
            {"type": "node", "id": "node/pve1", "name": "pve1", "online": 1, "local": 1, "ip": "10.0.0.1"},
            {"type": "node", "id": "node/pve2", "name": "pve2", "online": 0, "ip": "10.0.0.2"},
            {"type": "node", "id": "node/pve3", "name": "pve3", "online": 1, "ip": "10.0.0.3"}
        ])
    }

    #[test]
    fn test_partition() {
        let snapshot = ClusterSnapshot::from_value(status_doc()).unwrap();
        assert_eq!(snapshot.nodes.len(), 3);
        assert_eq!(snapshot.declared_node_count(), Some(3.0));
        assert_eq!(snapshot.online_count(), 2);

        let labels = snapshot.labels();
        assert_eq!(labels.get("cluster"), Some("lab"));
        assert_eq!(labels.get("clusterid"), Some("cluster"));
    }

    #[test]
    fn test_counts_do_not_depend_on_order() {
        let mut items = status_doc().as_array().unwrap().clone();
        items.reverse();
        let snapshot = ClusterSnapshot::from_value(Value::Array(items)).unwrap();
        assert_eq!(snapshot.online_count(), 2);
        assert_eq!(snapshot.declared_node_count(), Some(3.0));
    }

    #[test]
    fn test_online_is_strict_numeric() {
        let snapshot = ClusterSnapshot::from_value(json!([
            {"type": "node", "name": "a", "online": 1},
            {"type": "node", "name": "b", "online": "1"},
            {"type": "node", "name": "c", "online": true},
            {"type": "node", "name": "d"}
        ]))
        .unwrap();
        assert_eq!(snapshot.online_count(), 1);
    }

    #[test]
    fn test_missing_cluster_record() {
        let snapshot = ClusterSnapshot::from_value(json!([
            {"type": "node", "name": "pve1", "online": 1}
        ]))
        .unwrap();
        assert!(snapshot.cluster.is_none());
        assert_eq!(snapshot.declared_node_count(), None);

        let labels = snapshot.labels();
        assert!(labels.contains_key("cluster"));
        assert!(labels.contains_key("clusterid"));
        assert_eq!(labels.get("cluster"), None);
    }

    #[test]
    fn test_not_a_list_is_shape_error() {
        let err = ClusterSnapshot::from_value(json!({"errors": "denied"})).unwrap_err();
        assert!(matches!(err, ApiError::Shape { .. }));
    }

    #[test]
    fn test_non_object_items_are_skipped() {
        let snapshot = ClusterSnapshot::from_value(json!([
            "garbage",
            42,
            {"type": "node", "name": "pve1", "online": 1}
        ]))
        .unwrap();
        assert_eq!(snapshot.nodes.len(), 1);
    }

    #[test]
    fn test_node_labels() {
        let snapshot = ClusterSnapshot::from_value(status_doc()).unwrap();
        let node = &snapshot.nodes[0];
        let labels = node.labels(&snapshot.labels(), true).unwrap();
        assert_eq!(labels.get("node"), Some("pve1"));
        assert_eq!(labels.get("nodeid"), Some("node/pve1"));
        assert_eq!(labels.get("nodeip"), Some("10.0.0.1"));

        let without_ip = node.labels(&snapshot.labels(), false).unwrap();
        assert!(!without_ip.contains_key("nodeip"));
    }

    #[test]
    fn test_ha_status_mapping() {
        let ok = parse_ha_status(json!([
            {"type": "quorum", "id": "quorum", "quorate": 1, "status": "OK"},
            {"type": "master", "node": "pve1"}
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(ok.status_value(), 1.0);
        assert_eq!(ok.quorate, Some(1.0));

        let degraded = parse_ha_status(json!([
            {"type": "quorum", "quorate": 0, "status": "No quorum on node 'pve1'!"}
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(degraded.status_value(), 0.0);
        assert_eq!(degraded.quorate, Some(0.0));
    }

    #[test]
    fn test_ha_status_without_quorum_record() {
        let none = parse_ha_status(json!([{"type": "service", "sid": "vm:100"}])).unwrap();
        assert!(none.is_none());
        assert!(parse_ha_status(json!("nope")).is_err());
    }
}
