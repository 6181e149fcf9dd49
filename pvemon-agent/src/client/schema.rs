//! Response shapes for the endpoints the collector reads.
//!
//! Every metric field is optional: a missing key skips that metric instead
//! of failing the entity. Numeric fields go through `gauge`, which accepts
//! numbers, numeric strings and booleans.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// numbers, numeric strings and booleans -> f64
pub fn gauge_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn gauge<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(gauge_value))
}

/// Ids arrive as numbers on some endpoints and strings on others
pub fn id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Strict `== 1`: integer 1 or 1.0 only. `true` and `"1"` are not one.
pub fn is_strict_one(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Number(n)) => n.as_f64() == Some(1.0),
        _ => false,
    }
}

/// One record of `cluster/status`
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterStatusRecord {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "id_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Declared member count (cluster record only)
    #[serde(default, deserialize_with = "gauge")]
    pub nodes: Option<f64>,
    #[serde(default)]
    pub online: Option<Value>,
    #[serde(default)]
    pub local: Option<Value>,
    #[serde(default)]
    pub ip: Option<String>,
}

/// One record of `cluster/ha/status/current`
#[derive(Debug, Clone, Deserialize)]
pub struct HaStatusRecord {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "id_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub quorate: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
}

/// `nodes/{node}/status`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub cpuinfo: Option<CpuInfo>,
    #[serde(default)]
    pub swap: Option<Usage>,
    #[serde(default)]
    pub rootfs: Option<Usage>,
    #[serde(default)]
    pub memory: Option<Usage>,
    #[serde(default, deserialize_with = "gauge")]
    pub idle: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub cpu: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub uptime: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub wait: Option<f64>,
    /// `["0.12", "0.10", "0.05"]`
    #[serde(default)]
    pub loadavg: Option<Vec<Value>>,
}

impl NodeStatus {
    /// Load average for window 0 (1 min), 1 (5 min) or 2 (15 min)
    pub fn load(&self, window: usize) -> Option<f64> {
        self.loadavg
            .as_ref()
            .and_then(|l| l.get(window))
            .and_then(gauge_value)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuInfo {
    #[serde(default, deserialize_with = "gauge")]
    pub cores: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub sockets: Option<f64>,
}

/// Memory, swap and rootfs blocks share this shape
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default, deserialize_with = "gauge")]
    pub free: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub total: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub used: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub avail: Option<f64>,
}

/// One entry of `nodes/{node}/storage`
#[derive(Debug, Clone, Deserialize)]
pub struct StorageEntry {
    #[serde(default)]
    pub storage: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub active: Option<Value>,
    #[serde(default)]
    pub enabled: Option<Value>,
    #[serde(default, deserialize_with = "gauge")]
    pub total: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub used: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub avail: Option<f64>,
}

impl StorageEntry {
    pub fn is_active_and_enabled(&self) -> bool {
        is_strict_one(self.active.as_ref()) && is_strict_one(self.enabled.as_ref())
    }
}

/// One entry of `nodes/{node}/qemu` or `nodes/{node}/lxc`
#[derive(Debug, Clone, Deserialize)]
pub struct GuestEntry {
    #[serde(default, deserialize_with = "id_string")]
    pub vmid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl GuestEntry {
    pub fn is_running(&self) -> bool {
        self.status.as_deref() == Some("running")
    }
}

/// `nodes/{node}/qemu/{vmid}/status/current`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VmStatus {
    #[serde(default, deserialize_with = "gauge")]
    pub netout: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub netin: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub uptime: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub freemem: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub maxdisk: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub balloon: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub diskwrite: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub diskread: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub mem: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub maxmem: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub cpu: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub cpus: Option<f64>,
    #[serde(default)]
    pub qmpstatus: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// `nodes/{node}/lxc/{vmid}/status/current`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LxcStatus {
    #[serde(default, deserialize_with = "gauge")]
    pub netout: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub netin: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub uptime: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub maxswap: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub swap: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub diskwrite: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub diskread: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub disk: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub maxdisk: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub mem: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub maxmem: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub cpu: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub cpus: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

/// One entry of `nodes/{node}/services`
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(rename = "active-state", default)]
    pub active_state: Option<String>,
    #[serde(default)]
    pub active: Option<String>,
    /// Newer releases report the running flag as `state`
    #[serde(default)]
    pub state: Option<String>,
    #[serde(rename = "unit-state", default)]
    pub unit_state: Option<String>,
}

impl ServiceEntry {
    pub fn is_running(&self) -> bool {
        self.active.as_deref().or(self.state.as_deref()) == Some("running")
    }

    pub fn is_active(&self) -> bool {
        self.active_state.as_deref() == Some("active")
    }

    pub fn is_enabled(&self) -> bool {
        self.unit_state.as_deref() == Some("enabled")
    }
}

/// `nodes/{node}/qemu/{vmid}/agent/network-get-interfaces`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentInterfaces {
    #[serde(default)]
    pub result: Vec<AgentInterface>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentInterface {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "hardware-address", default)]
    pub hardware_address: Option<String>,
    #[serde(rename = "ip-addresses", default)]
    pub ip_addresses: Vec<AgentIpAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentIpAddress {
    #[serde(rename = "ip-address", default)]
    pub ip_address: Option<String>,
    #[serde(rename = "ip-address-type", default)]
    pub ip_address_type: Option<String>,
}

impl AgentInterfaces {
    /// Last non-loopback IPv4 address in interface-then-address order, or `""`.
    pub fn reported_ip(&self) -> String {
        let mut found = String::new();
        for iface in &self.result {
            for addr in &iface.ip_addresses {
                if let Some(ip) = addr.ip_address.as_deref() {
                    if !ip.is_empty() && ip != "127.0.0.1" && !ip.contains(':') {
                        found = ip.to_string();
                    }
                }
            }
        }
        found
    }
}
