//! Realistic Proxmox API `data` documents

use serde_json::{json, Value};

/// `cluster/status` for a cluster named `name` with `nodes` online members
/// `pve1..pveN` at `10.0.0.1..N`
pub fn cluster_status(name: &str, nodes: usize) -> Value {
    let mut records = vec![json!({
        "type": "cluster",
        "id": "cluster",
        "name": name,
        "nodes": nodes,
        "quorate": 1,
        "version": 3
    })];
    for i in 1..=nodes {
        records.push(node_record(&format!("pve{i}"), &format!("10.0.0.{i}"), json!(1)));
    }
    Value::Array(records)
}

pub fn node_record(name: &str, ip: &str, online: Value) -> Value {
    json!({
        "type": "node",
        "id": format!("node/{name}"),
        "name": name,
        "online": online,
        "local": 0,
        "nodeid": 1,
        "ip": ip,
        "level": ""
    })
}

pub fn ha_status(quorate: Value, status: &str) -> Value {
    json!([
        { "type": "quorum", "id": "quorum", "quorate": quorate, "status": status, "node": "pve1" },
        { "type": "master", "id": "master", "node": "pve1", "status": "idle" }
    ])
}

pub fn node_status() -> Value {
    json!({
        "cpu": 0.0523,
        "wait": 0.0012,
        "idle": 0,
        "uptime": 1_234_567,
        "loadavg": ["0.52", "0.61", "0.70"],
        "cpuinfo": { "cores": 8, "sockets": 1, "cpus": 16, "model": "AMD EPYC" },
        "memory": { "total": 67_108_864_000u64, "used": 12_884_901_888u64, "free": 54_223_962_112u64 },
        "swap": { "total": 8_589_934_592u64, "used": 0, "free": 8_589_934_592u64 },
        "rootfs": { "total": 100_000_000_000u64, "used": 20_000_000_000u64, "free": 80_000_000_000u64, "avail": 75_000_000_000u64 },
        "kversion": "Linux 6.8.12-1-pve"
    })
}

pub fn storage_entry(storage: &str, kind: &str, active: Value, enabled: Value) -> Value {
    json!({
        "storage": storage,
        "type": kind,
        "active": active,
        "enabled": enabled,
        "total": 1_000_000_000u64,
        "used": 250_000_000u64,
        "avail": 750_000_000u64,
        "content": "images,rootdir",
        "shared": 0
    })
}

pub fn guest_entry(vmid: u64, name: &str, status: &str) -> Value {
    json!({ "vmid": vmid, "name": name, "status": status })
}

pub fn vm_status() -> Value {
    json!({
        "status": "running",
        "qmpstatus": "running",
        "cpu": 0.031,
        "cpus": 4,
        "mem": 2_147_483_648u64,
        "maxmem": 4_294_967_296u64,
        "freemem": 1_073_741_824u64,
        "balloon": 4_294_967_296u64,
        "maxdisk": 34_359_738_368u64,
        "diskread": 123_456,
        "diskwrite": 654_321,
        "netin": 1000,
        "netout": 2000,
        "uptime": 3600
    })
}

pub fn lxc_status() -> Value {
    json!({
        "status": "running",
        "cpu": 0.01,
        "cpus": 2,
        "mem": 268_435_456u64,
        "maxmem": 536_870_912u64,
        "swap": 0,
        "maxswap": 536_870_912u64,
        "disk": 1_073_741_824u64,
        "maxdisk": 8_589_934_592u64,
        "diskread": 100,
        "diskwrite": 200,
        "netin": 300,
        "netout": 400,
        "uptime": 7200
    })
}

/// Guest agent answer with a loopback and one LAN interface
pub fn agent_interfaces(lan_ip: &str) -> Value {
    json!({
        "result": [
            {
                "name": "lo",
                "hardware-address": "00:00:00:00:00:00",
                "ip-addresses": [
                    { "ip-address": "127.0.0.1", "ip-address-type": "ipv4", "prefix": 8 },
                    { "ip-address": "::1", "ip-address-type": "ipv6", "prefix": 128 }
                ]
            },
            {
                "name": "ens18",
                "hardware-address": "bc:24:11:2a:3b:4c",
                "ip-addresses": [
                    { "ip-address": lan_ip, "ip-address-type": "ipv4", "prefix": 24 },
                    { "ip-address": "fe80::be24:11ff:fe2a:3b4c", "ip-address-type": "ipv6", "prefix": 64 }
                ]
            }
        ]
    })
}

pub fn service_entry(service: &str, state: &str, active_state: &str, unit_state: &str) -> Value {
    json!({
        "service": service,
        "name": service,
        "desc": format!("{service} daemon"),
        "state": state,
        "active-state": active_state,
        "unit-state": unit_state
    })
}
