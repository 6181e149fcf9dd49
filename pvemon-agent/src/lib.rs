//! pvemon agent - Proxmox VE cluster metrics collection
//!
//! Polls the Proxmox management API on a schedule and forwards metrics:
//! - Cluster topology and HA quorum status
//! - Node health, storage capacity, services
//! - Running QEMU VMs and LXC containers
//! - Dynatrace line protocol ingest with batching

pub mod client;
pub mod collect;
pub mod config;
pub mod health;
pub mod labels;
pub mod poll;
pub mod scheduler;
pub mod sink;
pub mod status;
pub mod topology;

pub use client::{ApiClient, ApiError, ProxmoxClient};
pub use labels::{LabelError, LabelSet};
pub use poll::{run_poll_cycle, FanOut, PollContext};
pub use sink::{MetricObservation, MetricSink};
