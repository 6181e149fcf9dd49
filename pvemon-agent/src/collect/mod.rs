//! Collection tasks
//!
//! Five independent branches run per poll cycle:
//! - `nodes`    : node status (CPU, memory, swap, rootfs, load)
//! - `storage`  : active and enabled storage backends
//! - `qemu`     : running VMs, with guest agent IP lookup
//! - `lxc`      : running containers
//! - `services` : systemd unit state of every PVE service
//!
//! Every task walks the node list sequentially. A failure on one node (or on
//! one VM/container inside a node) is logged and recorded in the task report;
//! the task then moves on to the next unit.

pub mod lxc;
pub mod nodes;
pub mod qemu;
pub mod services;
pub mod storage;

use crate::client::{decode, ApiClient, ApiError};
use crate::labels::{LabelError, LabelSet};
use crate::sink::{MetricObservation, MetricSink};
use crate::topology::NodeInfo;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Nodes,
    Storage,
    Qemu,
    Lxc,
    Services,
}

impl TaskKind {
    pub const ALL: [TaskKind; 5] = [
        TaskKind::Nodes,
        TaskKind::Storage,
        TaskKind::Qemu,
        TaskKind::Lxc,
        TaskKind::Services,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Nodes => "nodes",
            TaskKind::Storage => "storage",
            TaskKind::Qemu => "qemu",
            TaskKind::Lxc => "lxc",
            TaskKind::Services => "services",
        }
    }

    pub fn task(&self) -> Box<dyn CollectionTask> {
        match self {
            TaskKind::Nodes => Box::new(nodes::NodesTask),
            TaskKind::Storage => Box::new(storage::StorageTask),
            TaskKind::Qemu => Box::new(qemu::QemuTask),
            TaskKind::Lxc => Box::new(lxc::LxcTask),
            TaskKind::Services => Box::new(services::ServicesTask),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one node or entity; contained inside the task
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Labels(#[from] LabelError),
}

/// Everything a task needs, shared by the five tasks of one cycle
#[derive(Clone)]
pub struct TaskContext {
    pub client: Arc<dyn ApiClient>,
    pub sink: Arc<dyn MetricSink>,
    pub nodes: Arc<Vec<NodeInfo>>,
    pub labels: LabelSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub node: String,
    pub entity: Option<String>,
    pub error: String,
}

/// Outcome of one task run
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub kind: TaskKind,
    pub nodes: usize,
    pub entities: usize,
    pub observations: usize,
    pub failures: Vec<Failure>,
}

impl TaskReport {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            nodes: 0,
            entities: 0,
            observations: 0,
            failures: Vec::new(),
        }
    }

    pub fn record_failure(
        &mut self,
        ctx: &TaskContext,
        node: &str,
        entity: Option<&str>,
        err: &CollectError,
    ) {
        error!(
            endpoint = %ctx.client.endpoint(),
            node = %node,
            entity = entity.unwrap_or("-"),
            task = %self.kind,
            "Collection failed: {}",
            err
        );
        self.failures.push(Failure {
            node: node.to_string(),
            entity: entity.map(str::to_string),
            error: err.to_string(),
        });
    }
}

/// One branch of the fan-out. `collect_node` handles a single node; entity
/// level isolation inside a node is the task's own business.
#[async_trait]
pub trait CollectionTask: Send + Sync {
    fn kind(&self) -> TaskKind;

    async fn collect_node(
        &self,
        ctx: &TaskContext,
        node: &NodeInfo,
        report: &mut TaskReport,
    ) -> Result<(), CollectError>;
}

/// Decode list items one at a time. An undecodable item is recorded as a
/// failure of that entity (named by its `id_key` field) and skipped.
pub fn decode_entries<T: DeserializeOwned>(
    ctx: &TaskContext,
    node: &NodeInfo,
    path: &str,
    items: Vec<Value>,
    id_key: &str,
    report: &mut TaskReport,
) -> Vec<T> {
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let entity = raw_id(&item, id_key);
        match decode::<T>(path, item) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                report.record_failure(ctx, &node.name, entity.as_deref(), &CollectError::from(e))
            }
        }
    }
    entries
}

/// String or numeric field of an undecoded item
fn raw_id(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Guest list items whose raw `status` is `running`; others are never decoded
pub fn running_only(items: Vec<Value>) -> Vec<Value> {
    items
        .into_iter()
        .filter(|item| item.get("status").and_then(Value::as_str) == Some("running"))
        .collect()
}

/// Drive `task` over every node, isolating per-node failures.
pub async fn run_task(task: &dyn CollectionTask, ctx: &TaskContext) -> TaskReport {
    let mut report = TaskReport::new(task.kind());

    for node in ctx.nodes.iter() {
        report.nodes += 1;
        if let Err(e) = task.collect_node(ctx, node, &mut report).await {
            report.record_failure(ctx, &node.name, None, &e);
        }
    }

    debug!(
        task = %report.kind,
        "Task finished: {} nodes, {} entities, {} observations, {} failures",
        report.nodes,
        report.entities,
        report.observations,
        report.failures.len()
    );
    report
}

/// Reports gauges under one label set, skipping absent values
pub struct Emitter<'a> {
    sink: &'a dyn MetricSink,
    labels: &'a LabelSet,
    emitted: usize,
}

impl<'a> Emitter<'a> {
    pub fn new(sink: &'a dyn MetricSink, labels: &'a LabelSet) -> Self {
        Self {
            sink,
            labels,
            emitted: 0,
        }
    }

    pub fn gauge(&mut self, name: &str, value: Option<f64>) {
        match value {
            Some(v) if v.is_finite() => {
                self.sink
                    .report(MetricObservation::new(name, v, self.labels.clone()));
                self.emitted += 1;
            }
            _ => debug!("{} absent, skipped", name),
        }
    }

    /// Fraction reported as a percentage
    pub fn percent(&mut self, name: &str, fraction: Option<f64>) {
        self.gauge(name, fraction.map(|f| f * 100.0));
    }

    pub fn flag(&mut self, name: &str, value: bool) {
        self.gauge(name, Some(if value { 1.0 } else { 0.0 }));
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }
}
