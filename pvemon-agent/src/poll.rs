//! Poll orchestrator - one invocation per endpoint per tick
//!
//! 1. `cluster/status` -> topology (abort the cycle if unusable)
//! 2. cluster node counts + per-node online flag
//! 3. `cluster/ha/status/current` -> quorum metrics (skipped on failure)
//! 4. spawn the five collection tasks and return without waiting
//!
//! The returned `FanOut` holds one join handle per task. Dropping it detaches
//! the tasks; `join` waits for all of them.

use crate::client::{ApiClient, ApiError};
use crate::collect::{run_task, Emitter, TaskContext, TaskKind, TaskReport};
use crate::sink::MetricSink;
use crate::topology::{self, ClusterSnapshot};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Long-lived per-endpoint state handed to every cycle
#[derive(Clone)]
pub struct PollContext {
    pub client: Arc<dyn ApiClient>,
    pub sink: Arc<dyn MetricSink>,
    /// Shared worker budget: one permit per running collection task
    pub workers: Arc<Semaphore>,
}

impl PollContext {
    pub fn new(
        client: Arc<dyn ApiClient>,
        sink: Arc<dyn MetricSink>,
        workers: Arc<Semaphore>,
    ) -> Self {
        Self {
            client,
            sink,
            workers,
        }
    }
}

/// Handles of the tasks dispatched by one cycle
pub struct FanOut {
    pub cycle_id: Uuid,
    pub topology_observations: usize,
    handles: Vec<(TaskKind, JoinHandle<TaskReport>)>,
}

/// Completed cycle, available after `FanOut::join`
#[derive(Debug, Clone)]
pub struct CycleSummary {
    pub cycle_id: Uuid,
    pub topology_observations: usize,
    pub tasks: Vec<TaskReport>,
    /// Tasks that panicked or were cancelled
    pub lost: Vec<TaskKind>,
}

impl CycleSummary {
    pub fn observations(&self) -> usize {
        self.topology_observations + self.tasks.iter().map(|t| t.observations).sum::<usize>()
    }

    pub fn failures(&self) -> usize {
        self.tasks.iter().map(|t| t.failures.len()).sum::<usize>() + self.lost.len()
    }

    pub fn task(&self, kind: TaskKind) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.kind == kind)
    }
}

impl FanOut {
    pub fn tasks(&self) -> impl Iterator<Item = TaskKind> + '_ {
        self.handles.iter().map(|(kind, _)| *kind)
    }

    pub async fn join(self) -> CycleSummary {
        let (kinds, handles): (Vec<TaskKind>, Vec<_>) = self.handles.into_iter().unzip();
        let results = join_all(handles).await;

        let mut tasks = Vec::with_capacity(kinds.len());
        let mut lost = Vec::new();

        for (kind, result) in kinds.into_iter().zip(results) {
            match result {
                Ok(report) => tasks.push(report),
                Err(e) => {
                    error!("Collection task {} did not complete: {}", kind, e);
                    lost.push(kind);
                }
            }
        }

        CycleSummary {
            cycle_id: self.cycle_id,
            topology_observations: self.topology_observations,
            tasks,
            lost,
        }
    }
}

/// Run one poll cycle. `Err` means the topology could not be resolved and
/// nothing was reported or dispatched.
pub async fn run_poll_cycle(ctx: &PollContext) -> Result<FanOut, ApiError> {
    let cycle_id = Uuid::new_v4();
    let span = info_span!("poll", endpoint = %ctx.client.endpoint(), cycle = %cycle_id);

    async move {
        let snapshot = resolve_topology(ctx).await?;
        let cluster_labels = snapshot.labels();
        let mut topology_observations = 0;

        {
            let mut emit = Emitter::new(ctx.sink.as_ref(), &cluster_labels);
            emit.gauge("cluster.node.count", snapshot.declared_node_count());
            emit.gauge("cluster.node.online.count", Some(snapshot.online_count() as f64));
            topology_observations += emit.emitted();
        }

        for node in &snapshot.nodes {
            match node.labels(&cluster_labels, true) {
                Ok(labels) => {
                    let mut emit = Emitter::new(ctx.sink.as_ref(), &labels);
                    emit.flag("node.online", node.is_online());
                    topology_observations += emit.emitted();
                }
                Err(e) => error!("Cannot label node {}: {}", node.name, e),
            }
        }

        info!(
            "Sent cluster metrics for {} with {}",
            cluster_labels.get("cluster").unwrap_or("<unnamed>"),
            cluster_labels
        );

        topology_observations += report_ha_status(ctx, &cluster_labels).await;

        let task_ctx = TaskContext {
            client: ctx.client.clone(),
            sink: ctx.sink.clone(),
            nodes: Arc::new(snapshot.nodes),
            labels: cluster_labels,
        };

        let handles = TaskKind::ALL
            .iter()
            .map(|kind| (*kind, spawn_task(*kind, task_ctx.clone(), ctx.workers.clone())))
            .collect();

        Ok(FanOut {
            cycle_id,
            topology_observations,
            handles,
        })
    }
    .instrument(span)
    .await
}

async fn resolve_topology(ctx: &PollContext) -> Result<ClusterSnapshot, ApiError> {
    let value = ctx
        .client
        .fetch(topology::CLUSTER_STATUS_PATH)
        .await
        .map_err(|e| {
            error!("Cluster status unavailable, cycle aborted: {}", e);
            e
        })?;

    let snapshot = ClusterSnapshot::from_value(value).map_err(|e| {
        error!("Cluster status is not a list, cycle aborted: {}", e);
        e
    })?;

    info!(
        "Collected cluster status: {} node records, {} online",
        snapshot.nodes.len(),
        snapshot.online_count()
    );
    Ok(snapshot)
}

/// Quorum metrics; any failure only skips this group. Returns metrics emitted.
async fn report_ha_status(ctx: &PollContext, labels: &crate::labels::LabelSet) -> usize {
    let quorum = match ctx.client.fetch(topology::HA_STATUS_PATH).await {
        Ok(value) => topology::parse_ha_status(value),
        Err(e) => Err(e),
    };

    match quorum {
        Ok(Some(q)) => {
            let mut emit = Emitter::new(ctx.sink.as_ref(), labels);
            emit.gauge("cluster.ha.quorate", q.quorate);
            emit.gauge("cluster.ha.status", Some(q.status_value()));
            emit.emitted()
        }
        Ok(None) => {
            info!("No quorum record in HA status, HA metrics skipped");
            0
        }
        Err(e) => {
            warn!("HA status unavailable, HA metrics skipped: {}", e);
            0
        }
    }
}

fn spawn_task(
    kind: TaskKind,
    ctx: TaskContext,
    workers: Arc<Semaphore>,
) -> JoinHandle<TaskReport> {
    let span = info_span!("task", kind = %kind);
    tokio::spawn(
        async move {
            // held until the task finishes
            let _permit = workers.acquire_owned().await.ok();
            let task = kind.task();
            run_task(task.as_ref(), &ctx).await
        }
        .instrument(span),
    )
}
