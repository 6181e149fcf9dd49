//! Node health from `nodes/{node}/status`

use super::{CollectError, CollectionTask, Emitter, TaskContext, TaskKind, TaskReport};
use crate::client::fetch_as;
use crate::client::schema::NodeStatus;
use crate::topology::NodeInfo;
use async_trait::async_trait;
use tracing::debug;

pub struct NodesTask;

#[async_trait]
impl CollectionTask for NodesTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Nodes
    }

    async fn collect_node(
        &self,
        ctx: &TaskContext,
        node: &NodeInfo,
        report: &mut TaskReport,
    ) -> Result<(), CollectError> {
        let path = format!("nodes/{}/status", node.name);
        let status: NodeStatus = fetch_as(ctx.client.as_ref(), &path).await?;
        let labels = node.labels(&ctx.labels, true)?;

        if let Some(cpu) = &status.cpuinfo {
            debug!(
                "Node {} has {:?} cores on {:?} sockets",
                node.name, cpu.cores, cpu.sockets
            );
        }

        let swap = status.swap.clone().unwrap_or_default();
        let rootfs = status.rootfs.clone().unwrap_or_default();
        let memory = status.memory.clone().unwrap_or_default();

        let mut emit = Emitter::new(ctx.sink.as_ref(), &labels);
        emit.gauge("node.swap.free", swap.free);
        emit.gauge("node.swap.total", swap.total);
        emit.gauge("node.swap.used", swap.used);
        emit.gauge("node.rootfs.avail", rootfs.avail);
        emit.gauge("node.rootfs.used", rootfs.used);
        emit.gauge("node.rootfs.free", rootfs.free);
        emit.gauge("node.rootfs.total", rootfs.total);
        emit.percent("node.cpu.usage", status.cpu);
        emit.percent("node.cpu.wait", status.wait);
        emit.percent("node.cpu.idle", status.idle);
        emit.gauge("node.uptime", status.uptime);
        emit.gauge("node.memory.free", memory.free);
        emit.gauge("node.memory.total", memory.total);
        emit.gauge("node.memory.used", memory.used);
        emit.gauge("node.loadavg.1min", status.load(0));
        emit.gauge("node.loadavg.5min", status.load(1));
        emit.gauge("node.loadavg.15min", status.load(2));

        report.observations += emit.emitted();
        debug!("Reported {} node metrics for {} with {}", emit.emitted(), node.name, labels);
        Ok(())
    }
}
