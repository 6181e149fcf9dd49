//! LXC containers from `nodes/{node}/lxc`

use super::{
    decode_entries, running_only, CollectError, CollectionTask, Emitter, TaskContext, TaskKind,
    TaskReport,
};
use crate::client::fetch_as;
use crate::client::schema::{GuestEntry, LxcStatus};
use crate::labels::{label, LabelSet};
use crate::topology::NodeInfo;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

pub struct LxcTask;

impl LxcTask {
    async fn collect_container(
        &self,
        ctx: &TaskContext,
        node: &NodeInfo,
        node_labels: &LabelSet,
        guest: &GuestEntry,
        vmid: &str,
    ) -> Result<usize, CollectError> {
        let labels = node_labels.merge([
            ("lxcname", guest.name.clone()),
            label("lxcid", vmid),
            label("lxctype", "lxc"),
        ])?;

        let path = format!("nodes/{}/lxc/{}/status/current", node.name, vmid);
        let ct: LxcStatus = fetch_as(ctx.client.as_ref(), &path).await?;

        let mut emit = Emitter::new(ctx.sink.as_ref(), &labels);
        emit.gauge("lxc.network.netout", ct.netout);
        emit.gauge("lxc.uptime", ct.uptime);
        emit.gauge("lxc.swap.max", ct.maxswap);
        emit.gauge("lxc.disk.write", ct.diskwrite);
        emit.gauge("lxc.network.netin", ct.netin);
        emit.gauge("lxc.disk.read", ct.diskread);
        emit.gauge("lxc.memory.mem", ct.mem);
        emit.percent("lxc.cpu.usage", ct.cpu);
        emit.gauge("lxc.cpu.usable", ct.cpus);
        emit.gauge("lxc.memory.max", ct.maxmem);
        emit.flag("lxc.status", ct.status.as_deref() == Some("running"));
        emit.gauge("lxc.disk.usage", ct.disk);
        emit.gauge("lxc.swap.usage", ct.swap);
        emit.gauge("lxc.disk.max", ct.maxdisk);

        debug!("Reported container {} on {} with {}", vmid, node.name, labels);
        Ok(emit.emitted())
    }
}

#[async_trait]
impl CollectionTask for LxcTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Lxc
    }

    async fn collect_node(
        &self,
        ctx: &TaskContext,
        node: &NodeInfo,
        report: &mut TaskReport,
    ) -> Result<(), CollectError> {
        let path = format!("nodes/{}/lxc", node.name);
        let items: Vec<Value> = fetch_as(ctx.client.as_ref(), &path).await?;
        let guests: Vec<GuestEntry> =
            decode_entries(ctx, node, &path, running_only(items), "vmid", report);
        let node_labels = node.labels(&ctx.labels, false)?;

        for guest in &guests {
            let Some(vmid) = guest.vmid.as_deref() else {
                warn!("Running container without vmid on {}: {:?}", node.name, guest.name);
                continue;
            };
            report.entities += 1;

            match self
                .collect_container(ctx, node, &node_labels, guest, vmid)
                .await
            {
                Ok(n) => report.observations += n,
                Err(e) => report.record_failure(ctx, &node.name, Some(vmid), &e),
            }
        }
        Ok(())
    }
}
