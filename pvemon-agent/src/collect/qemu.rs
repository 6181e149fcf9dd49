//! QEMU virtual machines from `nodes/{node}/qemu`
//!
//! For each running VM:
//! 1. guest agent `network-get-interfaces` (best effort, IP label only)
//! 2. `status/current` (required, source of the 14 VM metrics)

use super::{
    decode_entries, running_only, CollectError, CollectionTask, Emitter, TaskContext, TaskKind,
    TaskReport,
};
use crate::client::fetch_as;
use crate::client::schema::{AgentInterfaces, GuestEntry, VmStatus};
use crate::labels::{label, LabelSet};
use crate::topology::NodeInfo;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

pub struct QemuTask;

impl QemuTask {
    /// IPv4 reported by the guest agent, `""` on any failure
    async fn guest_ip(&self, ctx: &TaskContext, node: &NodeInfo, vmid: &str) -> String {
        let path = format!("nodes/{}/qemu/{}/agent/network-get-interfaces", node.name, vmid);
        match fetch_as::<AgentInterfaces>(ctx.client.as_ref(), &path).await {
            Ok(ifaces) => ifaces.reported_ip(),
            Err(e) => {
                debug!("Could not retrieve IP for VM {} on {}: {}", vmid, node.name, e);
                String::new()
            }
        }
    }

    async fn collect_vm(
        &self,
        ctx: &TaskContext,
        node: &NodeInfo,
        node_labels: &LabelSet,
        guest: &GuestEntry,
        vmid: &str,
    ) -> Result<usize, CollectError> {
        let ip = self.guest_ip(ctx, node, vmid).await;
        let labels = node_labels.merge([
            ("vmname", guest.name.clone()),
            label("vmid", vmid),
            label("vmips", ip),
        ])?;

        let path = format!("nodes/{}/qemu/{}/status/current", node.name, vmid);
        let vm: VmStatus = fetch_as(ctx.client.as_ref(), &path).await?;

        let mut emit = Emitter::new(ctx.sink.as_ref(), &labels);
        emit.gauge("vm.memory.free", vm.freemem);
        emit.gauge("vm.balloon", vm.balloon);
        emit.flag("vm.qmp.status", vm.qmpstatus.as_deref() == Some("running"));
        emit.gauge("vm.network.netin", vm.netin);
        emit.gauge("vm.network.netout", vm.netout);
        emit.gauge("vm.disk.write", vm.diskwrite);
        emit.gauge("vm.disk.max", vm.maxdisk);
        emit.gauge("vm.disk.read", vm.diskread);
        emit.gauge("vm.memory.max", vm.maxmem);
        emit.gauge("vm.memory.mem", vm.mem);
        emit.gauge("vm.cpu.usable", vm.cpus);
        emit.percent("vm.cpu.usage", vm.cpu);
        emit.gauge("vm.uptime", vm.uptime);
        emit.flag("vm.status", vm.status.as_deref() == Some("running"));

        debug!("Reported VM {} on {} with {}", vmid, node.name, labels);
        Ok(emit.emitted())
    }
}

#[async_trait]
impl CollectionTask for QemuTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Qemu
    }

    async fn collect_node(
        &self,
        ctx: &TaskContext,
        node: &NodeInfo,
        report: &mut TaskReport,
    ) -> Result<(), CollectError> {
        let path = format!("nodes/{}/qemu", node.name);
        let items: Vec<Value> = fetch_as(ctx.client.as_ref(), &path).await?;
        let guests: Vec<GuestEntry> =
            decode_entries(ctx, node, &path, running_only(items), "vmid", report);
        let node_labels = node.labels(&ctx.labels, false)?;

        for guest in &guests {
            let Some(vmid) = guest.vmid.as_deref() else {
                warn!("Running VM without vmid on {}: {:?}", node.name, guest.name);
                continue;
            };
            report.entities += 1;

            match self.collect_vm(ctx, node, &node_labels, guest, vmid).await {
                Ok(n) => report.observations += n,
                Err(e) => report.record_failure(ctx, &node.name, Some(vmid), &e),
            }
        }
        Ok(())
    }
}
