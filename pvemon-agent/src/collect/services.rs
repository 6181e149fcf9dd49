//! PVE service state from `nodes/{node}/services`
//!
//! Every listed unit is reported, running or not.

use super::{
    decode_entries, CollectError, CollectionTask, Emitter, TaskContext, TaskKind, TaskReport,
};
use crate::client::fetch_as;
use crate::client::schema::ServiceEntry;
use crate::topology::NodeInfo;
use async_trait::async_trait;
use serde_json::Value;

pub struct ServicesTask;

#[async_trait]
impl CollectionTask for ServicesTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Services
    }

    async fn collect_node(
        &self,
        ctx: &TaskContext,
        node: &NodeInfo,
        report: &mut TaskReport,
    ) -> Result<(), CollectError> {
        let path = format!("nodes/{}/services", node.name);
        let items: Vec<Value> = fetch_as(ctx.client.as_ref(), &path).await?;
        let services: Vec<ServiceEntry> =
            decode_entries(ctx, node, &path, items, "service", report);
        let node_labels = node.labels(&ctx.labels, false)?;

        for svc in &services {
            report.entities += 1;
            let labels = match node_labels.merge([
                ("service", svc.service.clone()),
                ("service_name", svc.name.clone()),
            ]) {
                Ok(l) => l,
                Err(e) => {
                    report.record_failure(
                        ctx,
                        &node.name,
                        svc.service.as_deref(),
                        &CollectError::from(e),
                    );
                    continue;
                }
            };

            let mut emit = Emitter::new(ctx.sink.as_ref(), &labels);
            emit.flag("node.service.state", svc.is_running());
            emit.flag("node.service.activestate", svc.is_active());
            emit.flag("node.service.unitstate", svc.is_enabled());
            report.observations += emit.emitted();
        }
        Ok(())
    }
}
