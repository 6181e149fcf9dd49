//! Storage capacity from `nodes/{node}/storage`
//!
//! Only backends reported with `active == 1` and `enabled == 1` are kept.

use super::{
    decode_entries, CollectError, CollectionTask, Emitter, TaskContext, TaskKind, TaskReport,
};
use crate::client::fetch_as;
use crate::client::schema::StorageEntry;
use crate::topology::NodeInfo;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

pub struct StorageTask;

#[async_trait]
impl CollectionTask for StorageTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Storage
    }

    async fn collect_node(
        &self,
        ctx: &TaskContext,
        node: &NodeInfo,
        report: &mut TaskReport,
    ) -> Result<(), CollectError> {
        let path = format!("nodes/{}/storage", node.name);
        let items: Vec<Value> = fetch_as(ctx.client.as_ref(), &path).await?;
        let entries: Vec<StorageEntry> =
            decode_entries(ctx, node, &path, items, "storage", report);
        let node_labels = node.labels(&ctx.labels, false)?;

        for entry in entries.iter().filter(|e| e.is_active_and_enabled()) {
            report.entities += 1;
            let labels = match node_labels.merge([
                ("nodestorage", entry.storage.clone()),
                ("nodestoragetype", entry.kind.clone()),
            ]) {
                Ok(l) => l,
                Err(e) => {
                    report.record_failure(ctx, &node.name, entry.storage.as_deref(), &CollectError::from(e));
                    continue;
                }
            };

            let mut emit = Emitter::new(ctx.sink.as_ref(), &labels);
            emit.gauge("node.storage.total", entry.total);
            emit.gauge("node.storage.used", entry.used);
            emit.gauge("node.storage.avail", entry.avail);
            report.observations += emit.emitted();

            debug!(
                "Reported storage {} on {}",
                entry.storage.as_deref().unwrap_or("?"),
                node.name
            );
        }
        Ok(())
    }
}
