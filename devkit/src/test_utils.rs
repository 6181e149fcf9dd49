/*!
Test harness for the poll pipeline

Wires a `MockApiClient` and a `RecordingSink` into the contexts the agent
expects, so a test only has to describe the API answers.
*/

use crate::fixtures;
use crate::mock_api::MockApiClient;
use crate::recording_sink::RecordingSink;
use pvemon_agent::collect::TaskContext;
use pvemon_agent::topology::{ClusterSnapshot, CLUSTER_STATUS_PATH, HA_STATUS_PATH};
use pvemon_agent::PollContext;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const ENDPOINT: &str = "10.0.0.1";

pub struct TestHarness {
    pub api: MockApiClient,
    pub sink: Arc<RecordingSink>,
    pub workers: Arc<Semaphore>,
}

impl TestHarness {
    pub fn new() -> Self {
        init_tracing();

        Self {
            api: MockApiClient::new(ENDPOINT),
            sink: Arc::new(RecordingSink::new()),
            workers: Arc::new(Semaphore::new(10)),
        }
    }

    /// Harness whose API describes a healthy cluster of `nodes` members with
    /// HA quorum and empty guest/storage/service lists
    pub fn with_cluster(name: &str, nodes: usize) -> Self {
        let harness = Self::new();
        harness
            .api
            .respond(CLUSTER_STATUS_PATH, fixtures::cluster_status(name, nodes))
            .respond(HA_STATUS_PATH, fixtures::ha_status(json!(1), "OK"));
        for i in 1..=nodes {
            harness.respond_node(&format!("pve{i}"));
        }
        harness
    }

    /// Baseline answers for every per-node path of `node`
    pub fn respond_node(&self, node: &str) -> &Self {
        self.api
            .respond(format!("nodes/{node}/status"), fixtures::node_status())
            .respond(format!("nodes/{node}/storage"), json!([]))
            .respond(format!("nodes/{node}/qemu"), json!([]))
            .respond(format!("nodes/{node}/lxc"), json!([]))
            .respond(format!("nodes/{node}/services"), json!([]));
        self
    }

    pub fn poll_context(&self) -> PollContext {
        PollContext::new(
            Arc::new(self.api.clone()),
            self.sink.clone(),
            self.workers.clone(),
        )
    }

    /// Task context built from the cluster status currently served
    pub fn task_context(&self) -> TaskContext {
        let status = self
            .api
            .responses_for(CLUSTER_STATUS_PATH)
            .unwrap_or_else(|| Value::Array(Vec::new()));
        let snapshot = ClusterSnapshot::from_value(status).expect("cluster status fixture");

        TaskContext {
            client: Arc::new(self.api.clone()),
            sink: self.sink.clone(),
            labels: snapshot.labels(),
            nodes: Arc::new(snapshot.nodes),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Route agent logs to the test writer; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_context_from_fixture() {
        let harness = TestHarness::with_cluster("lab", 3);
        let ctx = harness.task_context();

        assert_eq!(ctx.nodes.len(), 3);
        assert_eq!(ctx.labels.get("cluster"), Some("lab"));
        assert_eq!(ctx.labels.get("clusterid"), Some("cluster"));
    }
}
