use pvemon_agent::collect::TaskKind;
use pvemon_agent::run_poll_cycle;
use pvemon_agent::topology::{CLUSTER_STATUS_PATH, HA_STATUS_PATH};
use pvemon_agent::ApiError;
use pvemon_devkit::fixtures;
use pvemon_devkit::TestHarness;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_full_cycle_reports_topology_and_tasks() {
    let harness = TestHarness::with_cluster("lab", 2);
    let ctx = harness.poll_context();

    let fan_out = run_poll_cycle(&ctx).await.unwrap();
    assert_eq!(fan_out.tasks().count(), 5);
    assert_eq!(fan_out.topology_observations, 6);

    let summary = fan_out.join().await;
    assert!(summary.lost.is_empty());
    assert_eq!(summary.failures(), 0);
    assert_eq!(summary.task(TaskKind::Nodes).unwrap().observations, 34);
    assert_eq!(summary.observations(), 40);
    assert_eq!(harness.sink.count(), 40);

    let count = harness.sink.named("cluster.node.count");
    assert_eq!(count.len(), 1);
    assert_eq!(count[0].value, 2.0);
    assert_eq!(count[0].labels.get("cluster"), Some("lab"));
    assert!(!count[0].labels.contains_key("node"));

    assert_eq!(harness.sink.named("cluster.node.online.count")[0].value, 2.0);
    assert_eq!(harness.sink.value_of("node.online", "node", "pve2"), Some(1.0));
    assert_eq!(harness.sink.named("cluster.ha.quorate")[0].value, 1.0);
    assert_eq!(harness.sink.named("cluster.ha.status")[0].value, 1.0);
}

#[tokio::test]
async fn test_cluster_status_not_a_list_aborts_cycle() {
    let harness = TestHarness::with_cluster("lab", 2);
    harness
        .api
        .respond(CLUSTER_STATUS_PATH, json!({"errors": "permission denied"}));

    let result = run_poll_cycle(&harness.poll_context()).await;

    assert!(matches!(result, Err(ApiError::Shape { .. })));
    assert_eq!(harness.sink.count(), 0);
    assert_eq!(harness.api.calls(), vec![CLUSTER_STATUS_PATH]);
}

#[tokio::test]
async fn test_cluster_status_failure_aborts_cycle() {
    let harness = TestHarness::with_cluster("lab", 2);
    harness.api.fail_transport(CLUSTER_STATUS_PATH);

    let result = run_poll_cycle(&harness.poll_context()).await;

    assert!(matches!(result, Err(ApiError::Transport { .. })));
    assert_eq!(harness.sink.count(), 0);
    assert_eq!(harness.api.calls_containing("nodes/"), 0);
}

#[tokio::test]
async fn test_online_count_is_strict() {
    let harness = TestHarness::with_cluster("lab", 0);
    harness.api.respond(
        CLUSTER_STATUS_PATH,
        json!([
            { "type": "cluster", "id": "cluster", "name": "lab", "nodes": 4 },
            fixtures::node_record("pve1", "10.0.0.1", json!(1)),
            fixtures::node_record("pve2", "10.0.0.2", json!("1")),
            fixtures::node_record("pve3", "10.0.0.3", json!(true)),
            fixtures::node_record("pve4", "10.0.0.4", json!(0)),
        ]),
    );
    for node in ["pve1", "pve2", "pve3", "pve4"] {
        harness.respond_node(node);
    }

    let fan_out = run_poll_cycle(&harness.poll_context()).await.unwrap();
    fan_out.join().await;

    assert_eq!(harness.sink.named("cluster.node.count")[0].value, 4.0);
    assert_eq!(harness.sink.named("cluster.node.online.count")[0].value, 1.0);
    assert_eq!(harness.sink.value_of("node.online", "node", "pve1"), Some(1.0));
    assert_eq!(harness.sink.value_of("node.online", "node", "pve2"), Some(0.0));
    assert_eq!(harness.sink.value_of("node.online", "node", "pve3"), Some(0.0));
}

#[tokio::test]
async fn test_missing_cluster_record_leaves_labels_empty() {
    let harness = TestHarness::with_cluster("lab", 0);
    harness.api.respond(
        CLUSTER_STATUS_PATH,
        json!([fixtures::node_record("pve1", "10.0.0.1", json!(1))]),
    );
    harness.respond_node("pve1");

    let fan_out = run_poll_cycle(&harness.poll_context()).await.unwrap();
    fan_out.join().await;

    assert!(harness.sink.named("cluster.node.count").is_empty());
    let online = harness.sink.named("cluster.node.online.count");
    assert_eq!(online[0].value, 1.0);
    assert!(online[0].labels.contains_key("cluster"));
    assert_eq!(online[0].labels.get("cluster"), None);
    assert_eq!(harness.sink.labelled("node", "pve1").len(), 18);
}

#[tokio::test]
async fn test_ha_status_not_ok() {
    let harness = TestHarness::with_cluster("lab", 1);
    harness
        .api
        .respond(HA_STATUS_PATH, fixtures::ha_status(json!(0), "no quorum"));

    run_poll_cycle(&harness.poll_context()).await.unwrap().join().await;

    assert_eq!(harness.sink.named("cluster.ha.quorate")[0].value, 0.0);
    assert_eq!(harness.sink.named("cluster.ha.status")[0].value, 0.0);
}

#[tokio::test]
async fn test_ha_without_quorum_record_skips_ha_metrics() {
    let harness = TestHarness::with_cluster("lab", 1);
    harness
        .api
        .respond(HA_STATUS_PATH, json!([{ "type": "master", "id": "master", "status": "idle" }]));

    let summary = run_poll_cycle(&harness.poll_context()).await.unwrap().join().await;

    assert!(harness.sink.named("cluster.ha.quorate").is_empty());
    assert!(harness.sink.named("cluster.ha.status").is_empty());
    assert_eq!(summary.task(TaskKind::Nodes).unwrap().observations, 17);
}

#[tokio::test]
async fn test_ha_failure_does_not_abort_cycle() {
    let harness = TestHarness::with_cluster("lab", 1);
    harness.api.fail_transport(HA_STATUS_PATH);

    let fan_out = run_poll_cycle(&harness.poll_context()).await.unwrap();
    assert_eq!(fan_out.topology_observations, 3);
    let summary = fan_out.join().await;

    assert!(harness.sink.named("cluster.ha.status").is_empty());
    assert_eq!(summary.task(TaskKind::Nodes).unwrap().observations, 17);
}

#[tokio::test]
async fn test_cycle_returns_before_tasks_finish() {
    let harness = TestHarness::with_cluster("lab", 1);
    harness.api.delay("nodes/", Duration::from_millis(200));

    let fan_out = run_poll_cycle(&harness.poll_context()).await.unwrap();

    assert!(harness.sink.named("node.uptime").is_empty());
    assert_eq!(harness.sink.count(), 5);

    fan_out.join().await;
    assert_eq!(harness.sink.named("node.uptime").len(), 1);
}

#[tokio::test]
async fn test_dropped_fan_out_still_completes() {
    let harness = TestHarness::with_cluster("lab", 1);
    harness.api.delay("nodes/", Duration::from_millis(20));

    drop(run_poll_cycle(&harness.poll_context()).await.unwrap());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(harness.sink.named("node.uptime").len(), 1);
}
