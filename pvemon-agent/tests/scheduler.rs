use pvemon_agent::health::{HealthTracker, Status};
use pvemon_agent::scheduler::Scheduler;
use pvemon_agent::sink::ingest::{FileIngest, IngestTarget};
use pvemon_agent::sink::BatchingSink;
use pvemon_agent::topology::CLUSTER_STATUS_PATH;
use pvemon_devkit::TestHarness;
use std::sync::Arc;
use std::time::Duration;

fn file_sink(path: &std::path::Path) -> Arc<BatchingSink> {
    let target: Arc<dyn IngestTarget> = Arc::new(FileIngest::new(path));
    Arc::new(BatchingSink::new("proxmox", 1_000_000, vec![target]))
}

#[tokio::test]
async fn test_run_once_writes_line_protocol() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.txt");
    let harness = TestHarness::with_cluster("lab", 2);
    let tracker = HealthTracker::new();

    let mut scheduler = Scheduler::new(file_sink(&path), 4, Duration::from_secs(10), tracker.clone());
    scheduler.add_endpoint(Arc::new(harness.api.clone()), Duration::from_secs(60));

    let (summaries, flushed) = scheduler.run_once().await;

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].as_ref().unwrap().observations(), 40);
    assert_eq!(flushed.lines, 40);
    assert_eq!(flushed.failed_batches, 0);

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 40);
    assert!(content
        .lines()
        .any(|l| l.starts_with("proxmox.cluster.node.count,cluster=\"lab\",clusterid=\"cluster\" gauge,2 ")));

    let health = tracker.get_health(&Status::ok());
    assert_eq!(health.endpoints[0].cycles, 1);
    assert_eq!(health.endpoints[0].last_observations, 40);
}

#[tokio::test]
async fn test_run_once_records_aborted_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let harness = TestHarness::with_cluster("lab", 1);
    harness.api.fail_transport(CLUSTER_STATUS_PATH);
    let tracker = HealthTracker::new();

    let mut scheduler = Scheduler::new(
        file_sink(&dir.path().join("metrics.txt")),
        4,
        Duration::from_secs(10),
        tracker.clone(),
    );
    scheduler.add_endpoint(Arc::new(harness.api.clone()), Duration::from_secs(60));

    let (summaries, flushed) = scheduler.run_once().await;

    assert!(summaries[0].is_none());
    assert_eq!(flushed.lines, 0);
    let health = tracker.get_health(&Status::ok());
    assert_eq!(health.endpoints[0].aborted_cycles, 1);
    assert!(health.endpoints[0].last_error.is_some());
}

#[tokio::test]
async fn test_run_until_flushes_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.txt");
    let harness = TestHarness::with_cluster("lab", 1);

    let mut scheduler = Scheduler::new(
        file_sink(&path),
        4,
        Duration::from_secs(3600),
        HealthTracker::new(),
    );
    scheduler.add_endpoint(Arc::new(harness.api.clone()), Duration::from_secs(60));
    assert_eq!(scheduler.endpoint_count(), 1);

    scheduler
        .run_until(tokio::time::sleep(Duration::from_millis(300)))
        .await;

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.lines().any(|l| l.starts_with("proxmox.node.uptime,")));
    assert_eq!(harness.api.calls_to(CLUSTER_STATUS_PATH), 1);
}

#[tokio::test]
async fn test_zero_periods_are_clamped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.txt");
    let harness = TestHarness::with_cluster("lab", 1);

    let mut scheduler = Scheduler::new(file_sink(&path), 0, Duration::ZERO, HealthTracker::new());
    scheduler.add_endpoint(Arc::new(harness.api.clone()), Duration::ZERO);

    let flushed = scheduler
        .run_until(tokio::time::sleep(Duration::from_millis(300)))
        .await;

    assert_eq!(flushed.failed_batches, 0);
    assert_eq!(harness.api.calls_to(CLUSTER_STATUS_PATH), 1);
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.lines().any(|l| l.starts_with("proxmox.node.uptime,")));
}
