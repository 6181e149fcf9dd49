use crate::config::AgentConfig;
use crate::poll::CycleSummary;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusValue {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub status: StatusValue,
    pub message: String,
}

impl Status {
    pub fn ok() -> Self {
        Self {
            status: StatusValue::Ok,
            message: String::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: StatusValue::Error,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusValue::Ok
    }
}

/// Can the agent run with this configuration?
pub fn fastcheck(config: &AgentConfig) -> Status {
    let problems = config.validate();
    if problems.is_empty() {
        Status::ok()
    } else {
        Status::error(problems.join("; "))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EndpointHealth {
    pub endpoint: String,
    pub cycles: u64,
    pub aborted_cycles: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_cycle_id: Option<String>,
    pub last_observations: usize,
    pub last_failures: usize,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AgentHealth {
    pub uptime_seconds: u64,
    pub check: Status,
    pub endpoints: Vec<EndpointHealth>,
}

/// Per-endpoint outcome of the latest cycles, shared with the status server
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    endpoints: Arc<Mutex<BTreeMap<String, EndpointHealth>>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            endpoints: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn register(&self, endpoint: &str) {
        self.endpoints
            .lock()
            .entry(endpoint.to_string())
            .or_insert_with(|| EndpointHealth {
                endpoint: endpoint.to_string(),
                ..Default::default()
            });
    }

    pub fn record_cycle(&self, endpoint: &str, summary: &CycleSummary) {
        let mut endpoints = self.endpoints.lock();
        let entry = endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| EndpointHealth {
                endpoint: endpoint.to_string(),
                ..Default::default()
            });
        entry.cycles += 1;
        entry.last_cycle_at = Some(Utc::now());
        entry.last_cycle_id = Some(summary.cycle_id.to_string());
        entry.last_observations = summary.observations();
        entry.last_failures = summary.failures();
        entry.last_error = None;
    }

    pub fn record_abort(&self, endpoint: &str, error: &str) {
        let mut endpoints = self.endpoints.lock();
        let entry = endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| EndpointHealth {
                endpoint: endpoint.to_string(),
                ..Default::default()
            });
        entry.cycles += 1;
        entry.aborted_cycles += 1;
        entry.last_cycle_at = Some(Utc::now());
        entry.last_cycle_id = None;
        entry.last_observations = 0;
        entry.last_failures = 0;
        entry.last_error = Some(error.to_string());
    }

    pub fn get_health(&self, check: &Status) -> AgentHealth {
        AgentHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            check: check.clone(),
            endpoints: self.endpoints.lock().values().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::{TaskKind, TaskReport};
    use uuid::Uuid;

    #[test]
    fn test_fastcheck_reports_problems() {
        let status = fastcheck(&AgentConfig::default());
        assert_eq!(status.status, StatusValue::Error);
        assert!(status.message.contains("no endpoints"));
    }

    #[test]
    fn test_tracker_records_cycles_and_aborts() {
        let tracker = HealthTracker::new();
        tracker.register("10.0.0.1");

        let mut report = TaskReport::new(TaskKind::Nodes);
        report.observations = 17;
        let summary = CycleSummary {
            cycle_id: Uuid::new_v4(),
            topology_observations: 4,
            tasks: vec![report],
            lost: vec![TaskKind::Qemu],
        };
        tracker.record_cycle("10.0.0.1", &summary);

        let health = tracker.get_health(&Status::ok());
        assert_eq!(health.endpoints.len(), 1);
        assert_eq!(health.endpoints[0].last_observations, 21);
        assert_eq!(health.endpoints[0].last_failures, 1);

        tracker.record_abort("10.0.0.1", "timed out");
        let health = tracker.get_health(&Status::ok());
        assert_eq!(health.endpoints[0].cycles, 2);
        assert_eq!(health.endpoints[0].aborted_cycles, 1);
        assert_eq!(health.endpoints[0].last_error.as_deref(), Some("timed out"));
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_value(Status::ok()).unwrap();
        assert_eq!(json["status"], "OK");
    }
}
