/*!
Mock Proxmox API client

Serves canned `data` documents per path without a cluster. Unknown paths
answer HTTP 404. Every call is recorded for assertions.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use pvemon_agent::{ApiClient, ApiError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct MockApiClient {
    endpoint: String,
    responses: Arc<Mutex<HashMap<String, Result<Value, ApiError>>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockApiClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            responses: Arc::new(Mutex::new(HashMap::new())),
            delays: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer `path` with `data`
    pub fn respond(&self, path: impl Into<String>, data: Value) -> &Self {
        self.responses.lock().insert(path.into(), Ok(data));
        self
    }

    /// Fail `path` with `error`
    pub fn fail(&self, path: impl Into<String>, error: ApiError) -> &Self {
        self.responses.lock().insert(path.into(), Err(error));
        self
    }

    /// Fail `path` with a transport error
    pub fn fail_transport(&self, path: &str) -> &Self {
        self.fail(
            path,
            ApiError::Transport {
                path: path.to_string(),
                message: "connection refused".to_string(),
            },
        )
    }

    /// Delay every call whose path starts with `prefix`
    pub fn delay(&self, prefix: impl Into<String>, delay: Duration) -> &Self {
        self.delays.lock().insert(prefix.into(), delay);
        self
    }

    /// Document currently served for `path`, if any
    pub fn responses_for(&self, path: &str) -> Option<Value> {
        self.responses
            .lock()
            .get(path)
            .and_then(|r| r.as_ref().ok().cloned())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == path).count()
    }

    pub fn calls_containing(&self, fragment: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.contains(fragment)).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl ApiClient for MockApiClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn fetch(&self, path: &str) -> Result<Value, ApiError> {
        self.calls.lock().push(path.to_string());

        let delay = self
            .delays
            .lock()
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, d)| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.responses.lock().get(path).cloned();
        response.unwrap_or_else(|| {
            Err(ApiError::Status {
                path: path.to_string(),
                status: 404,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_serves_and_records() {
        let api = MockApiClient::new("pve1");
        api.respond("version", json!({"version": "8.2"}));

        let value = api.fetch("version").await.unwrap();
        assert_eq!(value["version"], "8.2");
        assert!(matches!(
            api.fetch("nodes").await,
            Err(ApiError::Status { status: 404, .. })
        ));
        assert_eq!(api.calls(), vec!["version", "nodes"]);
        assert_eq!(api.calls_to("version"), 1);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let api = MockApiClient::new("pve1");
        api.fail_transport("cluster/status");
        assert!(matches!(
            api.fetch("cluster/status").await,
            Err(ApiError::Transport { .. })
        ));
    }
}
