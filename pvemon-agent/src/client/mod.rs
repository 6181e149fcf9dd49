//! Proxmox management API access
//!
//! `ApiClient` is the seam between the collection pipeline and the network:
//! one `fetch(path)` returning the parsed `data` member of the response.
//! `ProxmoxClient` is the HTTP implementation; tests use the devkit mock.

pub mod proxmox;
pub mod schema;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

pub use proxmox::ProxmoxClient;

/// Failure of a single API call
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("transport error on {path}: {message}")]
    Transport { path: String, message: String },
    #[error("authentication rejected on {path} (HTTP {status})")]
    Auth { path: String, status: u16 },
    #[error("HTTP {status} on {path}")]
    Status { path: String, status: u16 },
    #[error("timed out after {timeout:?} on {path}")]
    Timeout { path: String, timeout: Duration },
    #[error("unexpected response shape on {path}: {message}")]
    Shape { path: String, message: String },
}

impl ApiError {
    pub fn path(&self) -> &str {
        match self {
            ApiError::Transport { path, .. }
            | ApiError::Auth { path, .. }
            | ApiError::Status { path, .. }
            | ApiError::Timeout { path, .. }
            | ApiError::Shape { path, .. } => path,
        }
    }

    pub fn shape(path: &str, message: impl Into<String>) -> Self {
        ApiError::Shape {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// One authenticated connection to a cluster's management API
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Host identifying the cluster, used in logs and labels
    fn endpoint(&self) -> &str;

    /// GET `path` (relative to `/api2/json/`) and return the `data` document
    async fn fetch(&self, path: &str) -> Result<Value, ApiError>;
}

/// Decode an already fetched document into a typed response shape.
pub fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::shape(path, e.to_string()))
}

/// `fetch` followed by `decode`.
pub async fn fetch_as<T: DeserializeOwned>(
    client: &dyn ApiClient,
    path: &str,
) -> Result<T, ApiError> {
    let value = client.fetch(path).await?;
    decode(path, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_shape_error_carries_path() {
        let err = decode::<Vec<Value>>("cluster/status", json!({"not": "a list"})).unwrap_err();
        assert!(matches!(err, ApiError::Shape { .. }));
        assert_eq!(err.path(), "cluster/status");
    }

    #[test]
    fn test_decode_ok() {
        let items: Vec<Value> = decode("cluster/status", json!([{"type": "node"}])).unwrap();
        assert_eq!(items.len(), 1);
    }
}
