//! HTTP client for the Proxmox VE REST API
//!
//! Authenticates with an API token (`PVEAPIToken=user!name=value`). The
//! session (a configured `reqwest::Client`) is built lazily on first use and
//! shared by every concurrent task; rebuilding it takes the write lock so only
//! one task re-authenticates at a time.

use super::{ApiClient, ApiError};
use crate::config::EndpointConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const DEFAULT_PORT: u16 = 8006;

/// Response envelope: every endpoint wraps its payload in `data`
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Clone)]
struct Session {
    http: reqwest::Client,
    established: DateTime<Utc>,
}

pub struct ProxmoxClient {
    config: EndpointConfig,
    base_url: String,
    session: RwLock<Option<Session>>,
}

impl ProxmoxClient {
    pub fn new(config: EndpointConfig) -> Self {
        let base_url = Self::base_url(&config.host);
        Self {
            config,
            base_url,
            session: RwLock::new(None),
        }
    }

    /// `host`, `host:port` or a full URL -> `https://host:port/api2/json/`
    pub fn base_url(host: &str) -> String {
        let host = host.trim().trim_end_matches('/');
        let has_port = if host.starts_with('[') {
            host.contains("]:")
        } else {
            host.matches(':').count() == 1
        };
        let origin = if host.contains("://") {
            host.to_string()
        } else if has_port {
            format!("https://{}", host)
        } else {
            format!("https://{}:{}", host, DEFAULT_PORT)
        };
        format!("{}/api2/json/", origin)
    }

    fn auth_header(&self) -> String {
        format!(
            "PVEAPIToken={}!{}={}",
            self.config.user, self.config.token_name, self.config.token_value
        )
    }

    fn establish(&self) -> Result<Session, ApiError> {
        info!("Building API session for {}", self.config.host);

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&self.auth_header()).map_err(|e| ApiError::Transport {
            path: String::new(),
            message: format!("invalid token header: {}", e),
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(self.config.request_timeout())
            .danger_accept_invalid_certs(!self.config.verify_ssl)
            .build()
            .map_err(|e| ApiError::Transport {
                path: String::new(),
                message: e.to_string(),
            })?;

        Ok(Session {
            http,
            established: Utc::now(),
        })
    }

    async fn session(&self) -> Result<Session, ApiError> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.clone());
        }

        let mut slot = self.session.write().await;
        // another task may have won the race for the write lock
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }
        let session = self.establish()?;
        *slot = Some(session.clone());
        Ok(session)
    }

    async fn invalidate(&self) {
        let mut slot = self.session.write().await;
        if let Some(old) = slot.take() {
            warn!(
                "Dropping API session for {} (established {})",
                self.config.host, old.established
            );
        }
    }

    /// Cheap authenticated call used by the `check` command.
    pub async fn version(&self) -> Result<Value, ApiError> {
        self.fetch("version").await
    }

    fn map_send_error(&self, path: &str, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout {
                path: path.to_string(),
                timeout: self.config.request_timeout(),
            }
        } else {
            ApiError::Transport {
                path: path.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl ApiClient for ProxmoxClient {
    fn endpoint(&self) -> &str {
        &self.config.host
    }

    async fn fetch(&self, path: &str) -> Result<Value, ApiError> {
        let session = self.session().await?;
        let url = format!("{}{}", self.base_url, path.trim_start_matches('/'));
        debug!("GET {}", url);

        let response = session
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_send_error(path, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.invalidate().await;
            return Err(ApiError::Auth {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_send_error(path, e))?;
        let envelope: Envelope = serde_json::from_slice(&body)
            .map_err(|e| ApiError::shape(path, format!("invalid JSON: {}", e)))?;

        envelope
            .data
            .ok_or_else(|| ApiError::shape(path, "missing `data` member"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(host: &str) -> EndpointConfig {
        EndpointConfig {
            host: host.to_string(),
            user: "root@pam".to_string(),
            token_name: "api".to_string(),
            token_value: "secret".to_string(),
            frequency: 1,
            verify_ssl: false,
            request_timeout_secs: 5,
        }
    }

    #[test]
    fn test_base_url_variants() {
        assert_eq!(
            ProxmoxClient::base_url("10.0.0.1"),
            "https://10.0.0.1:8006/api2/json/"
        );
        assert_eq!(
            ProxmoxClient::base_url("pve.lan:443"),
            "https://pve.lan:443/api2/json/"
        );
        assert_eq!(
            ProxmoxClient::base_url("https://pve.lan:8006/"),
            "https://pve.lan:8006/api2/json/"
        );
    }

    #[test]
    fn test_auth_header_format() {
        let client = ProxmoxClient::new(endpoint("10.0.0.1"));
        assert_eq!(client.auth_header(), "PVEAPIToken=root@pam!api=secret");
        assert_eq!(client.endpoint(), "10.0.0.1");
    }

    #[tokio::test]
    async fn test_session_is_reused() {
        let client = ProxmoxClient::new(endpoint("10.0.0.1"));
        let first = client.session().await.unwrap();
        let second = client.session().await.unwrap();
        assert_eq!(first.established, second.established);

        client.invalidate().await;
        assert!(client.session.read().await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let mut config = endpoint("127.0.0.1:1");
        config.request_timeout_secs = 2;
        let client = ProxmoxClient::new(config);
        let err = client.fetch("cluster/status").await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Transport { .. } | ApiError::Timeout { .. }
        ));
        assert_eq!(err.path(), "cluster/status");
    }
}
