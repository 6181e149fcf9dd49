//! Agent configuration
//!
//! Handles:
//! - Proxmox endpoints (host, API token, poll frequency)
//! - Telemetry target (Dynatrace ingest URL/token or local file)
//! - Worker pool size and optional status listener
//! - Environment overrides (`DT_API_URL`, `DT_API_TOKEN`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "PVEMON_CONFIG";
pub const DT_API_URL_ENV: &str = "DT_API_URL";
pub const DT_API_TOKEN_ENV: &str = "DT_API_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    /// Concurrent collection tasks across all endpoints
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Address for the `/health` status server, disabled when unset
    #[serde(default)]
    pub status_listen: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Dynatrace environment URL, e.g. `https://abc123.live.dynatrace.com`
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, skip_serializing)] // Never write tokens back to disk
    pub token: Option<String>,
    /// Append metric lines to this file instead of (or when no) URL is set
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_metric_prefix")]
    pub metric_prefix: String,
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub host: String,
    pub user: String,
    pub token_name: String,
    #[serde(skip_serializing)]
    pub token_value: String,
    /// Poll frequency in minutes
    #[serde(default = "default_frequency")]
    pub frequency: u64,
    #[serde(default)]
    pub verify_ssl: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_workers() -> usize {
    10
}

fn default_metric_prefix() -> String {
    "proxmox".to_string()
}

fn default_max_batch_bytes() -> usize {
    1_000_000
}

fn default_flush_interval_secs() -> u64 {
    10
}

fn default_frequency() -> u64 {
    1
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            status_listen: None,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            file: None,
            metric_prefix: default_metric_prefix(),
            max_batch_bytes: default_max_batch_bytes(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

impl fmt::Debug for TelemetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("file", &self.file)
            .field("metric_prefix", &self.metric_prefix)
            .field("max_batch_bytes", &self.max_batch_bytes)
            .field("flush_interval_secs", &self.flush_interval_secs)
            .finish()
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("token_name", &self.token_name)
            .field("token_value", &"***")
            .field("frequency", &self.frequency)
            .field("verify_ssl", &self.verify_ssl)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl EndpointConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.frequency.max(1) * 60)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl TelemetryConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }
}

impl AgentConfig {
    /// Load config from `path`, `$PVEMON_CONFIG` or the OS config directory.
    ///
    /// A missing file yields the default config; `validate` will then report
    /// that no endpoint is configured.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => match std::env::var(CONFIG_ENV) {
                Ok(p) => PathBuf::from(p),
                Err(_) => Self::config_file_path()?,
            },
        };

        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            Self::from_toml(&content)
                .with_context(|| format!("Invalid config in {}", config_path.display()))?
        } else {
            warn!("No config at {}, using defaults", config_path.display());
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

        path.push("pvemon");
        path.push("config.toml");
        Ok(path)
    }

    /// `DT_API_URL` / `DT_API_TOKEN` take precedence over the file.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(DT_API_URL_ENV) {
            if !url.trim().is_empty() {
                self.telemetry.url = Some(url);
            }
        }
        if let Ok(token) = std::env::var(DT_API_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.telemetry.token = Some(token);
            }
        }
    }

    /// Problems that prevent the agent from running. Empty when usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.endpoints.is_empty() {
            problems.push("no endpoints configured".to_string());
        }
        for (i, ep) in self.endpoints.iter().enumerate() {
            if ep.host.trim().is_empty() {
                problems.push(format!("endpoints[{i}]: host is empty"));
            }
            if ep.user.trim().is_empty() {
                problems.push(format!("endpoints[{i}]: user is empty"));
            }
            if ep.token_name.trim().is_empty() || ep.token_value.trim().is_empty() {
                problems.push(format!("endpoints[{i}]: API token name/value missing"));
            }
        }

        match (&self.telemetry.url, &self.telemetry.file) {
            (None, None) => problems.push("telemetry: neither url nor file configured".to_string()),
            (Some(_), _) if self.telemetry.token.is_none() => {
                problems.push("telemetry: url set without token".to_string())
            }
            _ => {}
        }
        if self.telemetry.max_batch_bytes == 0 {
            problems.push("telemetry: max_batch_bytes must be > 0".to_string());
        }
        if self.agent.max_workers == 0 {
            problems.push("agent: max_workers must be > 0".to_string());
        }

        problems
    }
}
