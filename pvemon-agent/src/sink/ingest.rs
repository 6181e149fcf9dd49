//! Telemetry ingest targets
//!
//! - `DynatraceIngest`: POST to `/api/v2/metrics/ingest` with an API token
//! - `FileIngest`: append lines to a local file (debugging, air-gapped sites)

use crate::config::TelemetryConfig;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const INGEST_PATH: &str = "/api/v2/metrics/ingest";
const INGEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("ingest rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no telemetry target configured")]
    NotConfigured,
}

/// What the backend answered; logged, never acted on
#[derive(Debug, Clone)]
pub struct IngestResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait IngestTarget: Send + Sync {
    fn describe(&self) -> String;
    async fn ingest(&self, lines: &[String]) -> Result<IngestResponse, IngestError>;
}

pub struct DynatraceIngest {
    http: reqwest::Client,
    url: String,
    token: String,
}

impl DynatraceIngest {
    pub fn new(base_url: &str, token: &str) -> Result<Self, IngestError> {
        let http = reqwest::Client::builder()
            .timeout(INGEST_TIMEOUT)
            .build()
            .map_err(|e| IngestError::Http(e.to_string()))?;
        Ok(Self {
            http,
            url: Self::ingest_url(base_url),
            token: token.to_string(),
        })
    }

    pub fn ingest_url(base_url: &str) -> String {
        let base = base_url.trim().trim_end_matches('/');
        if base.ends_with(INGEST_PATH) {
            base.to_string()
        } else {
            format!("{}{}", base, INGEST_PATH)
        }
    }
}

#[async_trait]
impl IngestTarget for DynatraceIngest {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn ingest(&self, lines: &[String]) -> Result<IngestResponse, IngestError> {
        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .header(reqwest::header::AUTHORIZATION, format!("Api-Token {}", self.token))
            .body(lines.join("\n"))
            .send()
            .await
            .map_err(|e| IngestError::Http(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(IngestError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(IngestResponse {
            status: status.as_u16(),
            body,
        })
    }
}

pub struct FileIngest {
    path: PathBuf,
}

impl FileIngest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl IngestTarget for FileIngest {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn ingest(&self, lines: &[String]) -> Result<IngestResponse, IngestError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let mut payload = lines.join("\n");
        payload.push('\n');
        file.write_all(payload.as_bytes()).await?;
        file.flush().await?;

        Ok(IngestResponse {
            status: 200,
            body: format!("{} lines appended", lines.len()),
        })
    }
}

/// Targets described by the telemetry section: Dynatrace when a URL is set,
/// file when a path is set, both when both are.
pub fn targets_from_config(
    config: &TelemetryConfig,
) -> Result<Vec<Arc<dyn IngestTarget>>, IngestError> {
    let mut targets: Vec<Arc<dyn IngestTarget>> = Vec::new();

    if let Some(url) = &config.url {
        let token = config.token.as_deref().unwrap_or_default();
        targets.push(Arc::new(DynatraceIngest::new(url, token)?));
    }
    if let Some(path) = &config.file {
        targets.push(Arc::new(FileIngest::new(path.clone())));
    }

    if targets.is_empty() {
        return Err(IngestError::NotConfigured);
    }
    Ok(targets)
}
