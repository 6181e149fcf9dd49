//! Metric sink - observations toward the telemetry backend
//!
//! Collection tasks call `report` (synchronous, never fails); the scheduler
//! periodically calls `BatchingSink::flush`, which formats buffered
//! observations as Dynatrace lines, splits them into byte-capped batches and
//! hands each batch to every configured ingest target.

pub mod ingest;
pub mod line;

use crate::labels::LabelSet;
use chrono::{DateTime, Utc};
use ingest::IngestTarget;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info};

/// One gauge sample
#[derive(Debug, Clone, PartialEq)]
pub struct MetricObservation {
    /// Dot-separated name without the configured prefix, e.g. `node.cpu.usage`
    pub name: String,
    pub value: f64,
    pub labels: LabelSet,
    pub timestamp: DateTime<Utc>,
}

impl MetricObservation {
    pub fn new(name: impl Into<String>, value: f64, labels: LabelSet) -> Self {
        Self {
            name: name.into(),
            value,
            labels,
            timestamp: Utc::now(),
        }
    }
}

/// Destination for observations. No buffering or retry guarantees beyond
/// what the implementation documents.
pub trait MetricSink: Send + Sync {
    fn report(&self, observation: MetricObservation);
}

/// Result of one flush
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushSummary {
    pub lines: usize,
    pub batches: usize,
    pub failed_batches: usize,
}

/// In-memory buffer drained by `flush`
pub struct BatchingSink {
    prefix: String,
    max_batch_bytes: usize,
    buffer: Mutex<Vec<MetricObservation>>,
    targets: Vec<Arc<dyn IngestTarget>>,
}

impl BatchingSink {
    pub fn new(
        prefix: impl Into<String>,
        max_batch_bytes: usize,
        targets: Vec<Arc<dyn IngestTarget>>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            max_batch_bytes,
            buffer: Mutex::new(Vec::new()),
            targets,
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Drain the buffer and transmit. A failed batch is logged and dropped.
    pub async fn flush(&self) -> FlushSummary {
        let pending = std::mem::take(&mut *self.buffer.lock());
        if pending.is_empty() {
            return FlushSummary::default();
        }

        let lines: Vec<String> = pending
            .iter()
            .map(|obs| line::format_line(&self.prefix, obs))
            .collect();
        let batches = line::divide_into_batches(lines, self.max_batch_bytes);

        let mut summary = FlushSummary {
            lines: pending.len(),
            batches: batches.len(),
            failed_batches: 0,
        };

        for batch in &batches {
            debug!("Sending {} metric lines", batch.len());
            for target in &self.targets {
                match target.ingest(batch).await {
                    Ok(response) => {
                        info!(
                            "Ingested {} lines via {} (HTTP {}): {}",
                            batch.len(),
                            target.describe(),
                            response.status,
                            response.body
                        );
                    }
                    Err(e) => {
                        error!("Ingest via {} failed: {}", target.describe(), e);
                        summary.failed_batches += 1;
                    }
                }
            }
        }

        summary
    }
}

impl MetricSink for BatchingSink {
    fn report(&self, observation: MetricObservation) {
        self.buffer.lock().push(observation);
    }
}
