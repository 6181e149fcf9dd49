//! Drives poll cycles and sink flushes
//!
//! One interval loop per endpoint (period = endpoint frequency in minutes)
//! plus one flush loop. Cycles never wait for their collection tasks: the
//! fan-out is joined in the background only to log and track the outcome.

use crate::client::{ApiClient, ProxmoxClient};
use crate::config::AgentConfig;
use crate::health::HealthTracker;
use crate::poll::{run_poll_cycle, CycleSummary, PollContext};
use crate::sink::{BatchingSink, FlushSummary, MetricSink};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// `tokio::time::interval` rejects a zero period
const MIN_PERIOD: Duration = Duration::from_secs(1);

struct EndpointSchedule {
    ctx: PollContext,
    period: Duration,
}

pub struct Scheduler {
    endpoints: Vec<EndpointSchedule>,
    sink: Arc<BatchingSink>,
    workers: Arc<Semaphore>,
    flush_interval: Duration,
    tracker: HealthTracker,
}

impl Scheduler {
    pub fn new(
        sink: Arc<BatchingSink>,
        max_workers: usize,
        flush_interval: Duration,
        tracker: HealthTracker,
    ) -> Self {
        Self {
            endpoints: Vec::new(),
            sink,
            workers: Arc::new(Semaphore::new(max_workers.max(1))),
            flush_interval: flush_interval.max(MIN_PERIOD),
            tracker,
        }
    }

    /// One `ProxmoxClient` per configured endpoint, sharing one worker pool.
    pub fn from_config(config: &AgentConfig, sink: Arc<BatchingSink>, tracker: HealthTracker) -> Self {
        let mut scheduler = Self::new(
            sink,
            config.agent.max_workers,
            config.telemetry.flush_interval(),
            tracker,
        );
        for endpoint in &config.endpoints {
            let period = endpoint.poll_interval();
            scheduler.add_endpoint(Arc::new(ProxmoxClient::new(endpoint.clone())), period);
        }
        scheduler
    }

    pub fn add_endpoint(&mut self, client: Arc<dyn ApiClient>, period: Duration) {
        self.tracker.register(client.endpoint());
        let sink: Arc<dyn MetricSink> = self.sink.clone();
        self.endpoints.push(EndpointSchedule {
            ctx: PollContext::new(client, sink, self.workers.clone()),
            period: period.max(MIN_PERIOD),
        });
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Single pass: poll every endpoint, wait for all tasks, flush.
    /// Aborted cycles yield `None`.
    pub async fn run_once(&self) -> (Vec<Option<CycleSummary>>, FlushSummary) {
        let mut summaries = Vec::with_capacity(self.endpoints.len());

        for endpoint in &self.endpoints {
            let endpoint_name = endpoint.ctx.client.endpoint().to_string();
            let summary = match run_poll_cycle(&endpoint.ctx).await {
                Ok(fan_out) => {
                    let summary = fan_out.join().await;
                    log_summary(&endpoint_name, &summary);
                    self.tracker.record_cycle(&endpoint_name, &summary);
                    Some(summary)
                }
                Err(e) => {
                    self.tracker.record_abort(&endpoint_name, &e.to_string());
                    None
                }
            };
            summaries.push(summary);
        }

        let flushed = self.sink.flush().await;
        (summaries, flushed)
    }

    /// Run until `shutdown` resolves, then flush whatever is pending.
    pub async fn run_until<F>(self, shutdown: F) -> FlushSummary
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting scheduler: {} endpoints, flush every {:?}",
            self.endpoints.len(),
            self.flush_interval
        );

        let loops: Vec<JoinHandle<()>> = self
            .endpoints
            .into_iter()
            .map(|endpoint| tokio::spawn(endpoint_loop(endpoint, self.tracker.clone())))
            .collect();

        let mut flush_timer = interval(self.flush_interval);
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = flush_timer.tick() => {
                    let flushed = self.sink.flush().await;
                    if flushed.lines > 0 {
                        debug!("Flushed {} lines in {} batches", flushed.lines, flushed.batches);
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping poll loops");
                    break;
                }
            }
        }

        for handle in loops {
            handle.abort();
        }

        let flushed = self.sink.flush().await;
        info!("Final flush: {} lines in {} batches", flushed.lines, flushed.batches);
        flushed
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> FlushSummary {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

async fn endpoint_loop(endpoint: EndpointSchedule, tracker: HealthTracker) {
    let endpoint_name = endpoint.ctx.client.endpoint().to_string();
    info!("Polling {} every {:?}", endpoint_name, endpoint.period);

    let mut timer = interval(endpoint.period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        timer.tick().await;

        match run_poll_cycle(&endpoint.ctx).await {
            Ok(fan_out) => {
                let tracker = tracker.clone();
                let endpoint_name = endpoint_name.clone();
                tokio::spawn(async move {
                    let summary = fan_out.join().await;
                    log_summary(&endpoint_name, &summary);
                    tracker.record_cycle(&endpoint_name, &summary);
                });
            }
            Err(e) => tracker.record_abort(&endpoint_name, &e.to_string()),
        }
    }
}

fn log_summary(endpoint: &str, summary: &CycleSummary) {
    if summary.failures() > 0 {
        warn!(
            "Cycle {} on {} finished: {} metrics, {} failures",
            summary.cycle_id,
            endpoint,
            summary.observations(),
            summary.failures()
        );
    } else {
        info!(
            "Cycle {} on {} finished: {} metrics",
            summary.cycle_id,
            endpoint,
            summary.observations()
        );
    }
}
