//! Egress worker: drains the queue into adaptive batches.
//!
//! A single cooperative loop selects among three events: a message arriving
//! from the queue, the flush timer firing, and shutdown. Every arrival
//! re-samples host metrics, re-evaluates the batch controller, and resets the
//! flush timer to the computed interval; the batch is flushed when it reaches
//! the computed size or when the timer fires with messages buffered.
//!
//! On shutdown the worker closes the queue first, then drains everything
//! still buffered and issues one final batch POST, so a clean shutdown never
//! silently drops an enqueued message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tendrl_host_metrics::{HostMetricsProbe, SystemMetrics};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::batch::BatchController;
use crate::config::Config;
use crate::messages::Message;
use crate::queue::QueueReceiver;
use crate::upstream::UpstreamClient;

/// Source of host metrics for the worker.
///
/// The seam exists so tests can drive the controller with fixed readings;
/// production uses [`HostMetricsProbe`].
#[async_trait]
pub trait MetricsProbe: Send {
    /// Samples CPU and memory; `queue_load` is filled in by the worker.
    async fn sample(&mut self) -> SystemMetrics;
}

#[async_trait]
impl MetricsProbe for HostMetricsProbe {
    async fn sample(&mut self) -> SystemMetrics {
        HostMetricsProbe::sample(self).await
    }
}

/// The queue consumer. Owns the batch buffer; there is exactly one per agent.
pub struct EgressWorker<P> {
    queue: QueueReceiver,
    controller: BatchController,
    probe: P,
    upstream: Arc<UpstreamClient>,
    shutdown: CancellationToken,
    batch: Vec<Message>,
    initial_interval: Duration,
}

impl<P: MetricsProbe> EgressWorker<P> {
    pub fn new(
        config: &Config,
        queue: QueueReceiver,
        probe: P,
        upstream: Arc<UpstreamClient>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            controller: BatchController::new(config),
            probe,
            upstream,
            shutdown,
            batch: Vec::with_capacity(config.max_batch_size),
            initial_interval: config.flush_interval,
        }
    }

    /// Runs until shutdown is signalled (or every producer is gone), then
    /// drains and returns.
    pub async fn run(mut self) {
        let mut current_interval = self.initial_interval;
        let timer = tokio::time::sleep(current_interval);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                received = self.queue.recv() => {
                    let Some(message) = received else {
                        // Every sender is gone; nothing further can arrive.
                        debug!("queue disconnected, flushing remaining batch");
                        self.flush().await;
                        return;
                    };
                    self.batch.push(message);

                    let mut metrics = self.probe.sample().await;
                    metrics.queue_load = self.queue.load_percent();
                    let params = self.controller.parameters(&metrics);

                    current_interval = params.flush_interval;
                    timer.as_mut().reset(Instant::now() + current_interval);

                    if self.batch.len() >= params.batch_size {
                        self.flush().await;
                    }
                }
                () = &mut timer => {
                    if !self.batch.is_empty() {
                        self.flush().await;
                    }
                    timer.as_mut().reset(Instant::now() + current_interval);
                }
                () = self.shutdown.cancelled() => {
                    self.drain().await;
                    return;
                }
            }
        }
    }

    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        self.upstream.post_batch(&self.batch).await;
        self.batch.clear();
    }

    /// Terminal sequence: close the queue so no new offers land, receive
    /// whatever is still buffered (including offers that had already reserved
    /// a slot), then flush once.
    async fn drain(&mut self) {
        self.queue.close();
        while let Some(message) = self.queue.recv().await {
            self.batch.push(message);
        }
        info!("draining {} messages on shutdown", self.batch.len());
        self.flush().await;
    }
}
