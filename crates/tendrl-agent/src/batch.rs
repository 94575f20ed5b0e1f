//! Adaptive batch sizing and flush cadence.
//!
//! A pure policy: given a metrics snapshot, compute how many messages the
//! egress worker should accumulate before flushing and how long the flush
//! timer should run. CPU and memory pressure shrink the batch; a queue above
//! half capacity pulls it back up so the backlog drains faster, and collapses
//! the flush interval toward its minimum.

use std::time::Duration;

use tendrl_host_metrics::SystemMetrics;

use crate::config::Config;

/// Controller output for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchParameters {
    /// Flush threshold, always within `[min_batch_size, max_batch_size]`.
    pub batch_size: usize,
    /// Flush timer period, always within `[min_batch_interval, max_batch_interval]`.
    pub flush_interval: Duration,
}

/// Pure function of metrics and configured bounds; evaluated on every ingress
/// event and on every timer tick.
#[derive(Debug, Clone)]
pub struct BatchController {
    min_batch_size: usize,
    max_batch_size: usize,
    min_interval: Duration,
    max_interval: Duration,
    target_cpu_percent: f64,
    target_mem_percent: f64,
}

impl BatchController {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            min_batch_size: config.min_batch_size,
            max_batch_size: config.max_batch_size,
            min_interval: config.min_batch_interval,
            max_interval: config.max_batch_interval,
            target_cpu_percent: config.target_cpu_percent,
            target_mem_percent: config.target_mem_percent,
        }
    }

    /// Computes the current parameters from a metrics snapshot.
    ///
    /// Weights: 0.4 CPU headroom, 0.4 memory headroom, 0.2 queue pressure —
    /// biased toward resource safety over throughput.
    #[must_use]
    pub fn parameters(&self, metrics: &SystemMetrics) -> BatchParameters {
        let cpu_factor = (1.0 - metrics.cpu_usage / self.target_cpu_percent).max(0.0);
        let mem_factor = (1.0 - metrics.memory_usage / self.target_mem_percent).max(0.0);
        // Queue above 50% load counts as full pressure.
        let queue_factor = (metrics.queue_load / 50.0).min(1.0);

        let resource_factor = 0.4 * cpu_factor + 0.4 * mem_factor + 0.2 * queue_factor;

        let batch_size = ((self.max_batch_size as f64 * resource_factor) as usize)
            .clamp(self.min_batch_size, self.max_batch_size);

        // A saturated queue collapses the interval to the minimum; an idle
        // queue relaxes it toward the maximum.
        let idle_share = (1.0 - metrics.queue_load / 100.0).clamp(0.0, 1.0);
        let flush_interval = self.max_interval.mul_f64(idle_share).max(self.min_interval);

        BatchParameters {
            batch_size,
            flush_interval,
        }
    }
}
