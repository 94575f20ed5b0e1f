//! Host CPU and memory sampling for the tendrl agent.
//!
//! The probe reports system-wide CPU utilisation (averaged over a short
//! sampling window) and used physical memory, both as percentages. It is the
//! input half of the agent's adaptive batching: the egress worker samples the
//! host on every ingress event and feeds the result to the batch controller.
//!
//! Sampling is best-effort. A source that cannot be read reports `0.0` for
//! its field and sampling continues; the probe never fails.

use std::time::Duration;

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::debug;

/// CPU utilisation is averaged over this window on every sample.
///
/// Two refreshes separated by the window are required for a meaningful
/// system-wide percentage; a single refresh reports usage since boot.
pub const CPU_SAMPLE_WINDOW: Duration = Duration::from_millis(100);

/// A point-in-time view of host load, all fields in `[0, 100]`.
///
/// `queue_load` is not known to the probe; the caller that owns the message
/// queue fills it in before handing the metrics to the batch controller.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemMetrics {
    /// System-wide CPU utilisation percentage.
    pub cpu_usage: f64,
    /// Used physical memory as a percentage of total.
    pub memory_usage: f64,
    /// Current queue depth as a percentage of queue capacity.
    pub queue_load: f64,
}

/// Samples host CPU and memory through `sysinfo`.
///
/// The probe keeps a [`System`] handle between samples so consecutive CPU
/// refreshes can be diffed. It has no other state and no side effects.
pub struct HostMetricsProbe {
    sys: System,
}

impl HostMetricsProbe {
    #[must_use]
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self { sys }
    }

    /// Samples CPU and memory, leaving `queue_load` at `0.0` for the caller.
    ///
    /// Takes roughly [`CPU_SAMPLE_WINDOW`] to complete: the CPU percentage is
    /// computed from two refreshes separated by the window.
    pub async fn sample(&mut self) -> SystemMetrics {
        self.sys.refresh_cpu_usage();
        tokio::time::sleep(CPU_SAMPLE_WINDOW).await;
        self.sys.refresh_cpu_usage();

        let cpus = self.sys.cpus();
        let cpu_usage = if cpus.is_empty() {
            debug!("no CPUs visible to sysinfo, reporting 0");
            0.0
        } else {
            f64::from(self.sys.global_cpu_info().cpu_usage())
        };

        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        let memory_usage = if total == 0 {
            debug!("total memory reported as 0, reporting 0");
            0.0
        } else {
            self.sys.used_memory() as f64 / total as f64 * 100.0
        };

        SystemMetrics {
            cpu_usage,
            memory_usage,
            queue_load: 0.0,
        }
    }
}

impl Default for HostMetricsProbe {
    fn default() -> Self {
        Self::new()
    }
}
