//! Lifecycle supervisor.
//!
//! Wires the components together and owns the shutdown sequence. Startup:
//! build the upstream client, (Windows) verify AF_UNIX support, create the
//! queue, bind the listener, start the egress worker, install signal
//! handlers, then run the accept loop. On SIGINT/SIGTERM the shared
//! cancellation token trips: the listener stops accepting, connection
//! handlers exit at their next read or enqueue, and the egress worker closes
//! the queue, drains it, and flushes one final batch before the agent
//! returns.

use std::sync::Arc;

use tendrl_host_metrics::HostMetricsProbe;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::egress::EgressWorker;
use crate::error::AgentError;
use crate::ingress::Dispatcher;
use crate::queue;
use crate::upstream::UpstreamClient;

pub struct Agent {
    config: Arc<Config>,
    shutdown: CancellationToken,
}

impl Agent {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that triggers graceful shutdown when cancelled; signal handlers
    /// cancel it, and so can embedders and tests.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs the agent until shutdown. A clean signal-initiated shutdown
    /// returns `Ok(())` after the final drain flush.
    pub async fn run(&self) -> Result<(), AgentError> {
        let upstream = Arc::new(UpstreamClient::new(&self.config)?);

        #[cfg(windows)]
        if !crate::platform::afunix::is_supported() {
            return Err(AgentError::AfUnixUnsupported);
        }

        let (queue_tx, queue_rx) = queue::channel(self.config.max_queue_size);

        #[cfg(unix)]
        let listener = crate::ingress::IngressListener::bind(&self.config.socket_path)?;
        #[cfg(windows)]
        let listener = crate::ingress::windows::bind(&self.config.socket_path)?;

        let worker = EgressWorker::new(
            &self.config,
            queue_rx,
            HostMetricsProbe::new(),
            Arc::clone(&upstream),
            self.shutdown.clone(),
        );
        let worker_handle = tokio::spawn(worker.run());

        self.install_signal_handler();

        let dispatcher = Dispatcher::new(queue_tx, upstream);

        #[cfg(unix)]
        listener.serve(dispatcher, self.shutdown.clone()).await;
        #[cfg(windows)]
        crate::ingress::windows::serve(
            listener,
            &self.config.socket_path,
            dispatcher,
            self.shutdown.clone(),
        )
        .await;

        info!("shutting down, waiting for the egress worker to drain");
        if let Err(e) = worker_handle.await {
            error!("egress worker task failed: {e}");
        }
        info!("shutdown complete");
        Ok(())
    }

    fn install_signal_handler(&self) {
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("shutdown signal received, shutting down gracefully");
            token.cancel();
        });
    }
}

/// Resolves when an interrupt or termination signal arrives.
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("failed to listen for interrupt: {e}");
                    }
                }
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            error!("failed to install SIGTERM handler: {e}");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for interrupt: {e}");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for interrupt: {e}");
    }
}
