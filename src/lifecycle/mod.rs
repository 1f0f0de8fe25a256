//! Lifecycle Controller
//!
//! Process-wide running flag backed by a [`CancellationToken`]. Signal
//! handlers flip it; the poll loop reads it once per cycle boundary and the
//! scrape server stops accepting when it is cancelled.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::Result;

/// Shared running flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct LifecycleController {
    token: CancellationToken,
}

impl LifecycleController {
    /// A controller in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// True until [`shutdown`](Self::shutdown) is called or a signal arrives.
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Stop scheduling new cycles. Idempotent.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("Shutdown requested");
        }
        self.token.cancel();
    }

    /// Token cancelled on shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Resolves once shutdown has been requested.
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }

    /// Register SIGINT and SIGTERM; the first one received triggers shutdown.
    ///
    /// Registration is unconditional, whether or not a terminal is attached.
    /// Must be called from within a tokio runtime.
    pub fn install_signal_handlers(&self) -> Result<JoinHandle<()>> {
        #[cfg(unix)]
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        let controller = self.clone();
        Ok(tokio::spawn(async move {
            #[cfg(unix)]
            let name = tokio::select! {
                _ = interrupt() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            };
            #[cfg(not(unix))]
            let name = {
                interrupt().await;
                "SIGINT"
            };

            info!(signal = name, "Received shutdown signal");
            controller.shutdown();
        }))
    }
}

/// Wait for Ctrl-C. If the handler cannot be installed, never resolve.
async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for SIGINT: {}", e);
        std::future::pending::<()>().await;
    }
}
