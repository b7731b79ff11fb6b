use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Turns SIGINT/SIGTERM into cancellation of the poll loop
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token handed to the scheduler; cancelled on the first signal
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a task that waits for a shutdown signal and cancels the token
    pub fn install_signal_handlers(&self) -> Result<()> {
        let token = self.token.clone();
        #[cfg(unix)]
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        tokio::spawn(async move {
            #[cfg(unix)]
            let sigterm = terminate.recv();
            #[cfg(not(unix))]
            let sigterm = std::future::pending::<Option<()>>();

            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received SIGINT, finishing current cycle"),
                _ = sigterm => info!("Received SIGTERM, finishing current cycle"),
            }
            token.cancel();
        });
        info!("Shutdown coordinator ready - will stop gracefully on SIGINT/SIGTERM");
        Ok(())
    }

    /// Request shutdown without a signal
    pub fn trigger(&self) {
        self.token.cancel();
    }
}
