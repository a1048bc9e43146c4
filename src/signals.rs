/// Signal handling for graceful shutdown.
///
/// SIGINT (Ctrl-C) and SIGTERM both request a graceful stop: the current
/// pass finishes, then the loop exits. Handlers are installed up front so a
/// signal that lands during the first pass is not lost.
pub struct SignalHandler {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl SignalHandler {
    /// Register the handlers. Must be called inside a Tokio runtime.
    #[cfg(unix)]
    pub fn install() -> std::io::Result<SignalHandler> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(SignalHandler {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> std::io::Result<SignalHandler> {
        Ok(SignalHandler {})
    }

    /// Resolve once a shutdown signal arrives.
    #[cfg(unix)]
    pub async fn wait(mut self) {
        let name = tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        };
        tracing::info!(signal = name, "shutdown requested");
    }

    #[cfg(not(unix))]
    pub async fn wait(self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c listener failed, shutting down");
            return;
        }
        tracing::info!(signal = "ctrl-c", "shutdown requested");
    }
}
