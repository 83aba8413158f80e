use tokio::signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
}

#[derive(Debug, thiserror::Error)]
pub enum ShutdownSignalError {
    #[error("failed to install Ctrl+C handler: {0}")]
    CtrlC(std::io::Error),
    #[cfg(unix)]
    #[error("failed to install SIGTERM handler: {0}")]
    Sigterm(std::io::Error),
}

/// Resolve on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() -> Result<ShutdownReason, ShutdownSignalError> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .map(|()| ShutdownReason::Interrupt)
            .map_err(ShutdownSignalError::CtrlC)
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(ShutdownSignalError::Sigterm)?;
        let _ = sigterm.recv().await;
        Ok(ShutdownReason::Terminate)
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<ShutdownReason, ShutdownSignalError>>();

    tokio::select! {
        result = ctrl_c => result,
        result = terminate => result,
    }
}

/// Wait for a shutdown signal and log it. A handler that cannot be installed
/// is logged and treated as an immediate shutdown.
pub async fn wait_logged() {
    match shutdown_signal().await {
        Ok(reason) => tracing::info!(%reason, "shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "shutdown signal handler failed"),
    }
}
