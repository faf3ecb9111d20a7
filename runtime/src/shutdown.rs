//! Graceful shutdown helpers.
//!
//! 1. [`shutdown_signal`] resolves on Ctrl+C or SIGTERM
//! 2. The service broadcasts shutdown to its consumers
//! 3. [`await_shutdown`] gives every background task a bounded time to finish

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// If a signal handler cannot be installed the failure is logged and that
/// signal source is ignored.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

/// Wait for named background tasks, giving each `timeout` to finish.
///
/// Returns the number of tasks that stopped cleanly.
pub async fn await_shutdown(handles: Vec<(String, JoinHandle<()>)>, timeout: Duration) -> usize {
    let mut stopped = 0;

    for (name, handle) in handles {
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => {
                stopped += 1;
                info!(task = %name, "Task stopped gracefully");
            }
            Ok(Err(e)) => warn!(task = %name, error = %e, "Task failed"),
            Err(_) => warn!(task = %name, "Task shutdown timed out"),
        }
    }

    stopped
}
