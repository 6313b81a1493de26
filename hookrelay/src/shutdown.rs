//! Process shutdown signal shared by the servers.

use std::future::pending;

use tokio::signal;
use tracing::{error, info};

/// Completes on SIGINT or SIGTERM, logging which one stopped `service`.
///
/// A handler that cannot be installed is logged and never fires; the other
/// one still does.
pub async fn shutdown_signal(service: &'static str) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(service, error = %e, "sigint_handler_failed");
            pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(service, error = %e, "sigterm_handler_failed");
                pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = pending::<()>();

    let signal_name = tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    };

    info!(service, signal = signal_name, "shutdown_signal_received");
}
