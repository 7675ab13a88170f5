//! Ctrl+C handling for a running batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

/// Shared cancel flag checked by the controller between repositories.
pub type CancelFlag = Arc<AtomicBool>;

/// Create a new cancel flag and register OS signal handlers.
///
/// On SIGTERM or SIGINT (Ctrl+C), the flag is set to `true`. The repository
/// being processed finishes first.
pub fn setup_signal_handlers() -> CancelFlag {
    let flag = Arc::new(AtomicBool::new(false));
    let flag_clone = flag.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to register SIGTERM handler");
                    if ctrl_c.await.is_err() {
                        return;
                    }
                    flag_clone.store(true, Ordering::SeqCst);
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), cancelling after the current repository");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, cancelling after the current repository");
                }
            }
        }

        #[cfg(not(unix))]
        {
            if ctrl_c.await.is_err() {
                return;
            }
            info!("received Ctrl+C, cancelling after the current repository");
        }

        eprintln!("\nCancelling after the current repository...");
        flag_clone.store(true, Ordering::SeqCst);
    });

    flag
}
