//! Signal handling for graceful shutdown
//!
//! Signals cancel the run's token; the collector stops at the next target
//! boundary, so no record is left half written.

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancel `token` on Ctrl+C or SIGTERM
pub fn setup_signal_handlers(token: CancellationToken) -> Result<()> {
    // Handle Ctrl+C (SIGINT)
    {
        let token = token.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C signal: {}", e);
                return;
            }

            info!("Ctrl+C signal received, stopping at the next target");
            token.cancel();
        });
    }

    // Handle SIGTERM (Unix only)
    #[cfg(unix)]
    {
        use signal_hook::consts::SIGTERM;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown_flag))?;

        tokio::spawn(async move {
            // Poll for signal
            loop {
                if shutdown_flag.load(Ordering::Relaxed) {
                    info!("SIGTERM signal received, stopping at the next target");
                    token.cancel();
                    break;
                }
                if token.is_cancelled() {
                    break;
                }
                tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            }
        });
    }

    Ok(())
}
