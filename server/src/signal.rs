//! Signal handling for graceful shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Install signal handlers for graceful shutdown.
///
/// Returns an `Arc<AtomicBool>` that is set to `true` when a shutdown
/// signal (SIGINT or SIGTERM) is received. A second signal forces an
/// immediate exit.
pub fn install_signal_handler() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();

    ctrlc::set_handler(move || {
        if shutdown_flag.swap(true, Ordering::SeqCst) {
            tracing::warn!("received second signal, forcing immediate exit");
            std::process::exit(1);
        }
        tracing::info!("received shutdown signal, initiating graceful shutdown");
    })
    .expect("failed to set signal handler");

    shutdown
}

/// Mask SIGPIPE so a send to a closed peer fails with an error return
/// instead of terminating the process.
#[cfg(unix)]
pub fn ignore_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
pub fn ignore_sigpipe() {}
