// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Signal Handling
//!
//! Wires OS termination signals into a [`ShutdownCoordinator`]: SIGTERM
//! and SIGINT trigger a graceful shutdown, SIGHUP is reserved for a
//! future config-reload hook and currently just logs.
//!
//! ## Usage
//!
//! ```no_run
//! use invoicecore_bootstrap::shutdown::ShutdownCoordinator;
//! use invoicecore_bootstrap::signals::install_signal_handlers;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
//!     install_signal_handlers(coordinator.clone());
//!
//!     coordinator.wait_for_shutdown().await;
//! }
//! ```

use crate::shutdown::ShutdownCoordinator;

/// Spawn a background task that listens for SIGTERM/SIGINT (and SIGHUP on
/// Unix) and initiates graceful shutdown on the coordinator.
///
/// Returns immediately; the listener task runs for the lifetime of the
/// process (or until shutdown is initiated by some other path).
pub fn install_signal_handlers(coordinator: ShutdownCoordinator) {
    tokio::spawn(async move {
        wait_for_termination_signal().await;
        tracing::info!("termination signal received, initiating graceful shutdown");
        coordinator.initiate_shutdown();
    });
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::debug!("received SIGTERM");
                return;
            }
            _ = sigint.recv() => {
                tracing::debug!("received SIGINT");
                return;
            }
            _ = sighup.recv() => {
                tracing::warn!("received SIGHUP; config reload on SIGHUP is not implemented, ignoring");
                continue;
            }
        }
    }
}

#[cfg(windows)]
async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::debug!("received Ctrl+C");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn install_signal_handlers_does_not_block() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        install_signal_handlers(coordinator.clone());
        assert!(!coordinator.is_shutting_down());
    }
}
