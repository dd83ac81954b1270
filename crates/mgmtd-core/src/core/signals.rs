//! Native signal handling (C9): escalating shutdown tiers driven by
//! repeated SIGINT, with SIGTERM always requesting a graceful stop.
//!
//! Mirrors the flag-plus-background-poll pattern used for native signal
//! capture elsewhere in the stack: `signal_hook::flag::register` writes to
//! an `AtomicBool` from the (async-signal-unsafe-averse) signal handler,
//! and a dedicated thread polls it and forwards a typed event across a
//! channel the async runtime can select on.

use crate::core::scheduler::ShutdownTier;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Installs SIGINT/SIGTERM handlers and returns a receiver of shutdown
/// tiers. The first SIGINT (or any SIGTERM) sends `Graceful`; the second
/// SIGINT sends `Fast`; the third and beyond send `Hard`. The poll thread
/// exits once `Hard` has been delivered.
pub fn install() -> std::io::Result<mpsc::Receiver<ShutdownTier>> {
    let (tx, rx) = mpsc::channel(4);

    let sigint_flag = Arc::new(AtomicBool::new(false));
    let sigterm_flag = Arc::new(AtomicBool::new(false));
    flag::register(SIGINT, sigint_flag.clone())?;
    flag::register(SIGTERM, sigterm_flag.clone())?;

    let sigint_count = Arc::new(AtomicUsize::new(0));

    std::thread::Builder::new()
        .name("mgmtd-signals".to_string())
        .spawn(move || loop {
            if sigterm_flag.swap(false, Ordering::Relaxed) {
                tracing::info!("SIGTERM received, requesting graceful shutdown");
                if tx.blocking_send(ShutdownTier::Graceful).is_err() {
                    break;
                }
            }

            if sigint_flag.swap(false, Ordering::Relaxed) {
                let count = sigint_count.fetch_add(1, Ordering::Relaxed) + 1;
                let tier = match count {
                    1 => ShutdownTier::Graceful,
                    2 => ShutdownTier::Fast,
                    _ => ShutdownTier::Hard,
                };
                tracing::info!(count, ?tier, "SIGINT received");
                if tx.blocking_send(tier).is_err() {
                    break;
                }
                if tier == ShutdownTier::Hard {
                    break;
                }
            }

            std::thread::sleep(Duration::from_millis(100));
        })?;

    Ok(rx)
}
