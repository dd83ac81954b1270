//! Per-registrant idle timer: alternates between waiting for a reset signal
//! and waiting for the shared `ConvergedTimer`; a reset marks the ID
//! not-converged, a fired timer marks it converged.

use super::{Converger, ConvergerId};
use parking_lot::Mutex;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Stopped,
    Running,
    ResetPending,
}

enum Signal {
    Reset,
}

/// Handle to a running per-ID timer task.
pub struct TimerHandle {
    tx: Mutex<Option<mpsc::UnboundedSender<Signal>>>,
}

impl TimerHandle {
    pub fn reset(&self) {
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(Signal::Reset);
        }
    }

    /// Closes the signalling channel; the watcher observes this as exit.
    pub fn stop(&self) {
        self.tx.lock().take();
    }
}

pub fn spawn(converger: Converger, id: ConvergerId) -> TimerHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Signal>();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                reset = rx.recv() => {
                    match reset {
                        Some(Signal::Reset) => {
                            converger.set_converged(id, false);
                        }
                        None => return, // stopped
                    }
                }
                fired = converger.converged_timer(id) => {
                    if fired.is_ok() {
                        converger.set_converged(id, true);
                    }
                }
            }
        }
    });
    TimerHandle {
        tx: Mutex::new(Some(tx)),
    }
}
