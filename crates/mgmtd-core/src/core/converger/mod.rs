//! Converger registry (C2).
//!
//! Aggregates per-registrant converged flags into a single cluster-wide
//! quiescence signal, and drives optional per-registrant idle timers. The
//! status map is protected by a single reader-writer lock (the teacher's
//! `parking_lot` convention); the re-eval signal is send-if-needed but
//! always sent from a task so `set_converged` never blocks its caller.

mod timer;

pub use timer::{TimerHandle, TimerState};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

use crate::core::error::{EngineError, Result};

pub type ConvergerId = u64;

struct Inner {
    status: RwLock<HashMap<ConvergerId, bool>>,
    next_id: AtomicU64,
    reeval_tx: mpsc::UnboundedSender<()>,
    converged_timeout: Duration,
}

/// Handle shared by every registrant and the main loop.
#[derive(Clone)]
pub struct Converger {
    inner: Arc<Inner>,
}

/// Pause/Running control message for [`Converger::run_loop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMsg {
    Run,
    Pause,
}

impl Converger {
    pub fn new(converged_timeout: Duration) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (reeval_tx, reeval_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            status: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            reeval_tx,
            converged_timeout,
        });
        (Converger { inner }, reeval_rx)
    }

    /// Atomically allocate a fresh ID and register it as not-converged.
    pub fn register(&self) -> ConvergerId {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.status.write().insert(id, false);
        id
    }

    pub fn unregister(&self, id: ConvergerId) {
        self.inner.status.write().remove(&id);
    }

    /// Update a registrant's flag. If the aggregate flips, wake the loop.
    pub fn set_converged(&self, id: ConvergerId, converged: bool) {
        let flipped = {
            let mut map = self.inner.status.write();
            let before = Self::aggregate_locked(&map);
            if let Some(entry) = map.get_mut(&id) {
                *entry = converged;
            }
            let after = Self::aggregate_locked(&map);
            before != after
        };
        if flipped {
            let tx = self.inner.reeval_tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(());
            });
        }
    }

    pub fn status(&self) -> HashMap<ConvergerId, bool> {
        self.inner.status.read().clone()
    }

    fn aggregate_locked(map: &HashMap<ConvergerId, bool>) -> bool {
        !map.is_empty() && map.values().all(|v| *v)
    }

    pub fn aggregate(&self) -> bool {
        Self::aggregate_locked(&self.inner.status.read())
    }

    /// Returns a one-shot timeout that never fires if `id`'s own flag is
    /// already converged (avoids fast-loop wakeups at timeout <= 0).
    pub fn converged_timer(&self, id: ConvergerId) -> tokio::sync::oneshot::Receiver<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let already = self.inner.status.read().get(&id).copied().unwrap_or(false);
        if already {
            // Never send: the receiver is simply left pending forever.
            std::mem::forget(tx);
            return rx;
        }
        let timeout = self.inner.converged_timeout;
        tokio::spawn(async move {
            sleep(timeout).await;
            let _ = tx.send(());
        });
        rx
    }

    /// Spawn a per-ID idle timer. Fails if one is already running for `id`.
    pub fn start_timer(
        &self,
        id: ConvergerId,
        running: &mut HashMap<ConvergerId, TimerHandle>,
    ) -> Result<()> {
        if running.contains_key(&id) {
            return Err(EngineError::TimerAlreadyRunning(id));
        }
        let handle = timer::spawn(self.clone(), id);
        running.insert(id, handle);
        Ok(())
    }

    pub fn reset_timer(running: &HashMap<ConvergerId, TimerHandle>, id: ConvergerId) {
        if let Some(h) = running.get(&id) {
            h.reset();
        }
    }

    pub fn stop_timer(running: &mut HashMap<ConvergerId, TimerHandle>, id: ConvergerId) {
        if let Some(h) = running.remove(&id) {
            h.stop();
        }
    }

    /// Cooperative state-machine loop: driven by `control` (strict
    /// alternation Run/Pause is the caller's responsibility — a violation
    /// here is a programming error, mirroring the design's "protocol
    /// violation is fatal"), re-evaluates on every signal from
    /// `set_converged`, and invokes `on_transition(converged)` whenever the
    /// aggregate flips. Failures from `on_transition` are logged, not fatal.
    pub async fn run_loop<F>(
        &self,
        mut control: watch::Receiver<ControlMsg>,
        mut reeval_rx: mpsc::UnboundedReceiver<()>,
        mut on_transition: F,
    ) where
        F: FnMut(bool) -> std::result::Result<(), anyhow::Error>,
    {
        let mut last = self.aggregate();
        let mut running = *control.borrow();
        loop {
            if running == ControlMsg::Pause {
                if control.changed().await.is_err() {
                    return;
                }
                running = *control.borrow();
                continue;
            }
            tokio::select! {
                changed = control.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    running = *control.borrow();
                }
                got = reeval_rx.recv() => {
                    if got.is_none() {
                        return;
                    }
                    let now = self.aggregate();
                    if now != last {
                        if let Err(e) = on_transition(now) {
                            tracing::warn!(error = %e, "converger state function failed");
                        }
                        last = now;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn aggregate_true_iff_all_converged() {
        let (conv, _rx) = Converger::new(Duration::from_millis(10));
        let a = conv.register();
        let b = conv.register();
        assert!(!conv.aggregate());
        conv.set_converged(a, true);
        assert!(!conv.aggregate());
        conv.set_converged(b, true);
        assert!(conv.aggregate());
    }

    #[tokio::test]
    async fn unregister_removes_entry() {
        let (conv, _rx) = Converger::new(Duration::from_millis(10));
        let a = conv.register();
        conv.set_converged(a, true);
        assert!(conv.aggregate());
        let b = conv.register();
        assert!(!conv.aggregate());
        conv.unregister(b);
        assert!(conv.aggregate());
    }

    #[tokio::test]
    async fn set_converged_signals_reeval_on_flip() {
        let (conv, mut rx) = Converger::new(Duration::from_millis(10));
        let a = conv.register();
        conv.set_converged(a, true);
        let got = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("reeval signal should have fired");
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn converged_timer_fires_after_timeout() {
        let (conv, _rx) = Converger::new(Duration::from_millis(20));
        let a = conv.register();
        let fired = conv.converged_timer(a);
        tokio::time::timeout(Duration::from_millis(200), fired)
            .await
            .expect("timer should fire")
            .unwrap();
    }

    #[tokio::test]
    async fn converged_timer_never_fires_when_already_converged() {
        let (conv, _rx) = Converger::new(Duration::from_millis(10));
        let a = conv.register();
        conv.set_converged(a, true);
        let fired = conv.converged_timer(a);
        let res = tokio::time::timeout(Duration::from_millis(50), fired).await;
        assert!(res.is_err(), "timer must not fire when already converged");
    }

    #[tokio::test]
    async fn start_timer_twice_fails() {
        let (conv, _rx) = Converger::new(Duration::from_millis(50));
        let a = conv.register();
        let mut running = HashMap::new();
        conv.start_timer(a, &mut running).unwrap();
        let err = conv.start_timer(a, &mut running).unwrap_err();
        assert!(matches!(err, EngineError::TimerAlreadyRunning(_)));
        Converger::stop_timer(&mut running, a);
    }
}
