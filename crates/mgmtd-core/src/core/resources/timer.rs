//! The timer resource: wakes every `interval` and emits a regular event;
//! CheckApply is a no-op that always succeeds.

use crate::core::error::Result;
use crate::core::resource::{Context, Res, ResourceBase};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::interval as tokio_interval;

pub struct TimerResource {
    base: ResourceBase,
    interval: Duration,
}

impl TimerResource {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            base: ResourceBase::new(name, "Timer"),
            interval,
        }
    }
}

#[async_trait]
impl Res for TimerResource {
    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    async fn init(&mut self, _ctx: Arc<Context>) -> Result<()> {
        Ok(())
    }

    async fn watch(
        &mut self,
        _ctx: Arc<Context>,
        running: oneshot::Sender<()>,
        on_event: mpsc::Sender<()>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut ticker = tokio_interval(self.interval);
        ticker.tick().await; // first tick fires immediately; consume it while arming.
        let _ = running.send(());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = on_event.send(()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn check_apply(&mut self, _ctx: Arc<Context>, _apply: bool) -> Result<bool> {
        Ok(true)
    }

    fn cmp(&self, other: &dyn Res) -> bool {
        other.base().kind == "Timer" && other.base().name == self.base.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::exported::MemoryKvStore;
    use std::path::PathBuf;

    #[tokio::test]
    async fn emits_regular_events() {
        let mut r = TimerResource::new("t1", Duration::from_millis(5));
        let ctx = Arc::new(Context::new("h", false, PathBuf::from("/tmp"), Arc::new(MemoryKvStore::new())));
        let (running_tx, running_rx) = oneshot::channel();
        let (ev_tx, mut ev_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { r.watch(ctx, running_tx, ev_tx, shutdown_rx).await });
        running_rx.await.unwrap();
        ev_rx.recv().await.expect("expected at least one tick");
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
