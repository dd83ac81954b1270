//! The no-op resource: Watch does nothing but honour pause/exit,
//! CheckApply always succeeds.

use crate::core::error::Result;
use crate::core::resource::{Context, Res, ResourceBase};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

pub struct NoopResource {
    base: ResourceBase,
}

impl NoopResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: ResourceBase::new(name, "Noop"),
        }
    }
}

#[async_trait]
impl Res for NoopResource {
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
        _on_event: mpsc::Sender<()>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let _ = running.send(());
        // Nothing to watch; just wait for shutdown.
        let _ = shutdown.changed().await;
        Ok(())
    }

    async fn check_apply(&mut self, _ctx: Arc<Context>, _apply: bool) -> Result<bool> {
        Ok(true)
    }

    fn cmp(&self, other: &dyn Res) -> bool {
        other.base().kind == "Noop" && other.base().name == self.base.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::exported::MemoryKvStore;
    use std::path::PathBuf;

    #[tokio::test]
    async fn check_apply_always_ok() {
        let mut r = NoopResource::new("n1");
        let ctx = Arc::new(Context::new("h", false, PathBuf::from("/tmp"), Arc::new(MemoryKvStore::new())));
        assert!(r.check_apply(ctx.clone(), false).await.unwrap());
        assert!(r.check_apply(ctx, true).await.unwrap());
    }

    #[tokio::test]
    async fn watch_signals_running_and_exits_on_shutdown() {
        let mut r = NoopResource::new("n1");
        let ctx = Arc::new(Context::new("h", false, PathBuf::from("/tmp"), Arc::new(MemoryKvStore::new())));
        let (running_tx, running_rx) = oneshot::channel();
        let (_ev_tx, ev_rx) = mpsc::channel(1);
        drop(ev_rx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let (tx, _rx) = mpsc::channel(1);
            r.watch(ctx, running_tx, tx, shutdown_rx).await
        });
        running_rx.await.unwrap();
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
