//! The exec resource: runs a shell command when an `ifCmd` (or always, if
//! none given) check says the state doesn't already hold. Process
//! invocation is delegated to an `ExecBackend` so CheckApply logic is
//! testable without a real shell.

use crate::core::error::Result;
use crate::core::resource::{Context, Interruptable, Res, ResourceBase};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

#[async_trait]
pub trait ExecBackend: Send + Sync {
    /// Runs `cmd`, returning its exit status.
    async fn run(&self, cmd: &str) -> Result<i32>;
}

pub struct ExecResource {
    base: ResourceBase,
    pub cmd: String,
    pub if_cmd: Option<String>,
    backend: Arc<dyn ExecBackend>,
    /// Set by a hard-shutdown `Interrupt`; checked before the next shell
    /// invocation so an in-flight retry loop doesn't start another command.
    cancelled: Arc<AtomicBool>,
}

impl ExecResource {
    pub fn new(name: impl Into<String>, cmd: impl Into<String>, if_cmd: Option<String>, backend: Arc<dyn ExecBackend>) -> Self {
        Self {
            base: ResourceBase::new(name, "Exec"),
            cmd: cmd.into(),
            if_cmd,
            backend,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Interruptable for ExecResource {
    fn interrupt(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Res for ExecResource {
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
        let _ = shutdown.changed().await;
        Ok(())
    }

    async fn check_apply(&mut self, _ctx: Arc<Context>, apply: bool) -> Result<bool> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Ok(true);
        }
        if let Some(if_cmd) = &self.if_cmd {
            if self.backend.run(if_cmd).await? == 0 {
                return Ok(true);
            }
        }
        if !apply {
            return Ok(false);
        }
        self.backend.run(&self.cmd).await?;
        Ok(false)
    }

    fn cmp(&self, other: &dyn Res) -> bool {
        other.base().kind == "Exec" && other.base().name == self.base.name
    }

    fn as_interruptable(&mut self) -> Option<&mut dyn Interruptable> {
        Some(self)
    }
}
