//! The service resource. The init system (systemd/OpenRC/...) is an
//! external adapter; this resource models it behind a `SvcBackend` trait
//! covering the running state and the boot-time enablement separately,
//! matching the design's Startup/ActiveState split.

use crate::core::error::Result;
use crate::core::resource::{Context, Res, ResourceBase, ResourceUuid};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    Enabled,
    Disabled,
    Undefined,
}

#[async_trait]
pub trait SvcBackend: Send + Sync {
    async fn active_state(&self, name: &str) -> Result<ActiveState>;
    async fn set_active_state(&self, name: &str, want: ActiveState) -> Result<()>;
    async fn startup(&self, name: &str) -> Result<Startup>;
    async fn set_startup(&self, name: &str, want: Startup) -> Result<()>;
}

pub struct SvcResource {
    base: ResourceBase,
    pub svc_name: String,
    pub state: ActiveState,
    pub startup: Startup,
    backend: Arc<dyn SvcBackend>,
}

impl SvcResource {
    pub fn new(name: impl Into<String>, state: ActiveState, startup: Startup, backend: Arc<dyn SvcBackend>) -> Self {
        let name = name.into();
        Self {
            base: ResourceBase::new(name.clone(), "Svc"),
            svc_name: name,
            state,
            startup,
            backend,
        }
    }
}

#[async_trait]
impl Res for SvcResource {
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
        let active = self.backend.active_state(&self.svc_name).await?;
        let startup = self.backend.startup(&self.svc_name).await?;

        let active_ok = active == self.state;
        let startup_ok = self.startup == Startup::Undefined || startup == self.startup;

        if active_ok && startup_ok {
            return Ok(true);
        }
        if !apply {
            return Ok(false);
        }
        if !active_ok {
            self.backend.set_active_state(&self.svc_name, self.state).await?;
        }
        if !startup_ok {
            self.backend.set_startup(&self.svc_name, self.startup).await?;
        }
        Ok(false)
    }

    fn cmp(&self, other: &dyn Res) -> bool {
        other.base().kind == "Svc" && other.base().name == self.base.name
    }

    fn get_uuids(&self) -> Vec<ResourceUuid> {
        vec![ResourceUuid::svc(self.svc_name.clone())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::exported::MemoryKvStore;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct FakeBackend {
        active: Mutex<ActiveState>,
        startup: Mutex<Startup>,
    }

    impl FakeBackend {
        fn new(active: ActiveState, startup: Startup) -> Self {
            Self {
                active: Mutex::new(active),
                startup: Mutex::new(startup),
            }
        }
    }

    #[async_trait]
    impl SvcBackend for FakeBackend {
        async fn active_state(&self, _name: &str) -> Result<ActiveState> {
            Ok(*self.active.lock().unwrap())
        }
        async fn set_active_state(&self, _name: &str, want: ActiveState) -> Result<()> {
            *self.active.lock().unwrap() = want;
            Ok(())
        }
        async fn startup(&self, _name: &str) -> Result<Startup> {
            Ok(*self.startup.lock().unwrap())
        }
        async fn set_startup(&self, _name: &str, want: Startup) -> Result<()> {
            *self.startup.lock().unwrap() = want;
            Ok(())
        }
    }

    fn ctx() -> Arc<Context> {
        Arc::new(Context::new("h", false, PathBuf::from("/tmp"), Arc::new(MemoryKvStore::new())))
    }

    #[tokio::test]
    async fn starts_a_stopped_service() {
        let backend = Arc::new(FakeBackend::new(ActiveState::Stopped, Startup::Undefined));
        let mut r = SvcResource::new("sshd", ActiveState::Running, Startup::Undefined, backend.clone());

        assert!(!r.check_apply(ctx(), false).await.unwrap());
        assert!(!r.check_apply(ctx(), true).await.unwrap());
        assert_eq!(backend.active_state("sshd").await.unwrap(), ActiveState::Running);
        assert!(r.check_apply(ctx(), false).await.unwrap());
    }

    #[tokio::test]
    async fn enables_boot_startup() {
        let backend = Arc::new(FakeBackend::new(ActiveState::Running, Startup::Disabled));
        let mut r = SvcResource::new("sshd", ActiveState::Running, Startup::Enabled, backend.clone());

        assert!(!r.check_apply(ctx(), true).await.unwrap());
        assert_eq!(backend.startup("sshd").await.unwrap(), Startup::Enabled);
    }
}
