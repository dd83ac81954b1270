//! The package resource. The concrete package manager (apt/dnf/pacman/...)
//! is an external adapter; this resource models the CheckApply/State
//! contract against a `PkgBackend` trait so the graph logic is testable
//! without shelling out to one.

use crate::core::error::Result;
use crate::core::resource::{AutoEdgeGen, Compatible, Context, Res, ResourceBase, ResourceUuid};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PkgState {
    Installed,
    Uninstalled,
    Newest,
    Version(String),
}

/// What a real package-manager adapter would shell out to. Kept minimal:
/// query the installed version (if any) and install/remove a version.
#[async_trait]
pub trait PkgBackend: Send + Sync {
    async fn installed_version(&self, name: &str) -> Result<Option<String>>;
    async fn newest_version(&self, name: &str) -> Result<String>;
    async fn install(&self, name: &str, version: &str) -> Result<()>;
    async fn remove(&self, name: &str) -> Result<()>;
    /// Files this package claims ownership of, for AutoEdges against File
    /// resources under its tree.
    async fn owned_paths(&self, name: &str) -> Result<Vec<String>>;

    /// Installs several packages to possibly-differing versions in one
    /// transaction. Default loops `install` one at a time; a real adapter
    /// (apt/dnf/pacman) should override this with an actual batch
    /// transaction so a grouped CheckApply genuinely issues one command.
    async fn install_many(&self, names: &[(&str, &str)]) -> Result<()> {
        for (name, version) in names {
            self.install(name, version).await?;
        }
        Ok(())
    }

    /// Removes several packages in one transaction. Default loops `remove`
    /// one at a time; see [`PkgBackend::install_many`].
    async fn remove_many(&self, names: &[&str]) -> Result<()> {
        for name in names {
            self.remove(name).await?;
        }
        Ok(())
    }
}

pub struct PkgResource {
    base: ResourceBase,
    pub pkg_name: String,
    pub state: PkgState,
    backend: Arc<dyn PkgBackend>,
    /// Paths this package owns, cached at `Init` time (the backend call is
    /// async; `GetUUIDs` is not, so the AutoEdges pass reads this cache
    /// instead of calling the backend directly).
    owned_paths: RwLock<Vec<String>>,
    /// Names and states of other `Pkg` vertices AutoGrouping folded into
    /// this one. Each shares `group_cmp`-equal `non_version_state`, so
    /// `check_apply` can batch them alongside `pkg_name` into a single
    /// backend transaction.
    grouped: Vec<(String, PkgState)>,
}

impl PkgResource {
    pub fn new(name: impl Into<String>, state: PkgState, backend: Arc<dyn PkgBackend>) -> Self {
        let name = name.into();
        Self {
            base: ResourceBase::new(name.clone(), "Pkg"),
            pkg_name: name,
            state,
            backend,
            owned_paths: RwLock::new(Vec::new()),
            grouped: Vec::new(),
        }
    }

    fn satisfies(state: &PkgState, have: &Option<String>, newest: &str) -> bool {
        match state {
            PkgState::Uninstalled => have.is_none(),
            PkgState::Installed => have.is_some(),
            PkgState::Newest => have.as_deref() == Some(newest),
            PkgState::Version(v) => have.as_deref() == Some(v.as_str()),
        }
    }

    /// This resource's own package plus every package grouped into it.
    fn members(&self) -> impl Iterator<Item = (&str, &PkgState)> {
        std::iter::once((self.pkg_name.as_str(), &self.state))
            .chain(self.grouped.iter().map(|(n, s)| (n.as_str(), s)))
    }
}

#[async_trait]
impl Res for PkgResource {
    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    async fn init(&mut self, _ctx: Arc<Context>) -> Result<()> {
        let paths = self.backend.owned_paths(&self.pkg_name).await?;
        *self.owned_paths.write() = paths;
        Ok(())
    }

    async fn watch(
        &mut self,
        _ctx: Arc<Context>,
        running: oneshot::Sender<()>,
        _on_event: mpsc::Sender<()>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        // Package databases don't push change notifications; CheckApply is
        // only ever driven by upstream events and the initial run.
        let _ = running.send(());
        let _ = shutdown.changed().await;
        Ok(())
    }

    /// Batches every member of this vertex's group into as few backend
    /// transactions as possible: one `install_many` for members that need
    /// installing/upgrading, one `remove_many` for members that need
    /// removing, regardless of how many `Pkg` vertices AutoGrouping folded
    /// together (§8 scenario 2).
    async fn check_apply(&mut self, _ctx: Arc<Context>, apply: bool) -> Result<bool> {
        let mut to_install = Vec::new();
        let mut to_remove = Vec::new();
        let mut newests = std::collections::HashMap::new();

        for (name, state) in self.members() {
            let have = self.backend.installed_version(name).await?;
            if !newests.contains_key(name) {
                let n = self.backend.newest_version(name).await?;
                newests.insert(name.to_string(), n);
            }
            let newest = newests[name].clone();

            if Self::satisfies(state, &have, &newest) {
                continue;
            }
            match state {
                PkgState::Uninstalled => to_remove.push(name.to_string()),
                PkgState::Newest | PkgState::Installed => to_install.push((name.to_string(), newest)),
                PkgState::Version(v) => to_install.push((name.to_string(), v.clone())),
            }
        }

        if to_install.is_empty() && to_remove.is_empty() {
            return Ok(true);
        }
        if !apply {
            return Ok(false);
        }

        if !to_install.is_empty() {
            let pairs: Vec<(&str, &str)> = to_install
                .iter()
                .map(|(n, v)| (n.as_str(), v.as_str()))
                .collect();
            self.backend.install_many(&pairs).await?;
        }
        if !to_remove.is_empty() {
            let names: Vec<&str> = to_remove.iter().map(|n| n.as_str()).collect();
            self.backend.remove_many(&names).await?;
        }
        Ok(false)
    }

    fn cmp(&self, other: &dyn Res) -> bool {
        other.base().kind == "Pkg" && other.base().name == self.base.name
    }

    /// Exposes the paths this package owns, so a `File` resource's
    /// `AutoEdges` ancestor walk can match against them and gain a
    /// `Pkg -> File` prerequisite edge (§8 scenario 3).
    fn get_uuids(&self) -> Vec<ResourceUuid> {
        let paths = self.owned_paths.read().clone();
        if paths.is_empty() {
            vec![]
        } else {
            vec![ResourceUuid::pkg(paths)]
        }
    }

    fn auto_edges(&self) -> Option<Box<dyn AutoEdgeGen>> {
        None
    }

    /// Two `Pkg` vertices group iff both have a non-version `State` and
    /// it's the same one, so a single package-manager transaction can
    /// install/remove them together (§4.4).
    fn group_cmp(&self, other: &dyn Res) -> bool {
        let Some(other_pkg) = other.as_any().downcast_ref::<PkgResource>() else {
            return false;
        };
        match (self.non_version_state(), other_pkg.non_version_state()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    fn as_compatible(&mut self) -> Option<&mut dyn Compatible> {
        Some(self)
    }
}

impl Compatible for PkgResource {
    fn adapts(&self, other: &dyn Res) -> bool {
        self.group_cmp(other)
    }

    /// Folds `other`'s own package (and anything already grouped into it)
    /// into this vertex's member list, so `check_apply` covers all of them
    /// in one backend transaction.
    fn merge(&mut self, other: &dyn Res) {
        let Some(other_pkg) = other.as_any().downcast_ref::<PkgResource>() else {
            return;
        };
        self.grouped.push((other_pkg.pkg_name.clone(), other_pkg.state.clone()));
        self.grouped.extend(other_pkg.grouped.iter().cloned());
    }
}

impl PkgResource {
    fn non_version_state(&self) -> Option<&PkgState> {
        match &self.state {
            PkgState::Version(_) => None,
            s => Some(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::exported::MemoryKvStore;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct FakeBackend {
        installed: Mutex<HashMap<String, String>>,
        newest: &'static str,
        install_many_calls: Mutex<u32>,
        remove_many_calls: Mutex<u32>,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                installed: Mutex::new(HashMap::new()),
                newest: "2.0",
                install_many_calls: Mutex::new(0),
                remove_many_calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl PkgBackend for FakeBackend {
        async fn installed_version(&self, name: &str) -> Result<Option<String>> {
            Ok(self.installed.lock().unwrap().get(name).cloned())
        }
        async fn newest_version(&self, _name: &str) -> Result<String> {
            Ok(self.newest.to_string())
        }
        async fn install(&self, name: &str, version: &str) -> Result<()> {
            self.installed
                .lock()
                .unwrap()
                .insert(name.to_string(), version.to_string());
            Ok(())
        }
        async fn remove(&self, name: &str) -> Result<()> {
            self.installed.lock().unwrap().remove(name);
            Ok(())
        }
        async fn owned_paths(&self, name: &str) -> Result<Vec<String>> {
            if name == "foo" {
                Ok(vec!["/etc/foo/".to_string()])
            } else {
                Ok(vec![])
            }
        }
        async fn install_many(&self, names: &[(&str, &str)]) -> Result<()> {
            *self.install_many_calls.lock().unwrap() += 1;
            let mut installed = self.installed.lock().unwrap();
            for (name, version) in names {
                installed.insert(name.to_string(), version.to_string());
            }
            Ok(())
        }
        async fn remove_many(&self, names: &[&str]) -> Result<()> {
            *self.remove_many_calls.lock().unwrap() += 1;
            let mut installed = self.installed.lock().unwrap();
            for name in names {
                installed.remove(*name);
            }
            Ok(())
        }
    }

    fn ctx() -> Arc<Context> {
        Arc::new(Context::new("h", false, PathBuf::from("/tmp"), Arc::new(MemoryKvStore::new())))
    }

    #[tokio::test]
    async fn installs_newest_when_missing() {
        let backend = Arc::new(FakeBackend::new());
        let mut r = PkgResource::new("nginx", PkgState::Newest, backend.clone());

        assert!(!r.check_apply(ctx(), false).await.unwrap());
        assert!(!r.check_apply(ctx(), true).await.unwrap());
        assert_eq!(
            backend.installed_version("nginx").await.unwrap(),
            Some("2.0".to_string())
        );
        assert!(r.check_apply(ctx(), false).await.unwrap());
    }

    #[tokio::test]
    async fn removes_when_uninstalled_requested() {
        let backend = Arc::new(FakeBackend::new());
        backend.install("nginx", "1.0").await.unwrap();
        let mut r = PkgResource::new("nginx", PkgState::Uninstalled, backend.clone());

        assert!(!r.check_apply(ctx(), true).await.unwrap());
        assert_eq!(backend.installed_version("nginx").await.unwrap(), None);
    }

    #[tokio::test]
    async fn pinned_version_is_respected() {
        let backend = Arc::new(FakeBackend::new());
        let mut r = PkgResource::new("nginx", PkgState::Version("1.5".to_string()), backend.clone());
        r.check_apply(ctx(), true).await.unwrap();
        assert_eq!(
            backend.installed_version("nginx").await.unwrap(),
            Some("1.5".to_string())
        );
        assert!(r.check_apply(ctx(), false).await.unwrap());
    }

    #[tokio::test]
    async fn get_uuids_exposes_owned_paths_after_init() {
        let backend = Arc::new(FakeBackend::new());
        let mut r = PkgResource::new("foo", PkgState::Newest, backend);
        assert!(r.get_uuids().is_empty());
        r.init(ctx()).await.unwrap();
        let uuids = r.get_uuids();
        assert_eq!(uuids.len(), 1);
        assert!(uuids[0].matches(&ResourceUuid::file("/etc/foo")));
    }

    #[test]
    fn pkgs_with_matching_state_group_with_each_other() {
        let backend = Arc::new(FakeBackend::new());
        let a = PkgResource::new("a", PkgState::Newest, backend.clone());
        let b = PkgResource::new("b", PkgState::Newest, backend);
        assert!(a.group_cmp(&b));
    }

    #[test]
    fn pkgs_with_differing_state_do_not_group() {
        let backend = Arc::new(FakeBackend::new());
        let a = PkgResource::new("a", PkgState::Installed, backend.clone());
        let b = PkgResource::new("b", PkgState::Newest, backend);
        assert!(!a.group_cmp(&b));
    }

    #[test]
    fn pinned_version_pkgs_never_group() {
        let backend = Arc::new(FakeBackend::new());
        let a = PkgResource::new("a", PkgState::Version("1.0".to_string()), backend.clone());
        let b = PkgResource::new("b", PkgState::Version("1.0".to_string()), backend);
        assert!(!a.group_cmp(&b));
    }

    #[tokio::test]
    async fn merged_group_checks_apply_in_one_backend_transaction() {
        let backend = Arc::new(FakeBackend::new());
        let mut survivor = PkgResource::new("cowsay", PkgState::Newest, backend.clone());
        let fortune = PkgResource::new("fortune", PkgState::Newest, backend.clone());
        let sl = PkgResource::new("sl", PkgState::Newest, backend.clone());

        survivor.as_compatible().unwrap().merge(&fortune);
        survivor.as_compatible().unwrap().merge(&sl);
        assert_eq!(survivor.grouped.len(), 2);

        assert!(!survivor.check_apply(ctx(), true).await.unwrap());
        assert_eq!(*backend.install_many_calls.lock().unwrap(), 1);
        for name in ["cowsay", "fortune", "sl"] {
            assert_eq!(
                backend.installed_version(name).await.unwrap(),
                Some("2.0".to_string())
            );
        }
        assert!(survivor.check_apply(ctx(), false).await.unwrap());
    }

    #[tokio::test]
    async fn merged_group_removes_all_members_in_one_transaction() {
        let backend = Arc::new(FakeBackend::new());
        backend.install("cowsay", "1.0").await.unwrap();
        backend.install("fortune", "1.0").await.unwrap();
        let mut survivor = PkgResource::new("cowsay", PkgState::Uninstalled, backend.clone());
        let fortune = PkgResource::new("fortune", PkgState::Uninstalled, backend.clone());
        survivor.as_compatible().unwrap().merge(&fortune);

        assert!(!survivor.check_apply(ctx(), true).await.unwrap());
        assert_eq!(*backend.remove_many_calls.lock().unwrap(), 1);
        assert_eq!(backend.installed_version("cowsay").await.unwrap(), None);
        assert_eq!(backend.installed_version("fortune").await.unwrap(), None);
    }
}
