//! The file resource. Watch observes create/modify/delete on the exact
//! path, walking the path upward when an ancestor is missing and
//! re-arming as components appear; CheckApply compares a content digest
//! and writes atomically (temp file + rename).
//!
//! The concrete filesystem-change notification (fsnotify/inotify) is an
//! external adapter per the design's §1 scope; this implementation
//! satisfies the same Watch contract with a self-contained poll loop so
//! the resource is independently testable without that collaborator.

use crate::core::error::{EngineError, Result};
use crate::core::resource::{AutoEdgeGen, Context, MetaParams, Res, ResourceBase, ResourceUuid};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileState {
    Present,
    Absent,
}

pub struct FileResource {
    base: ResourceBase,
    pub path: PathBuf,
    pub content: String,
    pub state: FileState,
    poll_interval: Duration,
}

impl FileResource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, content: impl Into<String>, state: FileState) -> Self {
        Self {
            base: ResourceBase::new(name, "File"),
            path: path.into(),
            content: content.into(),
            state,
            poll_interval: Duration::from_millis(200),
        }
    }

    pub fn with_meta(mut self, meta: MetaParams) -> Self {
        self.base.meta = meta;
        self
    }

    fn digest(content: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hasher.finalize().into()
    }

    fn current_digest(path: &Path) -> Option<[u8; 32]> {
        std::fs::read(path).ok().map(|bytes| {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            hasher.finalize().into()
        })
    }

    /// Classifies an observed ancestor change relative to the currently
    /// armed watch path: whether the event walks toward the target
    /// (ascend toward root, descend toward the leaf), exactly matches it,
    /// or is unrelated noise.
    pub fn classify_depth(armed: &Path, observed: &Path) -> DepthClass {
        if armed == observed {
            return DepthClass::Match;
        }
        if observed.starts_with(armed) {
            return DepthClass::Descend;
        }
        if armed.starts_with(observed) {
            return DepthClass::Ascend;
        }
        DepthClass::Noise
    }

    fn nearest_existing_ancestor(path: &Path) -> PathBuf {
        let mut cur = path.to_path_buf();
        loop {
            if cur.exists() {
                return cur;
            }
            match cur.parent() {
                Some(p) if !p.as_os_str().is_empty() => cur = p.to_path_buf(),
                _ => return PathBuf::from("/"),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthClass {
    Ascend,
    Descend,
    Match,
    Noise,
}

#[async_trait]
impl Res for FileResource {
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
        let mut armed = Self::nearest_existing_ancestor(&self.path);
        let mut last_digest = Self::current_digest(&self.path);
        let mut last_exists = self.path.exists();
        let mut ticker = interval(self.poll_interval);
        let _ = running.send(());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let exists_now = self.path.exists();
                    let digest_now = Self::current_digest(&self.path);
                    let ancestor_now = Self::nearest_existing_ancestor(&self.path);

                    let changed = exists_now != last_exists
                        || digest_now != last_digest
                        || ancestor_now != armed;

                    if changed {
                        let _ = Self::classify_depth(&armed, &ancestor_now);
                        armed = ancestor_now;
                        last_exists = exists_now;
                        last_digest = digest_now;
                        let _ = on_event.send(()).await;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn check_apply(&mut self, _ctx: Arc<Context>, apply: bool) -> Result<bool> {
        match self.state {
            FileState::Absent => {
                if !self.path.exists() {
                    return Ok(true);
                }
                if !apply {
                    return Ok(false);
                }
                std::fs::remove_file(&self.path).map_err(EngineError::Io)?;
                Ok(false)
            }
            FileState::Present => {
                let want = Self::digest(&self.content);
                let have = Self::current_digest(&self.path);
                if have == Some(want) {
                    return Ok(true);
                }
                if !apply {
                    return Ok(false);
                }
                if let Some(parent) = self.path.parent() {
                    std::fs::create_dir_all(parent).map_err(EngineError::Io)?;
                }
                let tmp = self.path.with_extension("mgmtd-tmp");
                std::fs::write(&tmp, &self.content).map_err(EngineError::Io)?;
                std::fs::rename(&tmp, &self.path).map_err(EngineError::Io)?;
                Ok(false)
            }
        }
    }

    fn cmp(&self, other: &dyn Res) -> bool {
        other.base().kind == "File" && other.base().name == self.base.name
    }

    fn get_uuids(&self) -> Vec<ResourceUuid> {
        vec![ResourceUuid::file(self.path.to_string_lossy().to_string())]
    }

    fn auto_edges(&self) -> Option<Box<dyn AutoEdgeGen>> {
        if !self.base.meta.auto_edge {
            return None;
        }
        Some(Box::new(crate::core::resource::autoedge::AncestorWalk::new(
            self.path.to_string_lossy().to_string(),
        )))
    }
}

/// Wire format for exported-resource exchange (§4.8) and the registry's
/// `Default()`-style decode contract (§4.3): the subset of `FileResource`
/// that survives a round trip through the external KV store.
#[derive(Serialize, Deserialize)]
struct FileSpec {
    name: String,
    path: PathBuf,
    content: String,
    state: FileState,
}

pub fn encode(r: &FileResource) -> Result<Vec<u8>> {
    let spec = FileSpec {
        name: r.base.name.clone(),
        path: r.path.clone(),
        content: r.content.clone(),
        state: r.state,
    };
    serde_json::to_vec(&spec).map_err(|e| EngineError::KvPermanent(e.to_string()))
}

/// Registered in [`crate::core::registry::ResourceRegistry::builtin`] as
/// the `File` kind's decoder; reconstructs a fresh [`FileResource`] from a
/// collected [`crate::core::exported::ExportedResource`] payload.
pub fn decode(payload: &[u8]) -> Result<Box<dyn Res>> {
    let spec: FileSpec =
        serde_json::from_slice(payload).map_err(|_| EngineError::ApplyDeltaInconsistent)?;
    Ok(Box::new(FileResource::new(spec.name, spec.path, spec.content, spec.state)))
}
