//! Vertex runtime state: not serialised, owned exclusively by the
//! vertex's task. `Vertex` wraps the resource and its state behind `Arc`s
//! so a graph reload can cheaply retain a "keep" vertex's live state
//! (timestamp, cached `is_state_ok`) instead of reconstructing it — the
//! arena collapse described in the design's §9 notes.

use crate::core::resource::Res;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexPhase {
    Nil,
    Watching,
    Event,
    CheckApply,
    Poking,
}

/// Mutable runtime state for one vertex. Cheap to `Arc`-share across graph
/// generations so a reload's `keep` set preserves it untouched.
pub struct VertexState {
    pub timestamp: AtomicU64,
    phase: RwLock<VertexPhase>,
    pub is_state_ok: AtomicBool,
    pub is_grouped: AtomicBool,
    pub watching: AtomicBool,
    pub converger_id: RwLock<Option<u64>>,
    /// 1-indexed count of CheckApply attempts made for the current cycle;
    /// reset to 0 on success.
    pub retry_attempt: AtomicU64,
}

impl Default for VertexState {
    fn default() -> Self {
        Self {
            timestamp: AtomicU64::new(0),
            phase: RwLock::new(VertexPhase::Nil),
            is_state_ok: AtomicBool::new(false),
            is_grouped: AtomicBool::new(false),
            watching: AtomicBool::new(false),
            converger_id: RwLock::new(None),
            retry_attempt: AtomicU64::new(0),
        }
    }
}

impl VertexState {
    pub fn phase(&self) -> VertexPhase {
        *self.phase.read()
    }

    pub fn set_phase(&self, phase: VertexPhase) {
        *self.phase.write() = phase;
    }
}

/// A vertex: a named slot in the graph holding a resource (shared so the
/// compiler can clone the graph structure without deep-copying resources)
/// and its runtime state.
#[derive(Clone)]
pub struct Vertex {
    pub name: String,
    pub kind: &'static str,
    pub resource: Arc<AsyncMutex<Box<dyn Res>>>,
    pub state: Arc<VertexState>,
    /// Other resources merged into this vertex by AutoGrouping.
    pub group: Arc<RwLock<Vec<String>>>,
}

impl Vertex {
    pub fn new(name: impl Into<String>, kind: &'static str, resource: Box<dyn Res>) -> Self {
        Self {
            name: name.into(),
            kind,
            resource: Arc::new(AsyncMutex::new(resource)),
            state: Arc::new(VertexState::default()),
            group: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Share this vertex's live state into the next graph generation
    /// (used by the diff's `keep` classification).
    pub fn retained(&self) -> Self {
        self.clone()
    }

    pub fn timestamp(&self) -> u64 {
        self.state.timestamp.load(Ordering::SeqCst)
    }

    pub fn set_timestamp(&self, ts: u64) {
        self.state.timestamp.store(ts, Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Vertex {
    pub fn new_test(name: &str) -> Self {
        use crate::core::resources::noop::NoopResource;
        Vertex::new(name, "Noop", Box::new(NoopResource::new(name)))
    }
}
