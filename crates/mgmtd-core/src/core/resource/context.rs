//! The `Init`/`Watch`/`CheckApply` context object.
//!
//! Exposes the capabilities the design grants resources: hostname/debug
//! info, a logger, a per-vertex scratch directory, the exported-resource
//! `World` client, refresh-notification status, an inter-vertex send/recv
//! mailbox, and a way to mark the vertex dirty.

use crate::core::exported::KvStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Opaque key/value payload vertices can pass to their neighbours via
/// `Send`/`Recv`. Kept as JSON for simplicity; kinds agree out of band on
/// the shape they expect.
pub type SendRecvMap = HashMap<String, serde_json::Value>;

pub struct Context {
    pub hostname: String,
    pub debug: bool,
    /// Inspect-only mode: set by `mgmtd-cli --noop`, read by the scheduler
    /// to decide whether `CheckApply` may actually apply changes.
    pub noop: bool,
    var_dir_root: PathBuf,
    pub world: Arc<dyn KvStore>,
    refreshed: AtomicBool,
    dirty: AtomicBool,
    outbox: Mutex<SendRecvMap>,
    inbox: Mutex<SendRecvMap>,
}

impl Context {
    pub fn new(hostname: impl Into<String>, debug: bool, var_dir_root: PathBuf, world: Arc<dyn KvStore>) -> Self {
        Self {
            hostname: hostname.into(),
            debug,
            noop: false,
            var_dir_root,
            world,
            refreshed: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            outbox: Mutex::new(HashMap::new()),
            inbox: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_noop(mut self, noop: bool) -> Self {
        self.noop = noop;
        self
    }

    /// A scratch directory under the engine's var dir, namespaced per
    /// vertex, for resources that need local state.
    pub fn var_dir(&self, subpath: &str) -> PathBuf {
        self.var_dir_root.join(subpath)
    }

    /// Was this vertex notified by a `Notify`-edge prerequisite's
    /// successful CheckApply since the last time this was read? Consuming
    /// read: returns true at most once per notification.
    pub fn refresh(&self) -> bool {
        self.refreshed.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn set_refreshed(&self) {
        self.refreshed.store(true, Ordering::SeqCst);
    }

    pub fn dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    pub fn send(&self, map: SendRecvMap) {
        *self.outbox.lock() = map;
    }

    pub fn recv(&self) -> SendRecvMap {
        self.inbox.lock().clone()
    }

    pub(crate) fn deliver(&self, map: SendRecvMap) {
        *self.inbox.lock() = map;
    }

    pub(crate) fn take_outbox(&self) -> SendRecvMap {
        std::mem::take(&mut self.outbox.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::exported::MemoryKvStore;

    fn ctx() -> Context {
        Context::new("host1", false, PathBuf::from("/tmp/mgmtd"), Arc::new(MemoryKvStore::new()))
    }

    #[test]
    fn refresh_is_consumed_exactly_once() {
        let c = ctx();
        assert!(!c.refresh());
        c.set_refreshed();
        assert!(c.refresh());
        assert!(!c.refresh());
    }

    #[test]
    fn dirty_round_trips() {
        let c = ctx();
        assert!(!c.take_dirty());
        c.dirty();
        assert!(c.take_dirty());
        assert!(!c.take_dirty());
    }

    #[test]
    fn var_dir_joins_subpath() {
        let c = ctx();
        assert_eq!(c.var_dir("file/a"), PathBuf::from("/tmp/mgmtd/file/a"));
    }
}
