//! Scheduler / per-vertex runtime (C7). One task per vertex: a dedicated
//! `Watch` sub-task signals "something changed" back into the main select
//! loop, which applies the timestamp-ordering discipline before calling
//! `CheckApply` and poking downstream neighbours.
//!
//! The executable graph is swapped atomically on reload (§5): vertex ids
//! are not stable across generations, so every live task re-resolves its
//! id by name against the current graph snapshot on each cycle rather
//! than caching it at spawn time. This is what lets a `keep` vertex's
//! already-running task observe edges recomputed by a later compile pass
//! without restarting.

mod ordering;

pub use ordering::ok_timestamp;

use crate::core::bus::{self, EventName, EventSender};
use crate::core::compiler::DiffResult;
use crate::core::converger::{Converger, TimerHandle};
use crate::core::error::Result;
use crate::core::graph::{Graph, Vertex, VertexId, VertexPhase};
use crate::core::resource::Context;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// How forcefully `Scheduler::shutdown` should wind down running vertices.
/// Ordered from most to least cooperative; see `signals::ShutdownTier` for
/// how repeated SIGINTs escalate through these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTier {
    Graceful,
    Fast,
    Hard,
}

type SenderMap = Arc<RwLock<HashMap<String, EventSender>>>;
type ContextMap = Arc<RwLock<HashMap<String, Arc<Context>>>>;
type TaskMap = Arc<Mutex<HashMap<String, JoinHandle<()>>>>;

/// Runs every vertex in an executable graph, one task each, and supports
/// swapping in a freshly-compiled graph on reload (§4.9) without
/// disturbing vertices the diff classified as `keep`.
pub struct Scheduler {
    graph: Arc<RwLock<Arc<Graph>>>,
    senders: SenderMap,
    contexts: ContextMap,
    converger: Converger,
    timers: Arc<Mutex<HashMap<u64, TimerHandle>>>,
    shutdown: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: TaskMap,
}

impl Scheduler {
    /// Spawns one task per vertex already present in `graph`. `make_context`
    /// is called once per vertex so callers can give each its own scratch
    /// directory / World handle.
    pub async fn spawn<F>(graph: Graph, converger: Converger, mut make_context: F) -> Self
    where
        F: FnMut(VertexId) -> Arc<Context>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = Self {
            graph: Arc::new(RwLock::new(Arc::new(graph))),
            senders: Arc::new(RwLock::new(HashMap::new())),
            contexts: Arc::new(RwLock::new(HashMap::new())),
            converger,
            timers: Arc::new(Mutex::new(HashMap::new())),
            shutdown: shutdown_tx,
            shutdown_rx,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        };

        let ids = scheduler.graph.read().vertex_ids();
        for id in ids {
            let ctx = make_context(id);
            scheduler.spawn_one(id, ctx).await;
        }
        scheduler
    }

    /// Applies a graph-diff reload (§4.6/§4.9): vertices in `diff.remove`
    /// are sent `exit` and joined; `diff.add` vertices get a fresh task;
    /// `diff.keep` vertices are untouched and pick up the new topology on
    /// their next cycle via the swapped graph pointer.
    pub async fn apply_diff<F>(&self, next_graph: Graph, diff: DiffResult, mut make_context: F)
    where
        F: FnMut(VertexId) -> Arc<Context>,
    {
        for removed in &diff.remove {
            self.stop_vertex(&removed.name).await;
        }

        *self.graph.write() = Arc::new(next_graph);

        for id in diff.add {
            let ctx = make_context(id);
            self.spawn_one(id, ctx).await;
        }
    }

    async fn spawn_one(&self, id: VertexId, ctx: Arc<Context>) {
        let graph = self.graph.read().clone();
        let Some(vertex) = graph.vertex(id).cloned() else {
            return;
        };
        let name = vertex.name.clone();

        let (tx, rx) = bus::channel(name.clone());
        self.senders.write().insert(name.clone(), tx.clone());
        self.contexts.write().insert(name.clone(), ctx);

        let task = tokio::spawn(run_vertex(
            self.graph.clone(),
            name.clone(),
            self.senders.clone(),
            self.contexts.clone(),
            self.converger.clone(),
            self.timers.clone(),
            self.shutdown_rx.clone(),
            rx,
        ));
        self.tasks.lock().insert(name, task);

        let _ = tx.send(EventName::Start, false, true).await;
    }

    async fn stop_vertex(&self, name: &str) {
        let sender = self.senders.write().remove(name);
        self.contexts.write().remove(name);
        if let Some(tx) = sender {
            let _ = tx.send(EventName::Exit, false, false).await;
        }
        let task = self.tasks.lock().remove(name);
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    pub fn sender(&self, name: &str) -> Option<EventSender> {
        self.senders.read().get(name).cloned()
    }

    /// Sends a synchronous `Start` to every vertex, arming its first cycle.
    pub async fn start_all(&self) -> Result<()> {
        let senders: Vec<EventSender> = self.senders.read().values().cloned().collect();
        for tx in senders {
            let _ = tx.send(EventName::Start, false, true).await;
        }
        Ok(())
    }

    /// Tiered shutdown (§4.9/§6), driven by repeated SIGINT or a single
    /// SIGTERM:
    /// - `Graceful`: stop every Watch, send `Exit`, wait for every vertex
    ///   task to drain its current cycle and return.
    /// - `Fast`: same signal, but don't wait — abort tasks immediately so
    ///   a stuck CheckApply can't hold up the process.
    /// - `Hard`: like `Fast`, but first calls `Interrupt` on every vertex
    ///   whose resource implements `Interruptable`, so an in-flight
    ///   long-running CheckApply gets a chance to cancel cleanly before
    ///   its task is aborted.
    pub async fn shutdown(self, tier: ShutdownTier) {
        let _ = self.shutdown.send(true);
        let senders: Vec<EventSender> = self.senders.read().values().cloned().collect();
        for tx in senders {
            let _ = tx.send(EventName::Exit, false, false).await;
        }

        if tier == ShutdownTier::Hard {
            let graph = self.graph.read().clone();
            for id in graph.vertex_ids() {
                if let Some(vertex) = graph.vertex(id) {
                    let mut res = vertex.resource.lock().await;
                    if let Some(interruptable) = res.as_interruptable() {
                        interruptable.interrupt();
                    }
                }
            }
        }

        let mut tasks = self.tasks.lock();
        match tier {
            ShutdownTier::Graceful => {
                for (_, task) in tasks.drain() {
                    let _ = task.await;
                }
            }
            ShutdownTier::Fast | ShutdownTier::Hard => {
                for (_, task) in tasks.drain() {
                    task.abort();
                }
            }
        }
    }

    pub fn graph(&self) -> Arc<Graph> {
        self.graph.read().clone()
    }
}

async fn run_vertex(
    graph_handle: Arc<RwLock<Arc<Graph>>>,
    name: String,
    senders: SenderMap,
    contexts: ContextMap,
    converger: Converger,
    timers: Arc<Mutex<HashMap<u64, TimerHandle>>>,
    shutdown_rx: watch::Receiver<bool>,
    mut event_rx: bus::EventReceiver,
) {
    let initial_graph = graph_handle.read().clone();
    let Some(initial_id) = initial_graph.find_by_name(&name) else {
        return;
    };
    let vertex = initial_graph.vertex(initial_id).unwrap().clone();
    let ctx = match contexts.read().get(&name).cloned() {
        Some(c) => c,
        None => return,
    };

    // Init runs exactly once per vertex, before Watch starts (§3): it's
    // where a resource caches anything `GetUUIDs`/`AutoEdges` need but
    // can only compute asynchronously (e.g. `Pkg::owned_paths`).
    if let Err(e) = vertex.resource.lock().await.init(ctx.clone()).await {
        tracing::error!(vertex = %name, error = %e, "Init failed, vertex will not start");
        return;
    }

    let (running_tx, running_rx) = oneshot::channel();
    let (on_event_tx, mut on_event_rx) = mpsc::channel(8);

    let watch_resource = vertex.resource.clone();
    let watch_ctx = ctx.clone();
    let watch_shutdown = shutdown_rx.clone();
    let watch_handle = tokio::spawn(async move {
        let mut res = watch_resource.lock().await;
        let _ = res.watch(watch_ctx, running_tx, on_event_tx, watch_shutdown).await;
    });

    if running_rx.await.is_err() {
        return;
    }
    vertex.state.watching.store(true, Ordering::SeqCst);
    vertex.state.set_phase(VertexPhase::Nil);

    let converger_id = converger.register();
    *vertex.state.converger_id.write() = Some(converger_id);
    {
        let mut map = timers.lock();
        let _ = converger.start_timer(converger_id, &mut map);
    }

    loop {
        let (activity, from_watch) = tokio::select! {
            got = on_event_rx.recv() => {
                if got.is_none() {
                    break;
                }
                (true, true)
            }
            outcome = event_rx.read_event() => {
                match outcome {
                    Ok(o) if o.exit => break,
                    Ok(o) => (o.act, false),
                    Err(_) => break,
                }
            }
        };

        if !activity {
            continue;
        }
        {
            let map = timers.lock();
            Converger::reset_timer(&map, converger_id);
        }

        // A Watch-observed change (or an explicit `ctx.dirty()` call)
        // means this vertex's own state may no longer match the last
        // successful CheckApply, even though a downstream Poke alone
        // never does (§4.7: "If isStateOK is cached true, skip"). Without
        // this, a vertex that already converged once would never
        // re-check after drift on disk/in the package DB/etc.
        if from_watch || ctx.take_dirty() {
            vertex.state.is_state_ok.store(false, Ordering::SeqCst);
        }

        let graph = graph_handle.read().clone();
        let Some(id) = graph.find_by_name(&name) else {
            // The vertex was removed from the live graph out from under us
            // (a concurrent reload); exit on the next explicit Exit event.
            continue;
        };
        let senders_snapshot = senders.read().clone();
        let contexts_snapshot = contexts.read().clone();
        process_cycle(&graph, id, &vertex, &ctx, &senders_snapshot, &contexts_snapshot).await;
    }

    vertex.state.watching.store(false, Ordering::SeqCst);
    let _ = vertex.resource.lock().await.close().await;
    {
        let mut map = timers.lock();
        Converger::stop_timer(&mut map, converger_id);
    }
    converger.unregister(converger_id);
    watch_handle.abort();
}

async fn process_cycle(
    graph: &Graph,
    id: VertexId,
    vertex: &Vertex,
    ctx: &Arc<Context>,
    senders: &HashMap<String, EventSender>,
    contexts: &HashMap<String, Arc<Context>>,
) {
    vertex.state.set_phase(VertexPhase::Event);

    if !ok_timestamp(graph, id) {
        for (src, _edge) in graph.incoming(id) {
            let src_vertex = graph.vertex(src).unwrap();
            let phase = src_vertex.state.phase();
            let stale = src_vertex.timestamp() >= vertex.timestamp();
            let in_flight = matches!(phase, VertexPhase::Event | VertexPhase::CheckApply);
            if stale && !in_flight {
                if let Some(tx) = senders.get(&src_vertex.name) {
                    let _ = tx.send(EventName::BackPoke, true, false).await;
                }
            }
        }
        vertex.state.set_phase(VertexPhase::Nil);
        return;
    }

    vertex.state.set_phase(VertexPhase::CheckApply);

    let did_work = if vertex.state.is_state_ok.load(Ordering::SeqCst) {
        false
    } else {
        let mut res = vertex.resource.lock().await;
        let apply = !ctx.noop && !res.base().meta.noop;
        match res.check_apply(ctx.clone(), apply).await {
            Ok(already_ok) => {
                vertex.state.is_state_ok.store(true, Ordering::SeqCst);
                vertex.state.retry_attempt.store(0, Ordering::SeqCst);
                !already_ok
            }
            Err(e) => {
                let attempt = vertex.state.retry_attempt.fetch_add(1, Ordering::SeqCst) + 1;
                let meta = res.base().meta.clone();
                if meta.may_retry(attempt) {
                    tracing::warn!(vertex = %vertex.name, attempt, error = %e, "CheckApply failed, retrying");
                    if let Some(tx) = senders.get(&vertex.name) {
                        let tx = tx.clone();
                        let delay = meta.delay;
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = tx.send(EventName::Poke, false, true).await;
                        });
                    }
                } else {
                    tracing::error!(vertex = %vertex.name, attempt, error = %e, "CheckApply exhausted retry budget");
                }
                vertex.state.set_phase(VertexPhase::Nil);
                return;
            }
        }
    };

    vertex.set_timestamp(now_ns());
    vertex.state.set_phase(VertexPhase::Poking);

    for (dst, edge) in graph.outgoing(id) {
        let dst_vertex = graph.vertex(dst).unwrap();
        if edge.notify && did_work {
            if let Some(dst_ctx) = contexts.get(&dst_vertex.name) {
                dst_ctx.set_refreshed();
            }
        }
        if let Some(tx) = senders.get(&dst_vertex.name) {
            let _ = tx.send(EventName::Poke, true, did_work).await;
        }
    }

    vertex.state.set_phase(VertexPhase::Nil);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::compiler;
    use crate::core::exported::MemoryKvStore;
    use crate::core::graph::Edge;
    use crate::core::resources::file::{FileResource, FileState};
    use crate::core::resources::NoopResource;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::tempdir;

    fn ctx(hostname: &str) -> Arc<Context> {
        Arc::new(Context::new(hostname, false, PathBuf::from("/tmp"), Arc::new(MemoryKvStore::new())))
    }

    #[tokio::test]
    async fn noop_context_never_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");

        let mut graph = Graph::new();
        graph.add_vertex(Vertex::new("a", "File", Box::new(FileResource::new("a", &path, "x", FileState::Present))));

        let (converger, _reeval_rx) = Converger::new(Duration::from_secs(5));
        let scheduler = Scheduler::spawn(graph, converger, |_id| {
            Arc::new(Context::new("h1", false, PathBuf::from("/tmp"), Arc::new(MemoryKvStore::new())).with_noop(true))
        })
        .await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!path.exists(), "noop context must never apply changes");

        scheduler.shutdown(ShutdownTier::Graceful).await;
    }

    #[tokio::test]
    async fn watch_observed_drift_forces_a_fresh_check_apply() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");

        let mut graph = Graph::new();
        graph.add_vertex(Vertex::new(
            "a",
            "File",
            Box::new(FileResource::new("a", &path, "original", FileState::Present)),
        ));

        let (converger, _reeval_rx) = Converger::new(Duration::from_secs(5));
        let scheduler = Scheduler::spawn(graph, converger, |_id| ctx("h1")).await;

        tokio::time::timeout(Duration::from_secs(2), async {
            while std::fs::read_to_string(&path).unwrap_or_default() != "original" {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("the vertex should converge on its first CheckApply");

        // Simulate drift: something outside the engine edits the file
        // after the vertex has already cached `is_state_ok = true`.
        std::fs::write(&path, "drifted").unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while std::fs::read_to_string(&path).unwrap_or_default() != "original" {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("a watch-observed change must force a fresh CheckApply and restore the content");

        scheduler.shutdown(ShutdownTier::Graceful).await;
    }

    struct CountingResource {
        base: crate::core::resource::ResourceBase,
        checks: Arc<std::sync::atomic::AtomicU32>,
    }

    #[async_trait::async_trait]
    impl crate::core::resource::Res for CountingResource {
        fn base(&self) -> &crate::core::resource::ResourceBase {
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
            running: tokio::sync::oneshot::Sender<()>,
            _on_event: mpsc::Sender<()>,
            mut shutdown: tokio::sync::watch::Receiver<bool>,
        ) -> Result<()> {
            let _ = running.send(());
            let _ = shutdown.changed().await;
            Ok(())
        }
        async fn check_apply(&mut self, _ctx: Arc<Context>, _apply: bool) -> Result<bool> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
        fn cmp(&self, other: &dyn crate::core::resource::Res) -> bool {
            other.base().name == self.base.name
        }
    }

    #[tokio::test]
    async fn explicit_dirty_forces_a_fresh_check_apply_even_without_a_watch_event() {
        let checks = Arc::new(std::sync::atomic::AtomicU32::new(0));

        let mut graph = Graph::new();
        graph.add_vertex(Vertex::new(
            "c",
            "Counting",
            Box::new(CountingResource {
                base: crate::core::resource::ResourceBase::new("c", "Counting"),
                checks: checks.clone(),
            }),
        ));

        let shared_ctx = ctx("h1");
        let (converger, _reeval_rx) = Converger::new(Duration::from_secs(5));
        let scheduler = Scheduler::spawn(graph, converger, {
            let shared_ctx = shared_ctx.clone();
            move |_id| shared_ctx.clone()
        })
        .await;

        tokio::time::timeout(Duration::from_secs(1), async {
            while checks.load(Ordering::SeqCst) < 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("first CheckApply should run");

        // A plain Poke with nothing dirty must not re-invoke CheckApply:
        // `is_state_ok` is still cached true.
        if let Some(tx) = scheduler.sender("c") {
            let _ = tx.send(EventName::Poke, true, true).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(checks.load(Ordering::SeqCst), 1, "a plain poke must not force a recheck");

        // Now mark the vertex dirty out of band and poke again: this time
        // CheckApply must run again even though the event didn't come
        // from the Watch channel.
        shared_ctx.dirty();
        if let Some(tx) = scheduler.sender("c") {
            let _ = tx.send(EventName::Poke, true, true).await;
        }
        tokio::time::timeout(Duration::from_secs(1), async {
            while checks.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("ctx.dirty() should force a second CheckApply");

        scheduler.shutdown(ShutdownTier::Graceful).await;
    }

    #[tokio::test]
    async fn serial_chain_orders_writes_by_timestamp() {
        let dir = tempdir().unwrap();
        let path_a = dir.path().join("a.txt");
        let path_b = dir.path().join("b.txt");

        let mut graph = Graph::new();
        let va = graph.add_vertex(Vertex::new("a", "File", Box::new(FileResource::new("a", &path_a, "x", FileState::Present))));
        let vb = graph.add_vertex(Vertex::new("b", "File", Box::new(FileResource::new("b", &path_b, "y", FileState::Present))));
        graph.add_edge(va, vb, Edge::new("order", false)).unwrap();

        let (converger, _reeval_rx) = Converger::new(Duration::from_secs(5));
        let scheduler = Scheduler::spawn(graph, converger, |_id| ctx("h1")).await;

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(path_a.exists());
        assert!(path_b.exists());

        let graph = scheduler.graph();
        let a_ts = graph.vertex(graph.find_by_name("a").unwrap()).unwrap().timestamp();
        let b_ts = graph.vertex(graph.find_by_name("b").unwrap()).unwrap().timestamp();
        assert!(a_ts > 0);
        assert!(b_ts > a_ts);

        scheduler.shutdown(ShutdownTier::Graceful).await;
    }

    #[tokio::test]
    async fn reload_keeps_timestamp_for_retained_vertex() {
        let mut graph = Graph::new();
        graph.add_vertex(Vertex::new_test("keepme"));

        let (converger, _reeval_rx) = Converger::new(Duration::from_secs(5));
        let scheduler = Scheduler::spawn(graph, converger, |_id| ctx("h1")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let before_ts = {
            let g = scheduler.graph();
            g.vertex(g.find_by_name("keepme").unwrap()).unwrap().timestamp()
        };
        assert!(before_ts > 0);

        let mut next = Graph::new();
        next.add_vertex(Vertex::new("keepme", "Noop", Box::new(NoopResource::new("keepme"))));
        next.add_vertex(Vertex::new("newone", "Noop", Box::new(NoopResource::new("newone"))));
        let current = scheduler.graph();
        let diff = compiler::diff_graphs(&current, &mut next).await;
        assert_eq!(diff.keep.len(), 1);
        assert_eq!(diff.add.len(), 1);

        scheduler.apply_diff(next, diff, |_id| ctx("h1")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let after = scheduler.graph();
        let after_ts = after.vertex(after.find_by_name("keepme").unwrap()).unwrap().timestamp();
        assert_eq!(before_ts, after_ts);
        assert!(after.find_by_name("newone").is_some());

        scheduler.shutdown(ShutdownTier::Graceful).await;
    }
}
