//! End-to-end: a resource whose `CheckApply` fails twice and succeeds on
//! the third attempt, with `Retry=3`/`Delay=10ms`, ends up with exactly
//! three attempts, a final OK state, and its timestamp advanced exactly
//! once (§8 scenario 4).

use async_trait::async_trait;
use mgmtd_core::core::converger::Converger;
use mgmtd_core::core::error::{EngineError, Result};
use mgmtd_core::core::exported::MemoryKvStore;
use mgmtd_core::core::graph::{Graph, Vertex};
use mgmtd_core::core::resource::{Context, MetaParams, Res, ResourceBase};
use mgmtd_core::core::scheduler::{Scheduler, ShutdownTier};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

struct FlakyResource {
    base: ResourceBase,
    attempts: Arc<AtomicU32>,
    fails_before_success: u32,
}

impl FlakyResource {
    fn new(name: &str, fails_before_success: u32, attempts: Arc<AtomicU32>) -> Self {
        let mut base = ResourceBase::new(name, "Flaky");
        base.meta = MetaParams {
            retry: 3,
            delay: Duration::from_millis(10),
            ..Default::default()
        };
        Self {
            base,
            attempts,
            fails_before_success,
        }
    }
}

#[async_trait]
impl Res for FlakyResource {
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
    async fn check_apply(&mut self, _ctx: Arc<Context>, _apply: bool) -> Result<bool> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fails_before_success {
            return Err(EngineError::CheckApply {
                vertex: self.base.name.clone(),
                attempt: attempt as u64,
                reason: "fails on purpose".to_string(),
            });
        }
        Ok(false)
    }
    fn cmp(&self, other: &dyn Res) -> bool {
        other.base().kind == "Flaky" && other.base().name == self.base.name
    }
}

fn ctx() -> Arc<Context> {
    Arc::new(Context::new("h1", false, PathBuf::from("/tmp"), Arc::new(MemoryKvStore::new())))
}

#[tokio::test]
async fn exhausts_retries_then_succeeds_and_advances_timestamp_once() {
    let attempts = Arc::new(AtomicU32::new(0));

    let mut graph = Graph::new();
    graph.add_vertex(Vertex::new(
        "flaky",
        "Flaky",
        Box::new(FlakyResource::new("flaky", 2, attempts.clone())),
    ));

    let (converger, _reeval_rx) = Converger::new(Duration::from_secs(5));
    let scheduler = Scheduler::spawn(graph, converger, |_id| ctx()).await;

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if attempts.load(Ordering::SeqCst) >= 3 {
                let g = scheduler.graph();
                let ts = g.vertex(g.find_by_name("flaky").unwrap()).unwrap().timestamp();
                if ts > 0 {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("the vertex should eventually succeed after retries and advance its timestamp");

    assert_eq!(attempts.load(Ordering::SeqCst), 3, "exactly 3 attempts total");

    // Let any further (spurious) retry pokes settle, then confirm the
    // timestamp never advances again — a cached `is_state_ok=true` skips
    // CheckApply on subsequent cycles.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 3, "no further attempts once state is OK");

    scheduler.shutdown(ShutdownTier::Graceful).await;
}
