//! Top-level lifecycle (C9): load -> validate -> compile -> diff vs.
//! running graph -> apply diff -> install converger state function ->
//! wait for either the converger to fire with `MaxRuntime` set, an
//! external deploy notification (reload), or a shutdown signal.
//!
//! Graph loading and native signal capture are both owned by the
//! embedding front-end: `mgmtd-cli` wires [`crate::core::signals::install`]
//! into the `shutdown_rx` this module consumes, and owns the on-disk graph
//! format (YAML today, a future `mcl` front-end tomorrow). This module
//! only consumes an already-built [`Graph`] and a channel of
//! [`ShutdownTier`]s, which keeps it testable without raising real OS
//! signals.

use crate::core::compiler;
use crate::core::config::EngineConfig;
use crate::core::converger::{Converger, ControlMsg};
use crate::core::error::Result;
use crate::core::exported::{self, KvStore};
use crate::core::graph::{Graph, VertexId};
use crate::core::metrics::Metrics;
use crate::core::registry::ResourceRegistry;
use crate::core::resource::Context;
use crate::core::scheduler::{Scheduler, ShutdownTier};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Why [`Lifecycle::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// The cluster stayed converged for `MaxRuntime` and shut down cleanly.
    MaxRuntimeExceeded,
    /// SIGINT/SIGTERM (or the embedding caller's own shutdown request).
    ShutdownRequested,
}

/// Owns the engine's configuration and runtime counters across its whole
/// lifetime; `run` is the entry point `mgmtd-cli::main` calls once it has
/// parsed `EngineConfig` and loaded the initial graph.
pub struct Lifecycle {
    config: EngineConfig,
    metrics: Metrics,
}

impl Lifecycle {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            metrics: Metrics::new(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    async fn validate(&self, graph: &Graph) -> Result<()> {
        for (_, vertex) in graph.iter_vertices() {
            vertex.resource.lock().await.validate()?;
        }
        Ok(())
    }

    /// Runs the engine to completion. `make_context` builds a fresh
    /// [`Context`] for each vertex id the scheduler spawns or adds on
    /// reload; `reload_rx` carries freshly-loaded graphs from whatever
    /// triggers a reload (a file watch on the graph source, an exported-
    /// resource collection cycle via [`Self::spawn_export_collector`], or
    /// any other deploy-notification mechanism the embedder wires up).
    /// `shutdown_rx` is the tiered shutdown signal; `mgmtd-cli` wires it to
    /// [`crate::core::signals::install`], tests wire it to a plain channel.
    pub async fn run<F>(
        &self,
        mut graph: Graph,
        mut reload_rx: mpsc::Receiver<Graph>,
        mut shutdown_rx: mpsc::Receiver<ShutdownTier>,
        mut make_context: F,
    ) -> Result<LifecycleOutcome>
    where
        F: FnMut(VertexId) -> Arc<Context> + Clone,
    {
        self.validate(&graph).await?;
        compiler::compile(&mut graph).await?;

        let (converger, reeval_rx) = Converger::new(self.config.converged_timeout);
        let scheduler = Scheduler::spawn(graph, converger.clone(), make_context.clone()).await;
        scheduler.start_all().await?;

        let (control_tx, control_rx) = watch::channel(ControlMsg::Run);
        let (converged_tx, converged_rx) = watch::channel(false);
        let metrics = self.metrics.clone();
        let loop_converger = converger.clone();
        let converger_task: JoinHandle<()> = tokio::spawn(async move {
            loop_converger
                .run_loop(control_rx, reeval_rx, move |now| {
                    metrics.set_converged(now);
                    metrics.report();
                    let _ = converged_tx.send(now);
                    Ok(())
                })
                .await;
        });

        let mut max_runtime_rx = spawn_max_runtime_watcher(self.config.max_runtime, converged_rx);

        let outcome = loop {
            tokio::select! {
                Some(next_graph) = reload_rx.recv() => {
                    let mut next_graph = next_graph;
                    if let Err(e) = compiler::compile(&mut next_graph).await {
                        tracing::error!(error = %e, "reload: new graph failed to compile, keeping current graph running");
                        continue;
                    }
                    let current = scheduler.graph();
                    let diff = compiler::diff_graphs(&current, &mut next_graph).await;
                    tracing::info!(keep = diff.keep.len(), add = diff.add.len(), remove = diff.remove.len(), "applying reload");
                    scheduler.apply_diff(next_graph, diff, make_context.clone()).await;
                }
                _ = max_runtime_rx.recv() => {
                    tracing::info!("converged continuously past max_runtime, shutting down");
                    let _ = control_tx.send(ControlMsg::Pause);
                    scheduler.shutdown(ShutdownTier::Graceful).await;
                    break LifecycleOutcome::MaxRuntimeExceeded;
                }
                Some(tier) = shutdown_rx.recv() => {
                    tracing::info!(?tier, "shutdown requested");
                    let _ = control_tx.send(ControlMsg::Pause);
                    scheduler.shutdown(tier).await;
                    break LifecycleOutcome::ShutdownRequested;
                }
            }
        };

        converger_task.abort();
        Ok(outcome)
    }

    /// Wires the exported-resource exchange (C8) into the reload path:
    /// watches the KV store's exported prefix, and on every event
    /// re-collects the full subtree, decodes whatever the registry
    /// supports into virtual vertices, merges them onto a freshly-built
    /// local graph, and sends the result to `reload_tx` for [`Self::run`]
    /// to pick up on its next loop iteration. `base_graph` rebuilds the
    /// locally-authored graph (without peer resources) so each reload
    /// starts from the declared topology, not the previous reload's
    /// already-merged one.
    pub fn spawn_export_collector<F>(
        kv: Arc<dyn KvStore>,
        registry: Arc<ResourceRegistry>,
        reload_tx: mpsc::Sender<Graph>,
        mut base_graph: F,
    ) -> JoinHandle<()>
    where
        F: FnMut() -> Graph + Send + 'static,
    {
        tokio::spawn(async move {
            let mut events = kv.watch(&exported::watch_prefix());
            loop {
                match events.recv().await {
                    Ok(_) => match exported::collect(&*kv, None, None).await {
                        Ok(resources) => {
                            let virtual_vertices = exported::decode_all(&registry, &resources);
                            let mut graph = base_graph();
                            exported::merge_into(&mut graph, virtual_vertices);
                            if reload_tx.send(graph).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "exported-resource collection failed");
                        }
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
        })
    }
}

/// Fires once on `rx.recv()` after the cluster has been *continuously*
/// converged for `max_runtime`. Restarts its internal timer if the
/// cluster un-converges before it fires; never fires if `max_runtime` is
/// `None`.
fn spawn_max_runtime_watcher(
    max_runtime: Option<Duration>,
    mut converged_rx: watch::Receiver<bool>,
) -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);
    let Some(max_runtime) = max_runtime else {
        return rx;
    };
    tokio::spawn(async move {
        loop {
            while !*converged_rx.borrow() {
                if converged_rx.changed().await.is_err() {
                    return;
                }
            }
            let sleep = tokio::time::sleep(max_runtime);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => {
                        let _ = tx.send(()).await;
                        return;
                    }
                    changed = converged_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        if !*converged_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        }
    });
    rx
}
