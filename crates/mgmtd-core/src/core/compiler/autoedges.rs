//! AutoEdges pass: for every vertex opted in via `MetaParams.auto_edge`,
//! drives its `AutoEdgeGen` to fixpoint, matching each candidate batch
//! against every other vertex's `GetUUIDs()` and wiring an edge per match.

use crate::core::graph::{Edge, Graph, VertexId};
use crate::core::error::Result;

/// Runs the AutoEdges pass to fixpoint (each vertex's generator is itself
/// driven to exhaustion, and the whole pass is idempotent on a converged
/// graph, so a single sweep over all vertices suffices).
pub async fn run(graph: &mut Graph) -> Result<()> {
    let ids = graph.vertex_ids();
    for v in ids {
        let vertex = match graph.vertex(v) {
            Some(vx) => vx.clone(),
            None => continue,
        };
        if !vertex.resource.lock().await.base().meta.auto_edge {
            continue;
        }
        let mut gen = match vertex.resource.lock().await.auto_edges() {
            Some(g) => g,
            None => continue,
        };

        loop {
            let batch = gen.next();
            if batch.is_empty() {
                break;
            }

            let mut results = Vec::with_capacity(batch.len());
            for candidate in &batch {
                let mut matched_any = false;
                let others = graph.vertex_ids();
                for u in others {
                    if u == v {
                        continue;
                    }
                    let uvertex = match graph.vertex(u) {
                        Some(vx) => vx.clone(),
                        None => continue,
                    };
                    let uuids = uvertex.resource.lock().await.get_uuids();
                    if !uuids.iter().any(|uuid| candidate.matches(uuid)) {
                        continue;
                    }
                    matched_any = true;
                    let (from, to) = if candidate.reversed { (v, u) } else { (u, v) };
                    try_add_edge_acyclic(graph, from, to);
                }
                results.push(matched_any);
            }

            if !gen.test(&results) {
                break;
            }
        }
    }
    Ok(())
}

/// Adds `from -> to` unless it would duplicate an existing edge or create a
/// cycle; silently skips otherwise, per the design's minimal-edge-set rule.
fn try_add_edge_acyclic(graph: &mut Graph, from: VertexId, to: VertexId) {
    if graph.find_edge(from, to).is_some() {
        return;
    }
    if graph.add_edge(from, to, Edge::new("autoedge", false)).is_err() {
        return;
    }
    if !graph.is_acyclic() {
        graph.remove_edge(from, to);
    }
}
