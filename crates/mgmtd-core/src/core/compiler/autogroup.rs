//! AutoGrouping pass: merges same-kind vertices that both opt into
//! `MetaParams.auto_group` and agree via `Res::group_cmp`, moving the
//! merged vertex's edges onto the survivor and recording its name in the
//! survivor's `group`. Runs to fixpoint so a chain of mutual matches
//! collapses into one vertex regardless of input order.

use crate::core::graph::{Edge, Graph, VertexId};
use crate::core::error::Result;

pub async fn run(graph: &mut Graph) -> Result<()> {
    loop {
        if !pass(graph).await? {
            return Ok(());
        }
    }
}

/// One merge pass. Returns whether any merge happened.
async fn pass(graph: &mut Graph) -> Result<bool> {
    let mut ids = graph.vertex_ids();
    // Stable tie-break: lowest name becomes the merge survivor.
    ids.sort_by(|a, b| {
        graph.vertex(*a).unwrap().name.cmp(&graph.vertex(*b).unwrap().name)
    });

    for i in 0..ids.len() {
        let v = ids[i];
        let Some(vvertex) = graph.vertex(v).cloned() else {
            continue;
        };
        if !vvertex.resource.lock().await.base().meta.auto_group {
            continue;
        }

        for w in ids.iter().skip(i + 1).copied() {
            let Some(wvertex) = graph.vertex(w).cloned() else {
                continue;
            };
            if vvertex.kind != wvertex.kind {
                continue;
            }
            if !wvertex.resource.lock().await.base().meta.auto_group {
                continue;
            }

            let matched = {
                let vres = vvertex.resource.lock().await;
                let wres = wvertex.resource.lock().await;
                vres.group_cmp(&**wres)
            };
            if !matched {
                continue;
            }

            merge(graph, v, w, &vvertex, &wvertex).await;
            return Ok(true);
        }
    }
    Ok(false)
}

/// Folds `w` into `v`: moves `w`'s edges onto `v`, records `w`'s name in
/// `v.group`, and — if the survivor's resource implements `Compatible` —
/// folds `w`'s resource state into it via `Compatible::merge` so `v`'s
/// `CheckApply` covers both members instead of only its own. `w`'s
/// resource is never consulted again after this call.
async fn merge(graph: &mut Graph, v: VertexId, w: VertexId, vvertex: &crate::core::graph::Vertex, wvertex: &crate::core::graph::Vertex) {
    for (src, edge) in graph.incoming(w).into_iter().map(|(s, e)| (s, e.clone())) {
        if src != v && graph.find_edge(src, v).is_none() {
            let _ = graph.add_edge(src, v, edge);
        }
    }
    for (dst, edge) in graph.outgoing(w).into_iter().map(|(d, e)| (d, e.clone())) {
        if dst != v && graph.find_edge(v, dst).is_none() {
            let _ = graph.add_edge(v, dst, edge);
        }
    }

    {
        let mut vres = vvertex.resource.lock().await;
        let wres = wvertex.resource.lock().await;
        if let Some(compatible) = vres.as_compatible() {
            compatible.merge(&**wres);
        }
    }

    {
        let mut group = vvertex.group.write();
        group.push(wvertex.name.clone());
        group.extend(wvertex.group.read().iter().cloned());
    }
    vvertex.state.is_grouped.store(false, std::sync::atomic::Ordering::SeqCst);

    graph.remove_vertex(w);
}
