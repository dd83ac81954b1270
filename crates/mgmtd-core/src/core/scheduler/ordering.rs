//! The timestamp-ordering discipline (§4.7): a vertex may enter
//! `CheckApply` only once every prerequisite has moved strictly ahead of
//! it. Locked to the strict `<` form per the design's resolution of the
//! source's `>=`/`>` discrepancy (§9 note c, DESIGN.md).

use crate::core::graph::{Graph, VertexId};

/// True iff `v.timestamp < u.timestamp` holds for every incoming edge
/// `u -> v`. Vacuously true for a vertex with no prerequisites.
pub fn ok_timestamp(graph: &Graph, v: VertexId) -> bool {
    let own = match graph.vertex(v) {
        Some(vx) => vx.timestamp(),
        None => return true,
    };
    graph
        .incoming(v)
        .into_iter()
        .all(|(u, _edge)| match graph.vertex(u) {
            Some(ux) => own < ux.timestamp(),
            None => true,
        })
}
