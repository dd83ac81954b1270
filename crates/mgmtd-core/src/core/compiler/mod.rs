//! Graph compiler (C6): turns a raw user graph into the executable graph
//! via AutoEdges and AutoGrouping, and diffs successive executable graphs
//! on reload.

pub mod autoedges;
pub mod autogroup;
pub mod diff;

pub use diff::{diff as diff_graphs, DiffResult};

use crate::core::error::Result;
use crate::core::graph::Graph;

/// Runs both compiler passes. Each pass is internally idempotent, so one
/// sweep of each suffices to reach the combined fixpoint.
pub async fn compile(graph: &mut Graph) -> Result<()> {
    autoedges::run(graph).await?;
    autogroup::run(graph).await?;
    graph.assert_acyclic()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::Vertex;

    #[tokio::test]
    async fn compile_on_empty_graph_is_a_noop() {
        let mut g = Graph::new();
        g.add_vertex(Vertex::new_test("a"));
        compile(&mut g).await.unwrap();
        assert_eq!(g.len(), 1);
    }
}
