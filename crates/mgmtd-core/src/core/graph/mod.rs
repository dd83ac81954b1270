//! Graph model (C5): vertices, directed edges, topological walk,
//! incoming/outgoing neighbour queries, copy, DFS. Backed by
//! `petgraph::stable_graph::StableDiGraph` so vertex/edge removal doesn't
//! invalidate other indices (mirrors the design's "graph owns all
//! vertices, vertices reference neighbours by index" arena collapse, §9).

mod edge;
mod vertex;

pub use edge::Edge;
pub use vertex::{Vertex, VertexPhase, VertexState};

use crate::core::error::{EngineError, Result};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

pub type VertexId = NodeIndex;

#[derive(Default, Clone)]
pub struct Graph {
    inner: StableDiGraph<Vertex, Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            inner: StableDiGraph::new(),
        }
    }

    pub fn add_vertex(&mut self, vertex: Vertex) -> VertexId {
        self.inner.add_node(vertex)
    }

    pub fn remove_vertex(&mut self, id: VertexId) -> Option<Vertex> {
        self.inner.remove_node(id)
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.inner.node_weight(id)
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut Vertex> {
        self.inner.node_weight_mut(id)
    }

    pub fn vertex_ids(&self) -> Vec<VertexId> {
        self.inner.node_indices().collect()
    }

    /// Looks up a vertex's current id by name. Vertex ids are not stable
    /// across graph generations (each reload's diff rebuilds the graph
    /// from scratch), so long-lived tasks re-resolve their id by name
    /// every cycle instead of caching it.
    pub fn find_by_name(&self, name: &str) -> Option<VertexId> {
        self.inner
            .node_indices()
            .find(|id| self.inner[*id].name == name)
    }

    /// Adds a directed edge `from -> to`. Invariant: no duplicate edges
    /// between the same ordered pair, no self-loops.
    pub fn add_edge(&mut self, from: VertexId, to: VertexId, edge: Edge) -> Result<()> {
        if from == to {
            return Err(EngineError::Graph("self-loops are not allowed".into()));
        }
        if self.find_edge(from, to).is_some() {
            return Err(EngineError::Graph("duplicate edge".into()));
        }
        self.inner.add_edge(from, to, edge);
        Ok(())
    }

    pub fn find_edge(&self, from: VertexId, to: VertexId) -> Option<&Edge> {
        self.inner
            .find_edge(from, to)
            .and_then(|e| self.inner.edge_weight(e))
    }

    pub fn remove_edge(&mut self, from: VertexId, to: VertexId) -> Option<Edge> {
        self.inner
            .find_edge(from, to)
            .and_then(|e| self.inner.remove_edge(e))
    }

    pub fn incoming(&self, id: VertexId) -> Vec<(VertexId, &Edge)> {
        self.inner
            .edges_directed(id, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
            .collect()
    }

    pub fn outgoing(&self, id: VertexId) -> Vec<(VertexId, &Edge)> {
        self.inner
            .edges_directed(id, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
            .collect()
    }

    pub fn in_degree(&self, id: VertexId) -> usize {
        self.inner.edges_directed(id, Direction::Incoming).count()
    }

    pub fn out_degree(&self, id: VertexId) -> usize {
        self.inner.edges_directed(id, Direction::Outgoing).count()
    }

    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.inner)
    }

    /// Asserts acyclicity before the graph is handed to the scheduler.
    pub fn assert_acyclic(&self) -> Result<()> {
        if self.is_acyclic() {
            Ok(())
        } else {
            Err(EngineError::Graph("executable graph contains a cycle".into()))
        }
    }

    pub fn topological_order(&self) -> Result<Vec<VertexId>> {
        toposort(&self.inner, None)
            .map_err(|_| EngineError::Graph("cannot topologically sort a cyclic graph".into()))
    }

    /// Depth-first walk from `start`, visiting each reachable vertex once.
    pub fn dfs(&self, start: VertexId) -> Vec<VertexId> {
        use petgraph::visit::Dfs;
        let mut dfs = Dfs::new(&self.inner, start);
        let mut out = Vec::new();
        while let Some(n) = dfs.next(&self.inner) {
            out.push(n);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.inner.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn iter_vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex)> {
        self.inner.node_indices().map(move |id| (id, &self.inner[id]))
    }
}
