//! Graph diff (§4.6): classifies `next`'s vertices against the previous
//! executable graph into `keep` / `add` / `remove`, using `Res::cmp` for
//! equivalence. `keep` vertices have `next`'s entry replaced by the
//! `current` vertex itself so the live timestamp/`is_state_ok` survive the
//! reload untouched.

use crate::core::graph::{Graph, Vertex, VertexId};

pub struct DiffResult {
    /// Vertex ids (in `next`) whose live state was retained from `current`.
    pub keep: Vec<VertexId>,
    /// Vertex ids (in `next`) that need a fresh `Init` + `Watch` task.
    pub add: Vec<VertexId>,
    /// Vertices only present in `current`; the caller sends them `exit`.
    pub remove: Vec<Vertex>,
}

pub async fn diff(current: &Graph, next: &mut Graph) -> DiffResult {
    let mut matched_current: Vec<bool> = vec![false; 0];
    let current_ids = current.vertex_ids();
    matched_current.resize(current_ids.len(), false);

    let mut keep = Vec::new();
    let mut add = Vec::new();

    for next_id in next.vertex_ids() {
        let next_vertex = next.vertex(next_id).unwrap().clone();
        let mut found = None;

        for (idx, cur_id) in current_ids.iter().enumerate() {
            if matched_current[idx] {
                continue;
            }
            let cur_vertex = current.vertex(*cur_id).unwrap();
            if cur_vertex.kind != next_vertex.kind {
                continue;
            }
            let equivalent = {
                let next_res = next_vertex.resource.lock().await;
                let cur_res = cur_vertex.resource.lock().await;
                cur_res.cmp(&**next_res)
            };
            if equivalent {
                found = Some((idx, cur_vertex.clone()));
                break;
            }
        }

        match found {
            Some((idx, cur_vertex)) => {
                matched_current[idx] = true;
                if let Some(slot) = next.vertex_mut(next_id) {
                    *slot = cur_vertex;
                }
                keep.push(next_id);
            }
            None => add.push(next_id),
        }
    }

    let remove = current_ids
        .iter()
        .enumerate()
        .filter(|(idx, _)| !matched_current[*idx])
        .map(|(_, id)| current.vertex(*id).unwrap().clone())
        .collect();

    DiffResult { keep, add, remove }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::Vertex;

    #[tokio::test]
    async fn unchanged_vertex_is_kept_with_state() {
        let mut current = Graph::new();
        let va = Vertex::new_test("a");
        va.set_timestamp(42);
        current.add_vertex(va);

        let mut next = Graph::new();
        next.add_vertex(Vertex::new_test("a"));

        let result = diff(&current, &mut next).await;
        assert_eq!(result.keep.len(), 1);
        assert_eq!(result.add.len(), 0);
        assert_eq!(result.remove.len(), 0);

        let kept = next.vertex(result.keep[0]).unwrap();
        assert_eq!(kept.timestamp(), 42);
    }

    #[tokio::test]
    async fn new_vertex_is_added() {
        let current = Graph::new();
        let mut next = Graph::new();
        next.add_vertex(Vertex::new_test("a"));

        let result = diff(&current, &mut next).await;
        assert_eq!(result.add.len(), 1);
        assert_eq!(result.keep.len(), 0);
    }

    #[tokio::test]
    async fn removed_vertex_is_reported() {
        let mut current = Graph::new();
        current.add_vertex(Vertex::new_test("a"));
        let mut next = Graph::new();

        let result = diff(&current, &mut next).await;
        assert_eq!(result.remove.len(), 1);
        assert_eq!(result.remove[0].name, "a");
    }
}
