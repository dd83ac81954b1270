//! The lazy generator protocol `AutoEdges()` returns: a finite sequence of
//! candidate-UUID batches, paired with a feedback call so the generator can
//! narrow subsequent batches (e.g. stop walking parent directories once one
//! has matched).

use crate::core::resource::uuid::ResourceUuid;

/// One step of an AutoEdge generator.
pub trait AutoEdgeGen: Send {
    /// Returns the next batch of candidate UUIDs, or an empty vec to stop.
    fn next(&mut self) -> Vec<ResourceUuid>;

    /// Feedback: `results[i]` is true iff `next()`'s i-th candidate found a
    /// match somewhere in the graph. Returning false from `test` here (as
    /// tracked by the caller) also stops the generator.
    fn test(&mut self, results: &[bool]) -> bool;
}

/// A generator that yields its candidates in a single batch and always
/// stops after one round — the common case for kinds with a fixed UUID set
/// (Svc, Pkg).
pub struct SingleBatch {
    batch: Option<Vec<ResourceUuid>>,
}

impl SingleBatch {
    pub fn new(batch: Vec<ResourceUuid>) -> Self {
        Self { batch: Some(batch) }
    }
}

impl AutoEdgeGen for SingleBatch {
    fn next(&mut self) -> Vec<ResourceUuid> {
        self.batch.take().unwrap_or_default()
    }

    fn test(&mut self, _results: &[bool]) -> bool {
        false
    }
}

/// A generator that walks a filesystem path upward one ancestor per batch,
/// stopping as soon as a batch matches (per the File-kind ancestry rule in
/// the design) or the root is reached. Tracks the last-yielded path itself
/// so `test()` can advance to its parent without help from the caller.
pub struct AncestorWalk {
    next_candidate: Option<String>,
    last_yielded: Option<String>,
}

impl AncestorWalk {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            next_candidate: Some(path.into()),
            last_yielded: None,
        }
    }

    fn parent_of(path: &str) -> Option<String> {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.rfind('/') {
            Some(0) => Some("/".to_string()),
            Some(idx) => Some(trimmed[..idx].to_string()),
            None => None,
        }
    }
}

impl AutoEdgeGen for AncestorWalk {
    fn next(&mut self) -> Vec<ResourceUuid> {
        match self.next_candidate.take() {
            Some(p) => {
                self.last_yielded = Some(p.clone());
                vec![ResourceUuid::file(p)]
            }
            None => vec![],
        }
    }

    fn test(&mut self, results: &[bool]) -> bool {
        if results.iter().any(|m| *m) {
            // Matched: stop walking further up.
            self.next_candidate = None;
            return false;
        }
        match self.last_yielded.take() {
            Some(last) => {
                self.next_candidate = Self::parent_of(&last);
                self.next_candidate.is_some()
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_batch_yields_once_then_stops() {
        let mut gen = SingleBatch::new(vec![ResourceUuid::svc("sshd")]);
        assert_eq!(gen.next().len(), 1);
        assert_eq!(gen.next().len(), 0);
        assert!(!gen.test(&[true]));
    }

    #[test]
    fn ancestor_walk_stops_when_matched() {
        let mut gen = AncestorWalk::new("/etc/foo/bar");
        let batch = gen.next();
        assert_eq!(batch.len(), 1);
        assert!(!gen.test(&[true]));
        assert_eq!(gen.next().len(), 0);
    }

    #[test]
    fn ancestor_walk_advances_to_parent_on_miss() {
        let mut gen = AncestorWalk::new("/etc/foo/bar");
        let _ = gen.next();
        assert!(gen.test(&[false]));
        let batch = gen.next();
        assert_eq!(batch[0], ResourceUuid::file("/etc/foo"));
    }

    #[test]
    fn ancestor_walk_stops_at_root() {
        let mut gen = AncestorWalk::new("/a");
        let _ = gen.next(); // "/a"
        assert!(gen.test(&[false])); // advances to "/"
        let _ = gen.next(); // "/"
        assert!(!gen.test(&[false])); // no parent beyond root
        assert_eq!(gen.next().len(), 0);
    }
}
