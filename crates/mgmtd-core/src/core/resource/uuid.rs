//! Per-resource identity used exclusively by AutoEdge matching.
//!
//! Each kind defines its own UUID payload (`ResourceUuidKind`). Two UUIDs
//! match iff their kinds agree and the kind-specific IFF test passes.
//! `reversed` flips the direction of the edge the matcher wants: normally
//! the matched peer becomes the prerequisite (`peer -> self`); a reversed
//! UUID asks for `self -> peer` instead.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceUuidKind {
    File { path: String },
    Pkg { file_paths: Vec<String> },
    Svc { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUuid {
    pub kind: ResourceUuidKind,
    pub reversed: bool,
}

impl ResourceUuid {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            kind: ResourceUuidKind::File { path: path.into() },
            reversed: false,
        }
    }

    pub fn pkg(file_paths: Vec<String>) -> Self {
        Self {
            kind: ResourceUuidKind::Pkg { file_paths },
            reversed: false,
        }
    }

    pub fn svc(name: impl Into<String>) -> Self {
        Self {
            kind: ResourceUuidKind::Svc { name: name.into() },
            reversed: false,
        }
    }

    pub fn reversed(mut self) -> Self {
        self.reversed = true;
        self
    }

    /// The IFF test: true iff `self` (a candidate from one vertex's
    /// `AutoEdges` generator) matches `other` (from another vertex's
    /// `GetUUIDs`).
    pub fn matches(&self, other: &ResourceUuid) -> bool {
        match (&self.kind, &other.kind) {
            (ResourceUuidKind::File { path: a }, ResourceUuidKind::File { path: b }) => a == b,
            (ResourceUuidKind::Pkg { file_paths }, ResourceUuidKind::File { path }) => {
                file_paths.iter().any(|p| Self::path_eq(p, path))
            }
            (ResourceUuidKind::File { path }, ResourceUuidKind::Pkg { file_paths }) => {
                file_paths.iter().any(|p| Self::path_eq(p, path))
            }
            (ResourceUuidKind::Svc { name: a }, ResourceUuidKind::Svc { name: b }) => a == b,
            _ => false,
        }
    }

    /// Compares two filesystem paths ignoring a trailing slash, so a
    /// package's owned-directory entry (conventionally slash-terminated)
    /// matches the slash-free ancestor a `File`'s `AncestorWalk` yields.
    fn path_eq(a: &str, b: &str) -> bool {
        a.trim_end_matches('/') == b.trim_end_matches('/')
    }
}
