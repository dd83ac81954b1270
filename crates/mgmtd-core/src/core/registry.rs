//! Registry of per-kind resource decode functions.
//!
//! The source's global mutable registry of kind constructors (§9 design
//! note) becomes this explicit, constructed value: a map from `Kind` to a
//! `Default()`-style factory (§4.3) that turns a collected
//! [`crate::core::exported::ExportedResource`] payload back into a boxed
//! [`Res`]. Kinds backed by an external adapter (`Pkg`/`Svc`/`Exec`) need a
//! backend trait object at construction time and so can't be decoded
//! generically from bytes; only `File` registers here today.

use crate::core::error::{EngineError, Result};
use crate::core::resource::Res;
use std::collections::HashMap;

pub type DecodeFn = fn(&[u8]) -> Result<Box<dyn Res>>;

#[derive(Default)]
pub struct ResourceRegistry {
    decoders: HashMap<&'static str, DecodeFn>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: &'static str, f: DecodeFn) {
        self.decoders.insert(kind, f);
    }

    pub fn decode(&self, kind: &str, payload: &[u8]) -> Result<Box<dyn Res>> {
        let f = self
            .decoders
            .get(kind)
            .ok_or_else(|| EngineError::Graph(format!("no decoder registered for kind {kind}")))?;
        f(payload)
    }

    pub fn supports(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    /// The registry `mgmtd-cli` installs by default: every self-contained
    /// kind this crate can fully reconstruct without an external adapter.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        reg.register("File", crate::core::resources::file::decode);
        reg
    }
}
