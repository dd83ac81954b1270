//! Resource trait surface (C3): the abstract capability set every resource
//! variant implements. A single `Res` trait plus a shared `ResourceBase`
//! struct replace the source's deep BaseRes -> KindRes -> Res inheritance;
//! optional behaviours (Interruptable, Copyable, Compatible) are separate
//! traits a kind may additionally implement.

pub mod autoedge;
pub mod context;
pub mod meta;
pub mod uuid;

pub use autoedge::AutoEdgeGen;
pub use context::Context;
pub use meta::MetaParams;
pub use uuid::{ResourceUuid, ResourceUuidKind};

use crate::core::error::Result;
use std::sync::Arc;

/// Fields common to every resource kind. Invariants: `name` non-empty,
/// `kind` non-empty.
#[derive(Debug, Clone)]
pub struct ResourceBase {
    pub name: String,
    pub kind: &'static str,
    pub meta: MetaParams,
}

impl ResourceBase {
    pub fn new(name: impl Into<String>, kind: &'static str) -> Self {
        Self {
            name: name.into(),
            kind,
            meta: MetaParams::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(crate::core::error::EngineError::Validation {
                name: self.name.clone(),
                reason: "name must not be empty".to_string(),
            });
        }
        if self.kind.is_empty() {
            return Err(crate::core::error::EngineError::Validation {
                name: self.name.clone(),
                reason: "kind must not be empty".to_string(),
            });
        }
        self.meta.validate().map_err(|reason| crate::core::error::EngineError::Validation {
            name: self.name.clone(),
            reason,
        })
    }
}

/// The capability every resource kind implements.
#[async_trait::async_trait]
pub trait Res: Send + Sync {
    fn base(&self) -> &ResourceBase;

    /// Enables a kind-specific downcast (e.g. `PkgResource::group_cmp`
    /// comparing two vertices' `PkgState`) without growing the trait
    /// surface with per-kind accessors.
    fn as_any(&self) -> &dyn std::any::Any;

    fn validate(&self) -> Result<()> {
        self.base().validate()
    }

    async fn init(&mut self, ctx: Arc<Context>) -> Result<()>;

    /// Long-running: arms watches, signals `running` exactly once, then
    /// drains `events` until exit, calling `on_event` whenever a state
    /// change is observed upstream.
    async fn watch(
        &mut self,
        ctx: Arc<Context>,
        running: tokio::sync::oneshot::Sender<()>,
        on_event: tokio::sync::mpsc::Sender<()>,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<()>;

    /// `apply = false`: inspect only. Returns `Ok(true)` iff state is
    /// already correct; `Ok(false)` after a successful fix.
    async fn check_apply(&mut self, ctx: Arc<Context>, apply: bool) -> Result<bool>;

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stricter equality used by graph-diff's `keep` classification.
    fn cmp(&self, other: &dyn Res) -> bool;

    /// UUIDs this resource exposes for other vertices' AutoEdges matching.
    fn get_uuids(&self) -> Vec<ResourceUuid> {
        vec![]
    }

    /// Generator for this vertex's own AutoEdges pass, if `meta.auto_edge`.
    fn auto_edges(&self) -> Option<Box<dyn AutoEdgeGen>> {
        None
    }

    /// Compares this vertex against another of the same kind for
    /// AutoGrouping purposes (only called when both opt in).
    fn group_cmp(&self, _other: &dyn Res) -> bool {
        false
    }

    /// This resource's interrupt capability, if it implements one.
    /// Default: none. Queried only by the hard-shutdown tier.
    fn as_interruptable(&mut self) -> Option<&mut dyn Interruptable> {
        None
    }

    /// This resource's grouping-merge capability, if it implements one.
    /// Default: none. Queried only by AutoGrouping, on the survivor of a
    /// `group_cmp` match, to fold the absorbed vertex's resource in rather
    /// than discarding it.
    fn as_compatible(&mut self) -> Option<&mut dyn Compatible> {
        None
    }
}

/// Quick-cancel capability for resources whose CheckApply can be
/// interrupted mid-flight (used by the hard-shutdown tier).
pub trait Interruptable {
    fn interrupt(&mut self);
}

/// Deep-copy capability, used when the compiler needs an independent
/// instance (e.g. diff comparisons that must not alias runtime state).
pub trait Copyable: Res {
    fn copy_res(&self) -> Box<dyn Res>;
}

/// Two vertices of the same kind that opt into grouping must also agree on
/// whether they are mutually compatible beyond `group_cmp`, and how to
/// merge once matched. `merge` folds `other`'s state into `self` so the
/// survivor's `CheckApply` covers both; `other`'s vertex is then dropped
/// from the graph, so nothing besides this call ever sees it again.
pub trait Compatible: Res {
    fn adapts(&self, other: &dyn Res) -> bool;
    fn merge(&mut self, other: &dyn Res);
}
