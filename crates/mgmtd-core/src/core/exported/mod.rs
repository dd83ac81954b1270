//! Exported-resource exchange (C8).
//!
//! Publishes a host's exported resources to the external KV store in a
//! single transaction (so peers observe at most one watch event per
//! reload) and collects peers' resources by watching the shared prefix.
//! The KV store itself is an external collaborator; [`KvStore`] is the
//! contract the core consumes, per §6.

mod kv;
mod memory;

pub use kv::{KvEvent, KvStore, KvTxn, KvTxnCond};
pub use memory::MemoryKvStore;

use crate::core::error::{EngineError, Result};
use crate::core::resource::ResourceUuidKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const NAMESPACE: &str = "_mgmt";

/// Opaque encoded resource as exchanged through the KV store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportedResource {
    pub kind: String,
    pub name: String,
    pub payload: Vec<u8>,
}

pub fn exported_key(hostname: &str, kind: &str, name: &str) -> String {
    format!("/{NAMESPACE}/exported/{hostname}/resources/{kind}/{name}")
}

fn exported_prefix(ns: &str) -> String {
    format!("/{ns}/exported/")
}

/// The prefix a caller should pass to [`KvStore::watch`] to observe every
/// exported-resource publish/delete under the default namespace.
pub fn watch_prefix() -> String {
    exported_prefix(NAMESPACE)
}

/// Publishes the host's exported set as one transaction: asserts
/// "value equals current encoding or key absent" for every resource, and
/// deletes any previously-published key that is no longer present locally.
pub async fn publish(
    store: &dyn KvStore,
    hostname: &str,
    previous_keys: &[String],
    resources: &[ExportedResource],
) -> Result<Vec<String>> {
    let mut conds = Vec::new();
    let mut puts = Vec::new();
    let mut new_keys = Vec::new();

    for r in resources {
        let key = exported_key(hostname, &r.kind, &r.name);
        let value = bincode::serialize(r).map_err(|e| EngineError::KvPermanent(e.to_string()))?;
        conds.push(KvTxnCond::ValueEqualsOrAbsent {
            key: key.clone(),
            value: value.clone(),
        });
        puts.push((key.clone(), value));
        new_keys.push(key);
    }

    let deletes: Vec<String> = previous_keys
        .iter()
        .filter(|k| !new_keys.contains(k))
        .cloned()
        .collect();

    store
        .txn(KvTxn {
            conditions: conds,
            puts,
            deletes,
        })
        .await?;

    Ok(new_keys)
}

/// Decodes every value under the exported prefix into a resource map,
/// filtered by hostname/kind patterns. Falls back to a full re-read if the
/// caller reports an inconsistent incremental delta.
pub async fn collect(
    store: &dyn KvStore,
    hostname_filter: Option<&str>,
    kind_filter: Option<&str>,
) -> Result<Vec<ExportedResource>> {
    let raw = store.get_prefix(&exported_prefix(NAMESPACE)).await?;
    let mut out = Vec::new();
    for (key, value) in raw {
        if let Some(h) = hostname_filter {
            if !key.contains(&format!("/exported/{h}/")) {
                continue;
            }
        }
        let resource: ExportedResource =
            bincode::deserialize(&value).map_err(|_| EngineError::ApplyDeltaInconsistent)?;
        if let Some(k) = kind_filter {
            if resource.kind != k {
                continue;
            }
        }
        out.push(resource);
    }
    Ok(out)
}

/// Re-derives a [`crate::core::resource::ResourceUuid`] match key for an
/// exported resource's File-kind payload, used when collected resources
/// feed back into AutoEdges.
pub fn collected_file_uuid(r: &ExportedResource) -> Option<ResourceUuidKind> {
    if r.kind == "File" {
        serde_json::from_slice::<HashMap<String, String>>(&r.payload)
            .ok()
            .and_then(|m| m.get("path").cloned())
            .map(|path| ResourceUuidKind::File { path })
    } else {
        None
    }
}

pub fn hostname_cancel_cohort() -> Arc<parking_lot::RwLock<Vec<String>>> {
    Arc::new(parking_lot::RwLock::new(Vec::new()))
}

/// Decodes every collected resource whose kind is registered, producing
/// the virtual vertices §4.8 says get fed into the graph compiler on the
/// next reload cycle. Resources whose kind the registry doesn't support
/// (no local adapter to reconstruct them against) are skipped and logged,
/// not treated as a failure.
pub fn decode_all(
    registry: &crate::core::registry::ResourceRegistry,
    resources: &[ExportedResource],
) -> Vec<crate::core::graph::Vertex> {
    resources
        .iter()
        .filter_map(|r| match registry.decode(&r.kind, &r.payload) {
            Ok(res) => Some(crate::core::graph::Vertex::new(
                r.name.clone(),
                kind_str(&r.kind),
                res,
            )),
            Err(e) => {
                tracing::debug!(kind = %r.kind, name = %r.name, error = %e, "skipping undecodable exported resource");
                None
            }
        })
        .collect()
}

/// Merges virtual vertices collected from peers into a freshly-loaded
/// local graph, skipping any name that the local graph already defines
/// (a locally-declared resource always wins over a same-named import).
pub fn merge_into(base: &mut crate::core::graph::Graph, virtual_vertices: Vec<crate::core::graph::Vertex>) {
    for v in virtual_vertices {
        if base.find_by_name(&v.name).is_none() {
            base.add_vertex(v);
        }
    }
}

fn kind_str(kind: &str) -> &'static str {
    match kind {
        "File" => "File",
        "Pkg" => "Pkg",
        "Svc" => "Svc",
        "Timer" => "Timer",
        "Exec" => "Exec",
        "Noop" => "Noop",
        _ => "Unknown",
    }
}
