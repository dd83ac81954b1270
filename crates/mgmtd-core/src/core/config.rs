//! Engine configuration (§6 expansion): the parsed CLI/env surface that
//! `mgmtd-cli` hands to `core::lifecycle::run`. Kept as a plain struct so
//! `mgmtd-core` stays independent of `clap` — the CLI crate owns parsing
//! and env-var binding, this crate only owns what the values mean.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the compiled resource graph. The on-disk format is an
    /// external collaborator; `mgmtd-core` only consumes an already
    /// constructed `Graph`.
    pub graph_path: PathBuf,
    /// How long a converger id may sit idle before it's marked converged.
    pub converged_timeout: Duration,
    /// Optional hard ceiling on total runtime; the lifecycle exits once
    /// the cluster has been converged continuously past this point.
    pub max_runtime: Option<Duration>,
    /// Inspect-only mode: CheckApply never calls through with `apply = true`.
    pub noop: bool,
    pub hostname: String,
    /// Seed addresses for the KV store's adapter (opaque to this crate).
    pub seeds: Vec<String>,
    /// Namespace prefix under which exported resources are published.
    pub prefix: String,
    /// Directory each vertex's `Context::var_dir` is rooted under.
    pub tmp_prefix: PathBuf,
    /// Disables the KV server side of this node; it still participates as
    /// a client.
    pub no_server: bool,
    pub ideal_cluster_size: usize,
    /// Accepted for compatibility with the original CLI surface; profiling
    /// hookup is out of scope.
    pub pprof_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            graph_path: PathBuf::from("graph.yaml"),
            converged_timeout: Duration::from_secs(30),
            max_runtime: None,
            noop: false,
            hostname: "localhost".to_string(),
            seeds: Vec::new(),
            prefix: "/mgmt".to_string(),
            tmp_prefix: PathBuf::from("/var/lib/mgmtd"),
            no_server: false,
            ideal_cluster_size: 5,
            pprof_path: None,
        }
    }
}
