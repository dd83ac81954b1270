//! Command-line front-end for the `mgmtd` resource graph engine.
//!
//! Owns everything `mgmtd-core` deliberately stays ignorant of: argument
//! parsing, logging setup, the on-disk graph format, and wiring a concrete
//! `KvStore` into the engine.

mod graph_spec;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use mgmtd_core::core::config::EngineConfig;
use mgmtd_core::core::exported::{KvStore, MemoryKvStore};
use mgmtd_core::core::lifecycle::Lifecycle;
use mgmtd_core::core::registry::ResourceRegistry;
use mgmtd_core::core::resource::Context;
use mgmtd_core::core::signals;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mgmtd")]
#[command(author, version, about = "Event-driven resource graph engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine against a resource graph until it converges forever,
    /// hits `--max-runtime`, or receives a shutdown signal.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Path to the resource graph to load.
    #[arg(long, env = "MGMT_GRAPH", default_value = "graph.yaml")]
    graph: PathBuf,

    /// Seconds a resource may sit idle before it's considered converged.
    #[arg(long, env = "MGMT_CONVERGED_TIMEOUT", default_value_t = 30)]
    converged_timeout: u64,

    /// Exit once the cluster has been converged continuously for this
    /// many seconds. Unset runs forever.
    #[arg(long, env = "MGMT_MAX_RUNTIME")]
    max_runtime: Option<u64>,

    /// Inspect-only: CheckApply never applies changes.
    #[arg(long, env = "MGMT_NOOP")]
    noop: bool,

    /// This node's hostname, used to namespace its exported resources.
    #[arg(long, env = "MGMT_HOSTNAME")]
    hostname: Option<String>,

    /// Seed addresses for the exported-resource KV store's adapter.
    #[arg(long, env = "MGMT_SEEDS", value_delimiter = ',')]
    seeds: Vec<String>,

    /// Namespace prefix under which exported resources are published.
    #[arg(long, env = "MGMT_PREFIX", default_value = "/mgmt")]
    prefix: String,

    /// Directory each vertex's scratch space is rooted under.
    #[arg(long, env = "MGMT_TMP_PREFIX", default_value = "/var/lib/mgmtd")]
    tmp_prefix: PathBuf,

    /// Don't run the KV store's server side on this node; still
    /// participate as a client.
    #[arg(long, env = "MGMT_NO_SERVER")]
    no_server: bool,

    /// Informs the KV store adapter's cluster-sizing heuristics.
    #[arg(long, env = "MGMT_IDEAL_CLUSTER_SIZE", default_value_t = 5)]
    ideal_cluster_size: usize,

    /// Accepted for compatibility with the original CLI surface; profiling
    /// hookup is out of scope.
    #[arg(long, env = "MGMT_PPROF_PATH")]
    pprof_path: Option<PathBuf>,
}

fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mgmtd=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async move {
            match cli.command {
                Commands::Run(args) => run(args).await,
            }
        })
}

async fn run(args: RunArgs) -> Result<()> {
    let hostname = args
        .hostname
        .or_else(|| hostname_fallback())
        .unwrap_or_else(|| "localhost".to_string());

    let config = EngineConfig {
        graph_path: args.graph.clone(),
        converged_timeout: Duration::from_secs(args.converged_timeout),
        max_runtime: args.max_runtime.map(Duration::from_secs),
        noop: args.noop,
        hostname: hostname.clone(),
        seeds: args.seeds,
        prefix: args.prefix,
        tmp_prefix: args.tmp_prefix.clone(),
        no_server: args.no_server,
        ideal_cluster_size: args.ideal_cluster_size,
        pprof_path: args.pprof_path,
    };

    tracing::info!(graph = %config.graph_path.display(), hostname = %config.hostname, "starting mgmtd");

    // The distributed KV client is an external adapter out of this
    // exercise's scope; `MemoryKvStore` lets a single node run its whole
    // lifecycle (including the exported-resource exchange) standalone.
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let registry = Arc::new(ResourceRegistry::builtin());

    let graph = graph_spec::load(&config.graph_path)?;

    let (reload_tx, reload_rx) = tokio::sync::mpsc::channel(1);
    let shutdown_rx = signals::install()?;

    let export_collector = {
        let kv = kv.clone();
        let registry = registry.clone();
        let reload_tx = reload_tx.clone();
        let graph_path = config.graph_path.clone();
        Lifecycle::spawn_export_collector(kv, registry, reload_tx, move || {
            graph_spec::load(&graph_path).unwrap_or_default()
        })
    };

    let lifecycle = Lifecycle::new(config.clone());
    let make_context = {
        let hostname = hostname.clone();
        let tmp_prefix = config.tmp_prefix.clone();
        let kv = kv.clone();
        let noop = config.noop;
        move |_id| {
            Arc::new(Context::new(hostname.clone(), false, tmp_prefix.clone(), kv.clone()).with_noop(noop))
        }
    };

    let outcome = lifecycle.run(graph, reload_rx, shutdown_rx, make_context).await?;
    export_collector.abort();

    tracing::info!(?outcome, "mgmtd exiting");
    Ok(())
}

fn hostname_fallback() -> Option<String> {
    std::env::var("HOSTNAME").ok().or_else(|| {
        std::process::Command::new("hostname")
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
    })
}
