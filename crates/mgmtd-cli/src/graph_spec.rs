//! Minimal on-disk graph format for the self-contained resource kinds
//! (`File`, `Timer`, `Noop`). This is deliberately thin: a flat resource
//! list with no edge syntax, no templating, no imports. Declaring edges
//! between resources is the compiler's job (AutoEdges); this loader only
//! turns a YAML document into vertices. Kinds that need an external
//! adapter (`Pkg`, `Svc`, `Exec`) aren't representable here because
//! they require a backend handle this crate doesn't construct.

use anyhow::{Context as _, Result};
use mgmtd_core::core::graph::{Graph, Vertex};
use mgmtd_core::core::resource::MetaParams;
use mgmtd_core::core::resources::file::{FileResource, FileState};
use mgmtd_core::core::resources::noop::NoopResource;
use mgmtd_core::core::resources::timer::TimerResource;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Default)]
struct GraphSpec {
    #[serde(default)]
    resources: Vec<ResourceSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind")]
enum ResourceSpec {
    File {
        name: String,
        path: PathBuf,
        #[serde(default)]
        content: String,
        #[serde(default = "default_file_state")]
        state: FileStateSpec,
        #[serde(default)]
        auto_edge: bool,
    },
    Timer {
        name: String,
        interval_secs: u64,
    },
    Noop {
        name: String,
    },
}

fn default_file_state() -> FileStateSpec {
    FileStateSpec::Present
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FileStateSpec {
    Present,
    Absent,
}

/// Loads a graph from `path` if it exists; an absent path yields an empty
/// graph rather than an error, so `mgmtd run` is usable without a graph
/// file for a quick smoke test of the engine's lifecycle alone.
pub fn load(path: &Path) -> Result<Graph> {
    let mut graph = Graph::new();
    if !path.exists() {
        tracing::warn!(path = %path.display(), "graph file not found, starting with an empty graph");
        return Ok(graph);
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading graph file {}", path.display()))?;
    let spec: GraphSpec = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing graph file {}", path.display()))?;

    for r in spec.resources {
        let vertex = match r {
            ResourceSpec::File {
                name,
                path,
                content,
                state,
                auto_edge,
            } => {
                let state = match state {
                    FileStateSpec::Present => FileState::Present,
                    FileStateSpec::Absent => FileState::Absent,
                };
                let mut meta = MetaParams::default();
                meta.auto_edge = auto_edge;
                let resource = FileResource::new(&name, path, content, state).with_meta(meta);
                Vertex::new(name, "File", Box::new(resource))
            }
            ResourceSpec::Timer { name, interval_secs } => {
                let resource = TimerResource::new(&name, Duration::from_secs(interval_secs));
                Vertex::new(name, "Timer", Box::new(resource))
            }
            ResourceSpec::Noop { name } => {
                let resource = NoopResource::new(&name);
                Vertex::new(name, "Noop", Box::new(resource))
            }
        };
        graph.add_vertex(vertex);
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_empty_graph() {
        let graph = load(Path::new("/nonexistent/graph.yaml")).unwrap();
        assert_eq!(graph.len(), 0);
    }

    #[test]
    fn loads_file_timer_and_noop_resources() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            r#"
resources:
  - kind: File
    name: motd
    path: /etc/motd
    content: "hello\n"
    state: present
  - kind: Timer
    name: heartbeat
    interval_secs: 30
  - kind: Noop
    name: marker
"#
        )
        .unwrap();

        let graph = load(tmp.path()).unwrap();
        assert_eq!(graph.len(), 3);
        assert!(graph.find_by_name("motd").is_some());
        assert!(graph.find_by_name("heartbeat").is_some());
        assert!(graph.find_by_name("marker").is_some());
    }
}
