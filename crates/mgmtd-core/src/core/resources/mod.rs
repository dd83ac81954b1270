//! Resource variants (C4): the concrete kinds the graph can hold.
//! `noop` and `timer` are self-contained; `file` talks directly to the
//! local filesystem; `pkg`/`svc`/`exec` delegate to a backend trait so the
//! actual package manager, init system, and shell are swappable adapters.

pub mod exec;
pub mod file;
pub mod noop;
pub mod pkg;
pub mod svc;
pub mod timer;

pub use exec::{ExecBackend, ExecResource};
pub use file::{FileResource, FileState};
pub use noop::NoopResource;
pub use pkg::{PkgBackend, PkgResource, PkgState};
pub use svc::{ActiveState, Startup, SvcBackend, SvcResource};
pub use timer::TimerResource;
