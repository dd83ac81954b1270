//! Error types for the engine core.
//!
//! One variant per error kind named in the design (validation, watch,
//! check-apply, channel races, cancellation, and the KV-store boundary).
//! Adapters and the KV client are external collaborators; this enum is the
//! contract they report failures through.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("validation error in resource {name:?}: {reason}")]
    Validation { name: String, reason: String },

    #[error("watch failed permanently for vertex {vertex}: {reason}")]
    Watch { vertex: String, reason: String },

    #[error("CheckApply failed for vertex {vertex} (attempt {attempt}): {reason}")]
    CheckApply {
        vertex: String,
        attempt: u64,
        reason: String,
    },

    /// A send raced the receiving vertex's exit. Callers must treat this as
    /// benign and drop the event, never surface it as a failure.
    #[error("event channel closed for vertex {vertex}")]
    ChannelClosed { vertex: String },

    /// The event bus observed a sequence its protocol doesn't allow (e.g.
    /// a second `Pause` while already paused). Surfaced to the scheduler
    /// rather than aborting the process (§9: only impossible-by-
    /// construction states may abort).
    #[error("protocol violation on vertex {vertex}'s event bus: {reason}")]
    Protocol { vertex: String, reason: String },

    /// Shutdown is in progress. Propagate upward unwrapped.
    #[error("operation cancelled")]
    Cancelled,

    #[error("converger timer already running for id {0}")]
    TimerAlreadyRunning(u64),

    #[error("KV operation should be retried after a delay: {0}")]
    KvDelay(String),

    #[error("KV operation exhausted its retry budget: {0}")]
    KvRetries(String),

    #[error("KV operation failed permanently: {0}")]
    KvPermanent(String),

    #[error("KV client lost its connection and must reconnect: {0}")]
    KvReconnect(String),

    /// An incremental watch-based map update could not be applied
    /// consistently; the observer must fall back to a full re-read.
    #[error("exported-resource delta inconsistent, full re-read required")]
    ApplyDeltaInconsistent,

    #[error("graph error: {0}")]
    Graph(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
