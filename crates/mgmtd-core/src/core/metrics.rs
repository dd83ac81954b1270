//! Lightweight runtime counters (§2 expansion), grounded in the teacher's
//! `core/runtime` status reporting: plain atomics rather than a metrics
//! exporter, surfaced through `tracing` fields so a downstream subscriber
//! can turn them into whatever telemetry backend it wants.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    vertices_running: AtomicU64,
    check_apply_total: AtomicU64,
    check_apply_errors: AtomicU64,
    converged: AtomicBool,
}

#[derive(Debug, Clone, Default)]
pub struct Metrics(Arc<Inner>);

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_started(&self) {
        self.0.vertices_running.fetch_add(1, Ordering::Relaxed);
    }

    pub fn vertex_stopped(&self) {
        self.0.vertices_running.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn check_apply_ok(&self) {
        self.0.check_apply_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn check_apply_err(&self) {
        self.0.check_apply_total.fetch_add(1, Ordering::Relaxed);
        self.0.check_apply_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_converged(&self, converged: bool) {
        self.0.converged.store(converged, Ordering::Relaxed);
    }

    pub fn vertices_running(&self) -> u64 {
        self.0.vertices_running.load(Ordering::Relaxed)
    }

    pub fn check_apply_total(&self) -> u64 {
        self.0.check_apply_total.load(Ordering::Relaxed)
    }

    pub fn check_apply_errors(&self) -> u64 {
        self.0.check_apply_errors.load(Ordering::Relaxed)
    }

    pub fn is_converged(&self) -> bool {
        self.0.converged.load(Ordering::Relaxed)
    }

    /// Emits a single `tracing` event with the current snapshot; called
    /// periodically by `core::lifecycle` and on every converger transition.
    pub fn report(&self) {
        tracing::info!(
            vertices_running = self.vertices_running(),
            check_apply_total = self.check_apply_total(),
            check_apply_errors = self.check_apply_errors(),
            converged = self.is_converged(),
            "engine status"
        );
    }
}
