//! Process-wide atomic counters.
//!
//! Counters are bumped silently where things happen. [`Metrics::flush`]
//! emits the current values as one `info!` event, which the orchestrator
//! does at the end of every tournament run.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    moves_requested: AtomicU64,
    moves_defaulted: AtomicU64,
    rounds_played: AtomicU64,
    matches_completed: AtomicU64,
    matches_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            moves_requested: AtomicU64::new(0),
            moves_defaulted: AtomicU64::new(0),
            rounds_played: AtomicU64::new(0),
            matches_completed: AtomicU64::new(0),
            matches_failed: AtomicU64::new(0),
        }
    }

    pub fn inc_moves_requested(&self) {
        self.moves_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_moves_defaulted(&self) {
        self.moves_defaulted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "moves_defaulted", "counter incremented");
    }

    pub fn inc_rounds_played(&self) {
        self.rounds_played.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_matches_completed(&self) {
        self.matches_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "matches_completed", "counter incremented");
    }

    pub fn inc_matches_failed(&self) {
        self.matches_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "matches_failed", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            moves_requested = self.moves_requested(),
            moves_defaulted = self.moves_defaulted(),
            rounds_played = self.rounds_played(),
            matches_completed = self.matches_completed(),
            matches_failed = self.matches_failed(),
        );
    }

    pub fn moves_requested(&self) -> u64 {
        self.moves_requested.load(Ordering::Relaxed)
    }

    pub fn moves_defaulted(&self) -> u64 {
        self.moves_defaulted.load(Ordering::Relaxed)
    }

    pub fn rounds_played(&self) -> u64 {
        self.rounds_played.load(Ordering::Relaxed)
    }

    pub fn matches_completed(&self) -> u64 {
        self.matches_completed.load(Ordering::Relaxed)
    }

    pub fn matches_failed(&self) -> u64 {
        self.matches_failed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.moves_requested.store(0, Ordering::Relaxed);
        self.moves_defaulted.store(0, Ordering::Relaxed);
        self.rounds_played.store(0, Ordering::Relaxed);
        self.matches_completed.store(0, Ordering::Relaxed);
        self.matches_failed.store(0, Ordering::Relaxed);
    }
}
