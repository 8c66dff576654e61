//! Registry of tournaments currently being run.
//!
//! Claiming is a single test-and-insert under a synchronous lock, so two
//! callers can never both win, and no `.await` ever happens while the lock
//! is held. The returned [`RunGuard`] releases the claim on drop, whatever
//! the exit path.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use arena_state::TournamentId;

use crate::error::{EngineError, Result};

#[derive(Debug, Default)]
pub struct RunRegistry {
    running: Mutex<HashSet<TournamentId>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<TournamentId>> {
        // The set stays consistent even if a holder panicked.
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `tournament_id`, or fail with `AlreadyRunning`.
    pub fn try_claim(&self, tournament_id: &TournamentId) -> Result<RunGuard<'_>> {
        if !self.lock().insert(tournament_id.clone()) {
            return Err(EngineError::AlreadyRunning {
                tournament_id: tournament_id.to_string(),
            });
        }
        Ok(RunGuard {
            registry: self,
            tournament_id: tournament_id.clone(),
        })
    }

    pub fn is_running(&self, tournament_id: &TournamentId) -> bool {
        self.lock().contains(tournament_id)
    }
}

/// Holds a tournament's slot in the registry until dropped.
#[derive(Debug)]
pub struct RunGuard<'a> {
    registry: &'a RunRegistry,
    tournament_id: TournamentId,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.tournament_id);
    }
}
