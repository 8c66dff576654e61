//! Engine-level error taxonomy.
//!
//! Move protocol faults never appear here: they collapse to a defect inside
//! the client. Everything else is either a rejected request (no state was
//! changed) or a persistence failure wrapped from `arena-state`.

use arena_state::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("tournament {tournament_id} is already running")]
    AlreadyRunning { tournament_id: String },

    #[error("tournament {tournament_id} has already ended")]
    TournamentEnded { tournament_id: String },

    #[error("not enough eligible agents to schedule matches: found {found}, need at least 2")]
    InsufficientAgents { found: usize },

    #[error("unknown pairing strategy: {0}")]
    UnknownStrategy(String),

    #[error("unknown leaderboard timeframe: {0}")]
    UnknownTimeframe(String),

    #[error("concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("match {match_id} is already complete")]
    MatchAlreadyComplete { match_id: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Unwrap `StorageError::MatchAlreadyComplete` into the engine variant.
    pub(crate) fn from_storage(err: StorageError) -> Self {
        match err {
            StorageError::MatchAlreadyComplete { match_id } => {
                EngineError::MatchAlreadyComplete { match_id }
            }
            other => EngineError::Storage(other),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
