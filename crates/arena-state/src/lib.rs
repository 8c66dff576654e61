//! arena-state: persistence for the Prisoner's Dilemma arena
//!
//! Stores registered agents, tournaments, scheduled matches and the
//! append-only round history. The engine talks to storage only through the
//! [`AgentDirectory`] and [`MatchLedger`] traits.
//!
//! ## Backends
//!
//! - [`SurrealArenaStore`]: SurrealDB (in-memory, local surrealkv, or cloud)
//! - [`fakes::MemoryArenaStore`]: mutex-guarded vectors for tests

mod error;
pub mod fakes;
mod handle;
mod migrations;
mod schema;
pub mod storage_traits;
mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::{connect_cloud, connect_from_env, connect_in_memory, CloudConfig};
pub use storage_traits::{
    apply_match_score, AgentDirectory, AgentFilter, AgentId, AgentRecord, ArenaStore,
    FinalizedMatch, MatchFilter, MatchId, MatchLedger, MatchRecord, MatchResult, Move, NewAgent,
    NewMatch, NewTournament, RoundRecord, StorageResult, TournamentId, TournamentRecord,
    DEFAULT_ROUND_COUNT,
};
pub use surreal_store::SurrealArenaStore;

/// Result type for connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
