//! Error types for arena-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by the storage traits
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("agent not found: {agent_id}")]
    AgentNotFound { agent_id: String },

    #[error("tournament not found: {tournament_id}")]
    TournamentNotFound { tournament_id: String },

    #[error("match not found: {match_id}")]
    MatchNotFound { match_id: String },

    #[error("an agent named '{name}' already exists")]
    DuplicateAgentName { name: String },

    #[error("match cannot pair agent {agent_id} against itself")]
    SelfPairing { agent_id: String },

    #[error("round {got} out of order for match {match_id} (expected {expected})")]
    RoundOutOfOrder {
        match_id: String,
        expected: u32,
        got: u32,
    },

    #[error("match {match_id} is already complete")]
    MatchAlreadyComplete { match_id: String },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}
