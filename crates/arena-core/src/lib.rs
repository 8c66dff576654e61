//! Arena Core Library
//!
//! Tournament scheduling and match execution for the iterated Prisoner's
//! Dilemma arena. Agents are opaque HTTP services; this crate pairs them,
//! drives matches round by round through the [`MoveClient`], and persists
//! progress through the `arena-state` traits.

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod payoff;
pub mod protocol;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod standings;
pub mod telemetry;

pub use client::{HttpMoveClient, MoveClient, MoveFault, MoveOutcome};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use orchestrator::{Orchestrator, RunOutcome, RunReport};
pub use payoff::payoff;
pub use protocol::{HistoryEntry, PlayRequest, PlayResponse};
pub use registry::{RunGuard, RunRegistry};
pub use runner::{MatchRunner, MatchSummary};
pub use scheduler::{
    pairings, rating_pairings, round_robin_pairings, PairingStrategy, ScheduleReport,
    TournamentScheduler,
};
pub use standings::{rank_agents, LeaderboardEntry, Timeframe, TournamentStatus};
