//! Row definitions for the arena SurrealDB tables
//!
//! Tables:
//! - agents: registered agents and their running statistics
//! - tournaments: tournament configuration and lifecycle timestamps
//! - matches: pairings with progress and final scores
//! - rounds: append-only round history
//!
//! Rows mirror the `storage_traits` records and convert at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{
    AgentId, AgentRecord, MatchId, MatchRecord, Move, RoundRecord, StorageResult, TournamentId,
    TournamentRecord,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

/// Row of the `agents` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub agent_id: String,
    pub name: String,
    pub description: Option<String>,
    pub callback_url: String,
    pub auth_token: String,
    pub is_active: bool,
    pub is_quarantined: bool,
    pub total_matches: u64,
    pub total_score: u64,
    pub average_score: f64,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<AgentRecord> for AgentRow {
    fn from(r: AgentRecord) -> Self {
        AgentRow {
            id: None,
            agent_id: r.agent_id.0,
            name: r.name,
            description: r.description,
            callback_url: r.callback_url,
            auth_token: r.auth_token,
            is_active: r.is_active,
            is_quarantined: r.is_quarantined,
            total_matches: r.total_matches,
            total_score: r.total_score,
            average_score: r.average_score,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl From<AgentRow> for AgentRecord {
    fn from(row: AgentRow) -> Self {
        AgentRecord {
            agent_id: AgentId(row.agent_id),
            name: row.name,
            description: row.description,
            callback_url: row.callback_url,
            auth_token: row.auth_token,
            is_active: row.is_active,
            is_quarantined: row.is_quarantined,
            total_matches: row.total_matches,
            total_score: row.total_score,
            average_score: row.average_score,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Row of the `tournaments` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub tournament_id: String,
    pub name: String,
    pub description: Option<String>,
    pub round_count: u32,
    #[serde(default, with = "surreal_datetime_opt")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<TournamentRecord> for TournamentRow {
    fn from(r: TournamentRecord) -> Self {
        TournamentRow {
            id: None,
            tournament_id: r.tournament_id.0,
            name: r.name,
            description: r.description,
            round_count: r.round_count,
            start_time: r.start_time,
            end_time: r.end_time,
            is_active: r.is_active,
            created_at: r.created_at,
        }
    }
}

impl From<TournamentRow> for TournamentRecord {
    fn from(row: TournamentRow) -> Self {
        TournamentRecord {
            tournament_id: TournamentId(row.tournament_id),
            name: row.name,
            description: row.description,
            round_count: row.round_count,
            start_time: row.start_time,
            end_time: row.end_time,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

/// Row of the `matches` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub match_id: String,
    pub tournament_id: String,
    /// Position within the scheduling request, keeps creation order stable
    pub seq: u64,
    pub agent_a_id: String,
    pub agent_b_id: String,
    pub agent_a_score: u64,
    pub agent_b_score: u64,
    pub rounds_completed: u32,
    pub is_complete: bool,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl MatchRow {
    pub fn from_record(r: MatchRecord, seq: u64) -> Self {
        MatchRow {
            id: None,
            match_id: r.match_id.0,
            tournament_id: r.tournament_id.0,
            seq,
            agent_a_id: r.agent_a_id.0,
            agent_b_id: r.agent_b_id.0,
            agent_a_score: r.agent_a_score,
            agent_b_score: r.agent_b_score,
            rounds_completed: r.rounds_completed,
            is_complete: r.is_complete,
            created_at: r.created_at,
            completed_at: r.completed_at,
        }
    }
}

impl From<MatchRow> for MatchRecord {
    fn from(row: MatchRow) -> Self {
        MatchRecord {
            match_id: MatchId(row.match_id),
            tournament_id: TournamentId(row.tournament_id),
            agent_a_id: AgentId(row.agent_a_id),
            agent_b_id: AgentId(row.agent_b_id),
            agent_a_score: row.agent_a_score,
            agent_b_score: row.agent_b_score,
            rounds_completed: row.rounds_completed,
            is_complete: row.is_complete,
            created_at: row.created_at,
            completed_at: row.completed_at,
        }
    }
}

/// Row of the `rounds` table. Moves are stored as their wire symbols.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub match_id: String,
    pub round_number: u32,
    pub agent_a_move: String,
    pub agent_b_move: String,
    pub agent_a_score: u32,
    pub agent_b_score: u32,
    pub agent_a_latency_ms: f64,
    pub agent_b_latency_ms: f64,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<RoundRecord> for RoundRow {
    fn from(r: RoundRecord) -> Self {
        RoundRow {
            id: None,
            match_id: r.match_id.0,
            round_number: r.round_number,
            agent_a_move: r.agent_a_move.symbol().to_string(),
            agent_b_move: r.agent_b_move.symbol().to_string(),
            agent_a_score: r.agent_a_score,
            agent_b_score: r.agent_b_score,
            agent_a_latency_ms: r.agent_a_latency_ms,
            agent_b_latency_ms: r.agent_b_latency_ms,
            created_at: r.created_at,
        }
    }
}

impl RoundRow {
    pub fn into_record(self) -> StorageResult<RoundRecord> {
        let parse = |symbol: &str| {
            Move::from_symbol(symbol)
                .ok_or_else(|| StorageError::Backend(format!("unknown move symbol: {symbol}")))
        };
        Ok(RoundRecord {
            agent_a_move: parse(&self.agent_a_move)?,
            agent_b_move: parse(&self.agent_b_move)?,
            match_id: MatchId(self.match_id),
            round_number: self.round_number,
            agent_a_score: self.agent_a_score,
            agent_b_score: self.agent_b_score,
            agent_a_latency_ms: self.agent_a_latency_ms,
            agent_b_latency_ms: self.agent_b_latency_ms,
            created_at: self.created_at,
        })
    }
}
