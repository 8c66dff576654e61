//! Read models: tournament progress and the agent leaderboard.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use arena_state::{AgentId, AgentRecord, MatchRecord, TournamentId, TournamentRecord};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TournamentStatus {
    pub tournament_id: TournamentId,
    pub name: String,
    pub is_active: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_matches: usize,
    pub completed_matches: usize,
    /// "completed/total"
    pub progress: String,
    pub percent_complete: f64,
}

impl TournamentStatus {
    pub fn from_parts(tournament: TournamentRecord, matches: &[MatchRecord]) -> Self {
        let total = matches.len();
        let completed = matches.iter().filter(|m| m.is_complete).count();
        let percent_complete = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };

        Self {
            tournament_id: tournament.tournament_id,
            name: tournament.name,
            is_active: tournament.is_active,
            start_time: tournament.start_time,
            end_time: tournament.end_time,
            total_matches: total,
            completed_matches: completed,
            progress: format!("{completed}/{total}"),
            percent_complete,
        }
    }
}

/// Window of recent activity a leaderboard is limited to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    #[default]
    All,
    Daily,
    Weekly,
}

impl Timeframe {
    /// Agents must have been updated at or after this instant.
    pub fn cutoff(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Timeframe::All => None,
            Timeframe::Daily => Some(now - Duration::days(1)),
            Timeframe::Weekly => Some(now - Duration::days(7)),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Timeframe::All => "all",
            Timeframe::Daily => "daily",
            Timeframe::Weekly => "weekly",
        })
    }
}

impl FromStr for Timeframe {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "all_time" => Ok(Timeframe::All),
            "daily" | "day" => Ok(Timeframe::Daily),
            "weekly" | "week" => Ok(Timeframe::Weekly),
            other => Err(EngineError::UnknownTimeframe(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    /// 1-based
    pub rank: usize,
    pub agent_id: AgentId,
    pub name: String,
    pub total_matches: u64,
    pub total_score: u64,
    pub average_score: f64,
}

/// Rank by average score, best first. Ties keep input order.
pub fn rank_agents(agents: Vec<AgentRecord>) -> Vec<LeaderboardEntry> {
    let mut agents = agents;
    agents.sort_by(|a, b| {
        b.rating()
            .partial_cmp(&a.rating())
            .unwrap_or(Ordering::Equal)
    });

    agents
        .into_iter()
        .enumerate()
        .map(|(i, agent)| {
            let average_score = agent.rating();
            LeaderboardEntry {
                rank: i + 1,
                agent_id: agent.agent_id,
                name: agent.name,
                total_matches: agent.total_matches,
                total_score: agent.total_score,
                average_score,
            }
        })
        .collect()
}
