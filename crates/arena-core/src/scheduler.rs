//! Tournament scheduling: turns the eligible agent pool into matches.
//!
//! Pairing is pure and lives in free functions; [`TournamentScheduler`]
//! adds the validation and the single atomic `create_matches` call.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arena_state::{
    AgentFilter, AgentRecord, ArenaStore, MatchRecord, NewMatch, TournamentId, TournamentRecord,
};
use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use crate::error::{EngineError, Result};
use crate::obs;

/// Opponents per agent under rating-based pairing (bounded by pool size).
pub const RATING_OPPONENTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingStrategy {
    /// Every unordered pair exactly once
    RoundRobin,
    /// Each agent plays its next few neighbours in rating order
    RatingBased,
}

impl PairingStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            PairingStrategy::RoundRobin => "round_robin",
            PairingStrategy::RatingBased => "rating",
        }
    }
}

impl fmt::Display for PairingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PairingStrategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round_robin" | "round-robin" | "roundrobin" => Ok(PairingStrategy::RoundRobin),
            "rating" | "rating_based" | "rating-based" | "elo" => Ok(PairingStrategy::RatingBased),
            other => Err(EngineError::UnknownStrategy(other.to_string())),
        }
    }
}

/// One match per unordered pair, the earlier-registered agent on side A.
pub fn round_robin_pairings(agents: &[AgentRecord]) -> Vec<NewMatch> {
    let mut matches = Vec::with_capacity(agents.len() * agents.len().saturating_sub(1) / 2);
    for (i, a) in agents.iter().enumerate() {
        for b in &agents[i + 1..] {
            matches.push(NewMatch::new(a.agent_id.clone(), b.agent_id.clone()));
        }
    }
    matches
}

/// Sort by rating (stable, best first); agent `i` then plays `(i + j) % n`
/// for `j` in `1..=min(RATING_OPPONENTS, n - 1)`.
///
/// The wrap-around can produce the same unordered pair twice, e.g. in a
/// pool of two or three. Such repeats are kept as separate matches.
pub fn rating_pairings(agents: &[AgentRecord]) -> Vec<NewMatch> {
    let mut ranked: Vec<&AgentRecord> = agents.iter().collect();
    ranked.sort_by(|a, b| {
        b.rating()
            .partial_cmp(&a.rating())
            .unwrap_or(Ordering::Equal)
    });

    let n = ranked.len();
    let span = (RATING_OPPONENTS + 1).min(n);
    let mut matches = Vec::new();
    for (i, agent) in ranked.iter().enumerate() {
        for j in 1..span {
            let opponent = ranked[(i + j) % n];
            matches.push(NewMatch::new(
                agent.agent_id.clone(),
                opponent.agent_id.clone(),
            ));
        }
    }
    matches
}

pub fn pairings(strategy: PairingStrategy, agents: &[AgentRecord]) -> Vec<NewMatch> {
    match strategy {
        PairingStrategy::RoundRobin => round_robin_pairings(agents),
        PairingStrategy::RatingBased => rating_pairings(agents),
    }
}

/// Result of a successful scheduling request.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleReport {
    pub tournament: TournamentRecord,
    pub strategy: PairingStrategy,
    pub matches: Vec<MatchRecord>,
}

pub struct TournamentScheduler {
    store: Arc<dyn ArenaStore>,
}

impl TournamentScheduler {
    pub fn new(store: Arc<dyn ArenaStore>) -> Self {
        Self { store }
    }

    /// Create this tournament's matches from the current eligible pool.
    ///
    /// Either every match is created or none is.
    #[instrument(skip(self, tournament_id), fields(tournament_id = %tournament_id))]
    pub async fn schedule(
        &self,
        tournament_id: &TournamentId,
        strategy: PairingStrategy,
    ) -> Result<ScheduleReport> {
        let tournament = self.store.get_tournament(tournament_id).await?;
        if tournament.has_ended() {
            return Err(EngineError::TournamentEnded {
                tournament_id: tournament_id.to_string(),
            });
        }

        let agents = self.store.list_agents(&AgentFilter::eligible()).await?;
        if agents.len() < 2 {
            return Err(EngineError::InsufficientAgents {
                found: agents.len(),
            });
        }

        let new_matches = pairings(strategy, &agents);
        let matches = self
            .store
            .create_matches(tournament_id, new_matches)
            .await?;
        let tournament = self
            .store
            .mark_tournament_started(tournament_id, Utc::now())
            .await?;

        obs::emit_tournament_scheduled(tournament_id.as_str(), strategy.as_str(), matches.len());

        Ok(ScheduleReport {
            tournament,
            strategy,
            matches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_state::AgentId;
    use std::collections::HashSet;

    fn agent(id: &str, average: f64) -> AgentRecord {
        AgentRecord {
            agent_id: AgentId::from(id),
            name: id.to_string(),
            description: None,
            callback_url: format!("http://{id}.test"),
            auth_token: String::new(),
            is_active: true,
            is_quarantined: false,
            total_matches: if average > 0.0 { 1 } else { 0 },
            total_score: average as u64,
            average_score: average,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn pool(n: usize) -> Vec<AgentRecord> {
        (0..n).map(|i| agent(&format!("a{i}"), 0.0)).collect()
    }

    fn ids(m: &NewMatch) -> (&str, &str) {
        (m.agent_a_id.as_str(), m.agent_b_id.as_str())
    }

    #[test]
    fn strategy_names_parse() {
        assert_eq!(
            "round_robin".parse::<PairingStrategy>().unwrap(),
            PairingStrategy::RoundRobin
        );
        assert_eq!(
            "Round-Robin".parse::<PairingStrategy>().unwrap(),
            PairingStrategy::RoundRobin
        );
        assert_eq!(
            "elo".parse::<PairingStrategy>().unwrap(),
            PairingStrategy::RatingBased
        );
        assert!(matches!(
            "swiss".parse::<PairingStrategy>(),
            Err(EngineError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn round_robin_covers_every_pair_once() {
        for n in 2..=7 {
            let agents = pool(n);
            let matches = round_robin_pairings(&agents);
            assert_eq!(matches.len(), n * (n - 1) / 2);

            let mut seen = HashSet::new();
            for m in &matches {
                assert_ne!(m.agent_a_id, m.agent_b_id);
                let (a, b) = ids(m);
                let key = if a < b { (a, b) } else { (b, a) };
                assert!(seen.insert(key), "duplicate pair {key:?}");
            }
        }
    }

    #[test]
    fn round_robin_puts_earlier_agent_on_side_a() {
        let agents = pool(3);
        let matches = round_robin_pairings(&agents);
        let pairs: Vec<_> = matches.iter().map(ids).collect();
        assert_eq!(pairs, vec![("a0", "a1"), ("a0", "a2"), ("a1", "a2")]);
    }

    #[test]
    fn rating_pairs_five_agents_against_next_three() {
        let agents = vec![
            agent("low", 1.0),
            agent("top", 3.0),
            agent("mid", 2.0),
            agent("new", 0.0),
            agent("high", 2.5),
        ];
        let matches = rating_pairings(&agents);
        assert_eq!(matches.len(), 15);

        // Ranked: top, high, mid, low, new
        let first: Vec<_> = matches[..3].iter().map(ids).collect();
        assert_eq!(first, vec![("top", "high"), ("top", "mid"), ("top", "low")]);
        let last: Vec<_> = matches[12..].iter().map(ids).collect();
        assert_eq!(last, vec![("new", "top"), ("new", "high"), ("new", "mid")]);
        assert!(matches.iter().all(|m| m.agent_a_id != m.agent_b_id));
    }

    #[test]
    fn rating_ties_keep_registration_order() {
        let agents = pool(4);
        let matches = rating_pairings(&agents);
        let first: Vec<_> = matches[..3].iter().map(ids).collect();
        assert_eq!(first, vec![("a0", "a1"), ("a0", "a2"), ("a0", "a3")]);
    }

    #[test]
    fn rating_pool_of_two_keeps_duplicate_pair() {
        let agents = pool(2);
        let matches = rating_pairings(&agents);
        let pairs: Vec<_> = matches.iter().map(ids).collect();
        assert_eq!(pairs, vec![("a0", "a1"), ("a1", "a0")]);
    }
}
