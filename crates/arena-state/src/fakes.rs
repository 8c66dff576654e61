//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryArenaStore`, which satisfies both `AgentDirectory` and
//! `MatchLedger` without any external dependencies. Every operation takes a
//! single lock, so multi-record updates are trivially atomic.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct ArenaState {
    agents: Vec<AgentRecord>,
    tournaments: Vec<TournamentRecord>,
    matches: Vec<MatchRecord>,
    rounds: HashMap<MatchId, Vec<RoundRecord>>,
    /// Injected faults: fail `append_round` for (match, round) once
    append_faults: Vec<(MatchId, u32)>,
}

impl ArenaState {
    fn agent_mut(&mut self, agent_id: &AgentId) -> StorageResult<&mut AgentRecord> {
        self.agents
            .iter_mut()
            .find(|a| &a.agent_id == agent_id)
            .ok_or_else(|| StorageError::AgentNotFound {
                agent_id: agent_id.0.clone(),
            })
    }

    fn tournament_mut(
        &mut self,
        tournament_id: &TournamentId,
    ) -> StorageResult<&mut TournamentRecord> {
        self.tournaments
            .iter_mut()
            .find(|t| &t.tournament_id == tournament_id)
            .ok_or_else(|| StorageError::TournamentNotFound {
                tournament_id: tournament_id.0.clone(),
            })
    }

    fn match_index(&self, match_id: &MatchId) -> StorageResult<usize> {
        self.matches
            .iter()
            .position(|m| &m.match_id == match_id)
            .ok_or_else(|| StorageError::MatchNotFound {
                match_id: match_id.0.clone(),
            })
    }
}

/// In-memory arena store backed by vectors behind one `Mutex`.
#[derive(Debug, Default)]
pub struct MemoryArenaStore {
    state: Mutex<ArenaState>,
}

impl MemoryArenaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `append_round` of `round_number` in `match_id` fail
    /// with a backend error, as if the database went away mid-match.
    pub fn fail_append_once(&self, match_id: &MatchId, round_number: u32) {
        let mut state = self.state.lock().unwrap();
        state.append_faults.push((match_id.clone(), round_number));
    }

    /// Overwrite an agent's statistics, e.g. to seed ratings.
    pub fn seed_agent_stats(
        &self,
        agent_id: &AgentId,
        total_matches: u64,
        total_score: u64,
    ) -> StorageResult<AgentRecord> {
        let mut state = self.state.lock().unwrap();
        let agent = state.agent_mut(agent_id)?;
        agent.total_matches = total_matches;
        agent.total_score = total_score;
        agent.average_score = if total_matches == 0 {
            0.0
        } else {
            total_score as f64 / total_matches as f64
        };
        agent.updated_at = Some(Utc::now());
        Ok(agent.clone())
    }
}

#[async_trait]
impl AgentDirectory for MemoryArenaStore {
    async fn register_agent(&self, agent: NewAgent) -> StorageResult<AgentRecord> {
        agent.validate()?;
        let mut state = self.state.lock().unwrap();
        if state.agents.iter().any(|a| a.name == agent.name) {
            return Err(StorageError::DuplicateAgentName { name: agent.name });
        }
        let record = agent.into_record();
        state.agents.push(record.clone());
        Ok(record)
    }

    async fn get_agent(&self, agent_id: &AgentId) -> StorageResult<AgentRecord> {
        let mut state = self.state.lock().unwrap();
        state.agent_mut(agent_id).map(|a| a.clone())
    }

    async fn list_agents(&self, filter: &AgentFilter) -> StorageResult<Vec<AgentRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .agents
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn set_agent_active(
        &self,
        agent_id: &AgentId,
        active: bool,
    ) -> StorageResult<AgentRecord> {
        let mut state = self.state.lock().unwrap();
        let agent = state.agent_mut(agent_id)?;
        agent.is_active = active;
        agent.updated_at = Some(Utc::now());
        Ok(agent.clone())
    }

    async fn set_agent_quarantined(
        &self,
        agent_id: &AgentId,
        quarantined: bool,
    ) -> StorageResult<AgentRecord> {
        let mut state = self.state.lock().unwrap();
        let agent = state.agent_mut(agent_id)?;
        agent.is_quarantined = quarantined;
        agent.updated_at = Some(Utc::now());
        Ok(agent.clone())
    }
}

#[async_trait]
impl MatchLedger for MemoryArenaStore {
    async fn create_tournament(
        &self,
        tournament: NewTournament,
    ) -> StorageResult<TournamentRecord> {
        let record = tournament.into_record()?;
        let mut state = self.state.lock().unwrap();
        state.tournaments.push(record.clone());
        Ok(record)
    }

    async fn get_tournament(
        &self,
        tournament_id: &TournamentId,
    ) -> StorageResult<TournamentRecord> {
        let mut state = self.state.lock().unwrap();
        state.tournament_mut(tournament_id).map(|t| t.clone())
    }

    async fn list_tournaments(&self, active_only: bool) -> StorageResult<Vec<TournamentRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tournaments
            .iter()
            .filter(|t| !active_only || t.is_active)
            .cloned()
            .collect())
    }

    async fn mark_tournament_started(
        &self,
        tournament_id: &TournamentId,
        at: DateTime<Utc>,
    ) -> StorageResult<TournamentRecord> {
        let mut state = self.state.lock().unwrap();
        let tournament = state.tournament_mut(tournament_id)?;
        if tournament.start_time.is_none() && !tournament.has_ended() {
            tournament.start_time = Some(at);
        }
        Ok(tournament.clone())
    }

    async fn mark_tournament_ended(
        &self,
        tournament_id: &TournamentId,
        at: DateTime<Utc>,
    ) -> StorageResult<TournamentRecord> {
        let mut state = self.state.lock().unwrap();
        let tournament = state.tournament_mut(tournament_id)?;
        if !tournament.has_ended() {
            tournament.end_time = Some(at);
            tournament.is_active = false;
        }
        Ok(tournament.clone())
    }

    async fn create_matches(
        &self,
        tournament_id: &TournamentId,
        matches: Vec<NewMatch>,
    ) -> StorageResult<Vec<MatchRecord>> {
        let mut state = self.state.lock().unwrap();
        state.tournament_mut(tournament_id)?;

        // Validate everything before touching state.
        let mut records = Vec::with_capacity(matches.len());
        for pairing in matches {
            for agent_id in [&pairing.agent_a_id, &pairing.agent_b_id] {
                state.agent_mut(agent_id)?;
            }
            records.push(pairing.into_record(tournament_id)?);
        }

        state.matches.extend(records.iter().cloned());
        Ok(records)
    }

    async fn get_match(&self, match_id: &MatchId) -> StorageResult<MatchRecord> {
        let state = self.state.lock().unwrap();
        let idx = state.match_index(match_id)?;
        Ok(state.matches[idx].clone())
    }

    async fn list_matches(
        &self,
        tournament_id: &TournamentId,
        filter: MatchFilter,
    ) -> StorageResult<Vec<MatchRecord>> {
        let mut state = self.state.lock().unwrap();
        state.tournament_mut(tournament_id)?;
        Ok(state
            .matches
            .iter()
            .filter(|m| &m.tournament_id == tournament_id && filter.matches(m))
            .cloned()
            .collect())
    }

    async fn append_round(&self, round: RoundRecord) -> StorageResult<MatchRecord> {
        let mut state = self.state.lock().unwrap();
        let idx = state.match_index(&round.match_id)?;

        let fault = (round.match_id.clone(), round.round_number);
        if let Some(pos) = state.append_faults.iter().position(|f| *f == fault) {
            state.append_faults.remove(pos);
            return Err(StorageError::Backend(format!(
                "injected failure appending round {} of match {}",
                round.round_number, round.match_id
            )));
        }

        let record = &state.matches[idx];
        if record.is_complete {
            return Err(StorageError::MatchAlreadyComplete {
                match_id: round.match_id.0.clone(),
            });
        }
        if round.round_number != record.rounds_completed {
            return Err(StorageError::RoundOutOfOrder {
                match_id: round.match_id.0.clone(),
                expected: record.rounds_completed,
                got: round.round_number,
            });
        }

        let next = round.round_number + 1;
        state
            .rounds
            .entry(round.match_id.clone())
            .or_default()
            .push(round);
        let record = &mut state.matches[idx];
        record.rounds_completed = next;
        Ok(record.clone())
    }

    async fn list_rounds(&self, match_id: &MatchId) -> StorageResult<Vec<RoundRecord>> {
        let state = self.state.lock().unwrap();
        state.match_index(match_id)?;
        let mut rounds = state.rounds.get(match_id).cloned().unwrap_or_default();
        rounds.sort_by_key(|r| r.round_number);
        Ok(rounds)
    }

    async fn finalize_match(&self, result: MatchResult) -> StorageResult<FinalizedMatch> {
        let mut state = self.state.lock().unwrap();
        let idx = state.match_index(&result.match_id)?;
        if state.matches[idx].is_complete {
            return Err(StorageError::MatchAlreadyComplete {
                match_id: result.match_id.0.clone(),
            });
        }

        let (a_id, b_id) = {
            let m = &state.matches[idx];
            (m.agent_a_id.clone(), m.agent_b_id.clone())
        };
        // Resolve both agents before mutating anything.
        state.agent_mut(&a_id)?;
        state.agent_mut(&b_id)?;

        let agent_a = {
            let agent = state.agent_mut(&a_id)?;
            apply_match_score(agent, result.agent_a_score, result.completed_at);
            agent.clone()
        };
        let agent_b = {
            let agent = state.agent_mut(&b_id)?;
            apply_match_score(agent, result.agent_b_score, result.completed_at);
            agent.clone()
        };

        let record = &mut state.matches[idx];
        record.is_complete = true;
        record.agent_a_score = result.agent_a_score;
        record.agent_b_score = result.agent_b_score;
        record.completed_at = Some(result.completed_at);

        Ok(FinalizedMatch {
            record: record.clone(),
            agent_a,
            agent_b,
        })
    }
}
