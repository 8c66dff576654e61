//! Tournament orchestration.
//!
//! The [`Orchestrator`] is the outward face of the engine: it schedules
//! tournaments, runs their pending matches in bounded-concurrency batches,
//! and answers status and leaderboard queries.
//!
//! Run lifecycle:
//!
//! ```text
//! Idle -> Running -> Completed
//!                 \-> PartiallyComplete { stragglers }
//! ```
//!
//! A tournament is claimed in the [`RunRegistry`] for the whole run; a
//! second run of the same tournament fails fast with `AlreadyRunning`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use arena_state::{
    AgentFilter, AgentId, ArenaStore, MatchFilter, MatchId, MatchRecord, TournamentId,
};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, instrument};

use crate::client::{HttpMoveClient, MoveClient};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::registry::RunRegistry;
use crate::runner::{MatchRunner, MatchSummary};
use crate::scheduler::{PairingStrategy, ScheduleReport, TournamentScheduler};
use crate::standings::{rank_agents, LeaderboardEntry, Timeframe, TournamentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every match is complete and the tournament has ended
    Completed,
    /// Some matches failed; rerunning picks them up where they stopped
    PartiallyComplete { stragglers: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub tournament_id: TournamentId,
    pub outcome: RunOutcome,
    /// Matches that were pending when the run started
    pub attempted: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

pub struct Orchestrator {
    store: Arc<dyn ArenaStore>,
    runner: MatchRunner,
    scheduler: TournamentScheduler,
    registry: RunRegistry,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ArenaStore>,
        client: Arc<dyn MoveClient>,
        config: EngineConfig,
    ) -> Self {
        Self {
            runner: MatchRunner::new(Arc::clone(&store), client),
            scheduler: TournamentScheduler::new(Arc::clone(&store)),
            registry: RunRegistry::new(),
            store,
            config,
        }
    }

    /// Orchestrator talking to agents over HTTP.
    pub fn with_http_client(store: Arc<dyn ArenaStore>, config: EngineConfig) -> Self {
        let client = Arc::new(HttpMoveClient::new(&config));
        Self::new(store, client, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ArenaStore> {
        &self.store
    }

    pub fn is_running(&self, tournament_id: &TournamentId) -> bool {
        self.registry.is_running(tournament_id)
    }

    /// Create the tournament's matches from the eligible agent pool.
    pub async fn schedule(
        &self,
        tournament_id: &TournamentId,
        strategy: PairingStrategy,
    ) -> Result<ScheduleReport> {
        self.scheduler.schedule(tournament_id, strategy).await
    }

    /// Run every incomplete match of a tournament, `concurrency` at a time.
    ///
    /// Individual match failures are logged and counted but do not stop the
    /// run. The tournament ends only once no incomplete match remains.
    #[instrument(skip(self, tournament_id), fields(tournament_id = %tournament_id))]
    pub async fn run(&self, tournament_id: &TournamentId, concurrency: usize) -> Result<RunReport> {
        if concurrency == 0 {
            return Err(EngineError::InvalidConcurrency);
        }
        let _guard = self.registry.try_claim(tournament_id)?;
        let started = Instant::now();

        let tournament = self.store.get_tournament(tournament_id).await?;
        if tournament.has_ended() {
            return Err(EngineError::TournamentEnded {
                tournament_id: tournament_id.to_string(),
            });
        }

        let pending = self
            .store
            .list_matches(tournament_id, MatchFilter::Incomplete)
            .await?;
        obs::emit_run_started(tournament_id.as_str(), pending.len(), concurrency);

        let mut failed = 0;
        for (batch, matches) in pending.chunks(concurrency).enumerate() {
            let results = join_all(matches.iter().map(|m| self.play(m))).await;
            let batch_failed = results.iter().filter(|r| r.is_err()).count();
            failed += batch_failed;
            obs::emit_batch_finished(
                tournament_id.as_str(),
                batch,
                results.len() - batch_failed,
                batch_failed,
            );
        }

        let outcome = self.finish_if_done(tournament_id).await?;
        let duration_ms = started.elapsed().as_millis() as u64;
        let stragglers = match outcome {
            RunOutcome::Completed => 0,
            RunOutcome::PartiallyComplete { stragglers } => stragglers,
        };
        obs::emit_tournament_finished(tournament_id.as_str(), duration_ms, stragglers);
        METRICS.flush();

        Ok(RunReport {
            tournament_id: tournament_id.clone(),
            outcome,
            attempted: pending.len(),
            failed,
            duration_ms,
        })
    }

    /// Run a single match on demand.
    ///
    /// Holds the tournament's registry slot meanwhile, so it cannot overlap
    /// a full run of the same tournament.
    #[instrument(skip(self, match_id), fields(match_id = %match_id))]
    pub async fn run_match(&self, match_id: &MatchId) -> Result<MatchSummary> {
        let record = self
            .store
            .get_match(match_id)
            .await
            .map_err(EngineError::from_storage)?;
        if record.is_complete {
            return Err(EngineError::MatchAlreadyComplete {
                match_id: match_id.to_string(),
            });
        }

        let _guard = self.registry.try_claim(&record.tournament_id)?;
        let summary = self.runner.run(match_id).await?;
        self.finish_if_done(&record.tournament_id).await?;
        Ok(summary)
    }

    pub async fn status(&self, tournament_id: &TournamentId) -> Result<TournamentStatus> {
        let tournament = self.store.get_tournament(tournament_id).await?;
        let matches = self
            .store
            .list_matches(tournament_id, MatchFilter::All)
            .await?;
        Ok(TournamentStatus::from_parts(tournament, &matches))
    }

    /// Active agents ranked by average score.
    ///
    /// With a tournament, only agents that appear in its matches are ranked.
    pub async fn leaderboard(
        &self,
        tournament_id: Option<&TournamentId>,
        timeframe: Timeframe,
    ) -> Result<Vec<LeaderboardEntry>> {
        let mut filter = AgentFilter::active();
        if let Some(cutoff) = timeframe.cutoff(Utc::now()) {
            filter = filter.updated_since(cutoff);
        }
        let mut agents = self.store.list_agents(&filter).await?;

        if let Some(tournament_id) = tournament_id {
            let matches = self
                .store
                .list_matches(tournament_id, MatchFilter::All)
                .await?;
            let participants: HashSet<&AgentId> = matches
                .iter()
                .flat_map(|m| [&m.agent_a_id, &m.agent_b_id])
                .collect();
            agents.retain(|a| participants.contains(&a.agent_id));
        }

        Ok(rank_agents(agents))
    }

    async fn play(&self, record: &MatchRecord) -> Result<MatchSummary> {
        self.runner.run(&record.match_id).await.inspect_err(|err| {
            METRICS.inc_matches_failed();
            obs::emit_match_failed(record.match_id.as_str(), err);
        })
    }

    /// End the tournament if no incomplete match is left.
    async fn finish_if_done(&self, tournament_id: &TournamentId) -> Result<RunOutcome> {
        let stragglers = self
            .store
            .list_matches(tournament_id, MatchFilter::Incomplete)
            .await?
            .len();
        if stragglers > 0 {
            info!(stragglers, "tournament left partially complete");
            return Ok(RunOutcome::PartiallyComplete { stragglers });
        }

        self.store
            .mark_tournament_ended(tournament_id, Utc::now())
            .await?;
        Ok(RunOutcome::Completed)
    }
}
