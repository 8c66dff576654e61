//! Match runner: plays one match from its persisted progress to the end.
//!
//! Rounds already in the ledger are replayed into each side's history and
//! running score, never re-requested. Each new round is appended (together
//! with the progress counter) before the next one starts, so an interrupted
//! match resumes exactly where it stopped.

use std::sync::Arc;

use arena_state::{AgentRecord, ArenaStore, MatchId, MatchRecord, MatchResult, RoundRecord};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, Instrument};

use crate::client::MoveClient;
use crate::error::{EngineError, Result};
use crate::metrics::METRICS;
use crate::obs::{self, MatchSpan};
use crate::payoff::payoff;
use crate::protocol::{HistoryEntry, PlayRequest};

/// What a finished match looked like.
#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub match_id: MatchId,
    pub agent_a_score: u64,
    pub agent_b_score: u64,
    /// Round the runner started requesting moves at
    pub resumed_from: u32,
    /// Rounds requested in this invocation
    pub rounds_played: u32,
    /// Agent statistics after the match was folded in
    pub agent_a: AgentRecord,
    pub agent_b: AgentRecord,
}

/// Each side's private view of the match so far.
#[derive(Debug, Default)]
struct Tally {
    history_a: Vec<HistoryEntry>,
    history_b: Vec<HistoryEntry>,
    score_a: u64,
    score_b: u64,
}

impl Tally {
    fn record(&mut self, round: &RoundRecord) {
        self.history_a.push(HistoryEntry {
            own: round.agent_a_move,
            opponent: round.agent_b_move,
        });
        self.history_b.push(HistoryEntry {
            own: round.agent_b_move,
            opponent: round.agent_a_move,
        });
        self.score_a += u64::from(round.agent_a_score);
        self.score_b += u64::from(round.agent_b_score);
    }
}

#[derive(Clone)]
pub struct MatchRunner {
    store: Arc<dyn ArenaStore>,
    client: Arc<dyn MoveClient>,
}

impl MatchRunner {
    pub fn new(store: Arc<dyn ArenaStore>, client: Arc<dyn MoveClient>) -> Self {
        Self { store, client }
    }

    /// Play `match_id` to completion and fold the result into both agents.
    ///
    /// Fails with `MatchAlreadyComplete` for a finished match. A storage
    /// failure aborts the match; rerunning it resumes from the last round
    /// that was persisted.
    pub async fn run(&self, match_id: &MatchId) -> Result<MatchSummary> {
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

        let span = MatchSpan::new(record.tournament_id.as_str(), match_id.as_str());
        self.play(record).instrument(span.span()).await
    }

    async fn play(&self, record: MatchRecord) -> Result<MatchSummary> {
        let tournament = self.store.get_tournament(&record.tournament_id).await?;
        let agent_a = self.store.get_agent(&record.agent_a_id).await?;
        let agent_b = self.store.get_agent(&record.agent_b_id).await?;

        let mut tally = Tally::default();
        let existing = self.store.list_rounds(&record.match_id).await?;
        for round in &existing {
            tally.record(round);
        }

        let resumed_from = existing.len() as u32;
        obs::emit_match_started(record.match_id.as_str(), resumed_from, tournament.round_count);

        for round_number in resumed_from..tournament.round_count {
            let request_a =
                PlayRequest::new(&record.match_id, round_number, tally.history_a.clone());
            let request_b =
                PlayRequest::new(&record.match_id, round_number, tally.history_b.clone());

            let (move_a, move_b) = tokio::join!(
                self.client.request_move(&agent_a, &request_a),
                self.client.request_move(&agent_b, &request_b),
            );
            let (score_a, score_b) = payoff(move_a.mv, move_b.mv);

            let round = RoundRecord {
                match_id: record.match_id.clone(),
                round_number,
                agent_a_move: move_a.mv,
                agent_b_move: move_b.mv,
                agent_a_score: score_a,
                agent_b_score: score_b,
                agent_a_latency_ms: move_a.elapsed_ms,
                agent_b_latency_ms: move_b.elapsed_ms,
                created_at: Utc::now(),
            };
            self.store
                .append_round(round.clone())
                .await
                .map_err(EngineError::from_storage)?;

            METRICS.inc_rounds_played();
            tally.record(&round);
            debug!(round = round_number, a = %move_a.mv, b = %move_b.mv, "round played");
        }

        let finalized = self
            .store
            .finalize_match(MatchResult {
                match_id: record.match_id.clone(),
                agent_a_score: tally.score_a,
                agent_b_score: tally.score_b,
                completed_at: Utc::now(),
            })
            .await
            .map_err(EngineError::from_storage)?;

        METRICS.inc_matches_completed();
        obs::emit_match_finished(record.match_id.as_str(), tally.score_a, tally.score_b);

        Ok(MatchSummary {
            match_id: record.match_id,
            agent_a_score: tally.score_a,
            agent_b_score: tally.score_b,
            resumed_from,
            rounds_played: tournament.round_count.saturating_sub(resumed_from),
            agent_a: finalized.agent_a,
            agent_b: finalized.agent_b,
        })
    }
}
