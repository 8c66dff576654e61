//! Structured lifecycle events for tournaments, matches and moves.
//!
//! Every event carries an `event` field so log pipelines can filter on it,
//! e.g. `event=match.finished`. Match-scoped work runs inside a
//! [`MatchSpan`] so nested events inherit the match and tournament ids.

use tracing::{debug, info, warn};

/// Span guard tagging everything a match runner logs.
///
/// ```ignore
/// let span = MatchSpan::new("t-1", "m-42");
/// runner.run(&match_id).instrument(span.span()).await
/// ```
pub struct MatchSpan {
    span: tracing::Span,
}

impl MatchSpan {
    pub fn new(tournament_id: &str, match_id: &str) -> Self {
        Self {
            span: tracing::info_span!("arena.match", tournament_id = %tournament_id, match_id = %match_id),
        }
    }

    /// The span, for `Instrument::instrument` on a future.
    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }
}

pub fn emit_tournament_scheduled(tournament_id: &str, strategy: &str, matches: usize) {
    info!(
        event = "tournament.scheduled",
        tournament_id = %tournament_id,
        strategy = %strategy,
        matches = matches,
    );
}

pub fn emit_run_started(tournament_id: &str, pending: usize, concurrency: usize) {
    info!(
        event = "tournament.run_started",
        tournament_id = %tournament_id,
        pending = pending,
        concurrency = concurrency,
    );
}

/// Emitted after every batch with its success/failure split.
pub fn emit_batch_finished(tournament_id: &str, batch: usize, succeeded: usize, failed: usize) {
    info!(
        event = "tournament.batch_finished",
        tournament_id = %tournament_id,
        batch = batch,
        succeeded = succeeded,
        failed = failed,
    );
}

pub fn emit_tournament_finished(tournament_id: &str, duration_ms: u64, stragglers: usize) {
    info!(
        event = "tournament.finished",
        tournament_id = %tournament_id,
        duration_ms = duration_ms,
        stragglers = stragglers,
        complete = stragglers == 0,
    );
}

pub fn emit_match_started(match_id: &str, resume_from: u32, round_count: u32) {
    info!(
        event = "match.started",
        match_id = %match_id,
        resume_from = resume_from,
        round_count = round_count,
    );
}

pub fn emit_match_finished(match_id: &str, agent_a_score: u64, agent_b_score: u64) {
    info!(
        event = "match.finished",
        match_id = %match_id,
        agent_a_score = agent_a_score,
        agent_b_score = agent_b_score,
    );
}

/// Match aborted by a persistence failure (warning level).
pub fn emit_match_failed(match_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "match.failed", match_id = %match_id, error = %error);
}

/// An agent's move was forced to a defect.
pub fn emit_move_defaulted(agent_name: &str, round: u32, fault: &dyn std::fmt::Display) {
    debug!(
        event = "move.defaulted",
        agent = %agent_name,
        round = round,
        fault = %fault,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_span_is_reusable() {
        let span = MatchSpan::new("t-1", "m-1");
        let _a = span.span().entered();
        emit_match_started("m-1", 0, 10);
    }
}
