//! Scheduling, orchestrated runs and read models, end to end on the
//! in-memory store with stub agents.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use arena_core::{
    EngineConfig, EngineError, Orchestrator, PairingStrategy, RunOutcome, Timeframe,
};
use arena_state::fakes::MemoryArenaStore;
use arena_state::{
    AgentDirectory, AgentId, MatchFilter, MatchLedger, NewAgent, NewTournament, StorageError,
    TournamentId, TournamentRecord,
};
use common::*;

fn orchestrator(store: &Arc<MemoryArenaStore>, client: ScriptedClient) -> Orchestrator {
    Orchestrator::new(store.clone(), Arc::new(client), EngineConfig::default())
}

async fn tournament(store: &MemoryArenaStore, rounds: u32) -> TournamentRecord {
    store
        .create_tournament(NewTournament::new("league").with_round_count(rounds))
        .await
        .unwrap()
}

async fn agents(store: &MemoryArenaStore, names: &[&str]) -> Vec<AgentId> {
    let mut ids = Vec::new();
    for name in names {
        ids.push(eligible_agent(store, name).await.agent_id);
    }
    ids
}

// ===========================================================================
// Scheduling
// ===========================================================================

#[tokio::test]
async fn round_robin_schedules_every_pair_of_eligible_agents() {
    let store = memory_store();
    agents(&store, &["a", "b", "c", "d"]).await;
    // Neither of these may be scheduled.
    store
        .register_agent(NewAgent::new("fresh", "http://fresh.test", "t"))
        .await
        .unwrap();
    let retired = eligible_agent(store.as_ref(), "retired").await;
    store.set_agent_active(&retired.agent_id, false).await.unwrap();

    let t = tournament(&store, 5).await;
    let orch = orchestrator(&store, ScriptedClient::new());
    let report = orch
        .schedule(&t.tournament_id, PairingStrategy::RoundRobin)
        .await
        .unwrap();

    assert_eq!(report.matches.len(), 6);
    assert!(report.tournament.start_time.is_some());

    let eligible: HashSet<_> = store
        .list_agents(&arena_state::AgentFilter::eligible())
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.agent_id)
        .collect();
    let mut pairs = HashSet::new();
    for m in &report.matches {
        assert_ne!(m.agent_a_id, m.agent_b_id);
        assert!(eligible.contains(&m.agent_a_id) && eligible.contains(&m.agent_b_id));
        let key = if m.agent_a_id < m.agent_b_id {
            (m.agent_a_id.clone(), m.agent_b_id.clone())
        } else {
            (m.agent_b_id.clone(), m.agent_a_id.clone())
        };
        assert!(pairs.insert(key));
    }
}

#[tokio::test]
async fn rating_schedule_with_five_agents() {
    let store = memory_store();
    let ids = agents(&store, &["e", "d", "c", "b", "a"]).await;
    // Averages: e=1, d=2, c=3, b=4, a=0 (no matches yet)
    for (i, id) in ids.iter().take(4).enumerate() {
        store
            .seed_agent_stats(id, 2, 2 * (i as u64 + 1))
            .unwrap();
    }

    let t = tournament(&store, 5).await;
    let orch = orchestrator(&store, ScriptedClient::new());
    let report = orch
        .schedule(&t.tournament_id, "elo".parse().unwrap())
        .await
        .unwrap();

    assert_eq!(report.strategy, PairingStrategy::RatingBased);
    assert_eq!(report.matches.len(), 15);

    // Ranked: b, c, d, e, a. The best agent meets the next three.
    let (e, d, c, b, a) = (&ids[0], &ids[1], &ids[2], &ids[3], &ids[4]);
    let first: Vec<_> = report.matches[..3]
        .iter()
        .map(|m| (&m.agent_a_id, &m.agent_b_id))
        .collect();
    assert_eq!(first, vec![(b, c), (b, d), (b, e)]);
    let last: Vec<_> = report.matches[12..]
        .iter()
        .map(|m| (&m.agent_a_id, &m.agent_b_id))
        .collect();
    assert_eq!(last, vec![(a, b), (a, c), (a, d)]);
    assert!(report
        .matches
        .iter()
        .all(|m| m.agent_a_id != m.agent_b_id));
}

#[tokio::test]
async fn schedule_needs_two_eligible_agents() {
    let store = memory_store();
    agents(&store, &["lonely"]).await;
    let t = tournament(&store, 5).await;
    let orch = orchestrator(&store, ScriptedClient::new());

    let err = orch
        .schedule(&t.tournament_id, PairingStrategy::RoundRobin)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientAgents { found: 1 }));

    let after = store.get_tournament(&t.tournament_id).await.unwrap();
    assert!(after.start_time.is_none());
    assert!(store
        .list_matches(&t.tournament_id, MatchFilter::All)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn schedule_rejects_unknown_and_ended_tournaments() {
    let store = memory_store();
    agents(&store, &["a", "b"]).await;
    let orch = orchestrator(&store, ScriptedClient::new());

    let err = orch
        .schedule(&TournamentId::from("nope"), PairingStrategy::RoundRobin)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Storage(StorageError::TournamentNotFound { .. })
    ));

    let t = tournament(&store, 5).await;
    store
        .mark_tournament_ended(&t.tournament_id, chrono::Utc::now())
        .await
        .unwrap();
    let err = orch
        .schedule(&t.tournament_id, PairingStrategy::RoundRobin)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TournamentEnded { .. }));
}

// ===========================================================================
// Running
// ===========================================================================

#[tokio::test]
async fn full_run_completes_tournament() {
    let store = memory_store();
    agents(&store, &["dove", "hawk", "mirror", "flip"]).await;
    let t = tournament(&store, 6).await;
    let client = ScriptedClient::new()
        .with("dove", always_cooperate)
        .with("hawk", always_defect)
        .with("mirror", tit_for_tat)
        .with("flip", alternate);
    let orch = orchestrator(&store, client);
    orch.schedule(&t.tournament_id, PairingStrategy::RoundRobin)
        .await
        .unwrap();

    let before = orch.status(&t.tournament_id).await.unwrap();
    assert_eq!(before.progress, "0/6");
    assert_eq!(before.percent_complete, 0.0);

    let report = orch.run(&t.tournament_id, 2).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.attempted, 6);
    assert_eq!(report.failed, 0);
    assert!(!orch.is_running(&t.tournament_id));

    let status = orch.status(&t.tournament_id).await.unwrap();
    assert_eq!(status.progress, "6/6");
    assert!((status.percent_complete - 100.0).abs() < f64::EPSILON);
    assert!(status.end_time.is_some());
    assert!(!status.is_active);

    // Every agent played three matches and its average is consistent.
    for agent in store
        .list_agents(&arena_state::AgentFilter::all())
        .await
        .unwrap()
    {
        assert_eq!(agent.total_matches, 3);
        let expected = agent.total_score as f64 / 3.0;
        assert!((agent.average_score - expected).abs() < 1e-9);
    }

    // Ended tournaments cannot be run again.
    let err = orch.run(&t.tournament_id, 2).await.unwrap_err();
    assert!(matches!(err, EngineError::TournamentEnded { .. }));
}

#[tokio::test]
async fn run_without_pending_matches_finishes_immediately() {
    let store = memory_store();
    let t = tournament(&store, 3).await;
    let orch = orchestrator(&store, ScriptedClient::new());

    let report = orch.run(&t.tournament_id, 5).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.attempted, 0);
    assert!(store
        .get_tournament(&t.tournament_id)
        .await
        .unwrap()
        .has_ended());
}

#[tokio::test]
async fn zero_concurrency_is_rejected() {
    let store = memory_store();
    let t = tournament(&store, 3).await;
    let orch = orchestrator(&store, ScriptedClient::new());

    let err = orch.run(&t.tournament_id, 0).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidConcurrency));
    assert!(!orch.is_running(&t.tournament_id));
}

#[tokio::test]
async fn failed_match_leaves_tournament_partially_complete() {
    let store = memory_store();
    agents(&store, &["a", "b", "c"]).await;
    let t = tournament(&store, 4).await;
    let orch = orchestrator(&store, ScriptedClient::new());
    let report = orch
        .schedule(&t.tournament_id, PairingStrategy::RoundRobin)
        .await
        .unwrap();
    store.fail_append_once(&report.matches[1].match_id, 2);

    let first = orch.run(&t.tournament_id, 3).await.unwrap();
    assert_eq!(first.outcome, RunOutcome::PartiallyComplete { stragglers: 1 });
    assert_eq!(first.failed, 1);

    let status = orch.status(&t.tournament_id).await.unwrap();
    assert_eq!(status.progress, "2/3");
    assert!(status.is_active);
    assert!(status.end_time.is_none());

    let second = orch.run(&t.tournament_id, 3).await.unwrap();
    assert_eq!(second.outcome, RunOutcome::Completed);
    assert_eq!(second.attempted, 1);

    let straggler = store
        .get_match(&report.matches[1].match_id)
        .await
        .unwrap();
    assert!(straggler.is_complete);
    assert_eq!(
        store
            .list_rounds(&straggler.match_id)
            .await
            .unwrap()
            .len(),
        4
    );
}

#[tokio::test]
async fn second_run_of_same_tournament_is_rejected() {
    let store = memory_store();
    agents(&store, &["dove", "hawk"]).await;
    let t = tournament(&store, 3).await;

    let client = Arc::new(GatedClient::new(
        ScriptedClient::new()
            .with("dove", always_cooperate)
            .with("hawk", always_defect),
    ));
    let orch = Arc::new(Orchestrator::new(
        store.clone(),
        client.clone(),
        EngineConfig::default(),
    ));
    let report = orch
        .schedule(&t.tournament_id, PairingStrategy::RoundRobin)
        .await
        .unwrap();
    let match_id = report.matches[0].match_id.clone();

    let running = {
        let orch = Arc::clone(&orch);
        let id = t.tournament_id.clone();
        tokio::spawn(async move { orch.run(&id, 1).await })
    };
    client.wait_for_request().await;
    assert!(orch.is_running(&t.tournament_id));

    let err = orch.run(&t.tournament_id, 1).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyRunning { .. }));
    let err = orch.run_match(&match_id).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyRunning { .. }));

    client.open();
    let report = running.await.unwrap().unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(!orch.is_running(&t.tournament_id));

    // Every round was requested once per agent.
    for round in 0..3 {
        assert_eq!(client.inner().times_asked("dove", match_id.as_str(), round), 1);
        assert_eq!(client.inner().times_asked("hawk", match_id.as_str(), round), 1);
    }
    let done = store.get_match(&match_id).await.unwrap();
    assert_eq!((done.agent_a_score, done.agent_b_score), (0, 15));
}

#[tokio::test]
async fn run_match_plays_one_match_and_ends_tournament_when_last() {
    let store = memory_store();
    agents(&store, &["dove", "hawk"]).await;
    let t = tournament(&store, 3).await;
    let orch = orchestrator(
        &store,
        ScriptedClient::new()
            .with("dove", always_cooperate)
            .with("hawk", always_defect),
    );
    let report = orch
        .schedule(&t.tournament_id, PairingStrategy::RoundRobin)
        .await
        .unwrap();
    let match_id = &report.matches[0].match_id;

    let summary = orch.run_match(match_id).await.unwrap();
    assert_eq!((summary.agent_a_score, summary.agent_b_score), (0, 15));
    assert!(store
        .get_tournament(&t.tournament_id)
        .await
        .unwrap()
        .has_ended());

    let err = orch.run_match(match_id).await.unwrap_err();
    assert!(matches!(err, EngineError::MatchAlreadyComplete { .. }));
}

// ===========================================================================
// Leaderboard
// ===========================================================================

#[tokio::test]
async fn leaderboard_ranks_active_agents_by_average() {
    let store = memory_store();
    let ids = agents(&store, &["dove", "hawk", "mirror", "idle"]).await;
    let t = tournament(&store, 5).await;
    let orch = orchestrator(
        &store,
        ScriptedClient::new()
            .with("dove", always_cooperate)
            .with("hawk", always_defect)
            .with("mirror", tit_for_tat),
    );
    // Keep "idle" out of the tournament.
    store.set_agent_quarantined(&ids[3], true).await.unwrap();
    orch.schedule(&t.tournament_id, PairingStrategy::RoundRobin)
        .await
        .unwrap();
    orch.run(&t.tournament_id, 3).await.unwrap();

    let board = orch.leaderboard(None, Timeframe::All).await.unwrap();
    assert_eq!(board.len(), 4);
    assert_eq!(board[0].name, "hawk");
    assert_eq!(board[0].rank, 1);
    assert_eq!(board.last().unwrap().name, "idle");
    for pair in board.windows(2) {
        assert!(pair[0].average_score >= pair[1].average_score);
    }

    let scoped = orch
        .leaderboard(Some(&t.tournament_id), Timeframe::All)
        .await
        .unwrap();
    let names: Vec<_> = scoped.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names.len(), 3);
    assert!(!names.contains(&"idle"));
    assert_eq!(scoped[2].rank, 3);

    // Everyone was updated moments ago, so the daily window keeps them all.
    let daily = orch.leaderboard(None, Timeframe::Daily).await.unwrap();
    assert_eq!(daily.len(), 4);

    store.set_agent_active(&ids[0], false).await.unwrap();
    let board = orch.leaderboard(None, Timeframe::Weekly).await.unwrap();
    assert!(board.iter().all(|e| e.name != "dove"));
}
