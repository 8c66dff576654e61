//! Shared fixtures: deterministic stub agents and store helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arena_core::{HistoryEntry, MoveClient, MoveOutcome, PlayRequest};
use arena_state::fakes::MemoryArenaStore;
use arena_state::{AgentDirectory, AgentRecord, Move, NewAgent};
use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

pub type Strategy = fn(&[HistoryEntry]) -> Move;

pub fn always_cooperate(_: &[HistoryEntry]) -> Move {
    Move::Cooperate
}

pub fn always_defect(_: &[HistoryEntry]) -> Move {
    Move::Defect
}

pub fn tit_for_tat(history: &[HistoryEntry]) -> Move {
    history
        .last()
        .map(|entry| entry.opponent)
        .unwrap_or(Move::Cooperate)
}

pub fn alternate(history: &[HistoryEntry]) -> Move {
    if history.len() % 2 == 0 {
        Move::Cooperate
    } else {
        Move::Defect
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub agent: String,
    pub match_id: String,
    pub round: u32,
    pub history: Vec<HistoryEntry>,
}

/// Stub client answering with a fixed strategy per agent name.
/// Unknown agents always defect.
#[derive(Default)]
pub struct ScriptedClient {
    strategies: HashMap<String, Strategy>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, agent: &str, strategy: Strategy) -> Self {
        self.strategies.insert(agent.to_string(), strategy);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// How often `agent` was asked for `round` of `match_id`.
    pub fn times_asked(&self, agent: &str, match_id: &str, round: u32) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.agent == agent && c.match_id == match_id && c.round == round)
            .count()
    }
}

#[async_trait]
impl MoveClient for ScriptedClient {
    async fn request_move(&self, agent: &AgentRecord, request: &PlayRequest) -> MoveOutcome {
        self.calls.lock().unwrap().push(Call {
            agent: agent.name.clone(),
            match_id: request.match_id.clone(),
            round: request.round,
            history: request.history.clone(),
        });
        let strategy = self
            .strategies
            .get(&agent.name)
            .copied()
            .unwrap_or(always_defect as Strategy);
        MoveOutcome::played(strategy(&request.history), 1.0)
    }
}

/// Wraps a client and holds every request until [`GatedClient::open`].
pub struct GatedClient {
    inner: ScriptedClient,
    entered: Notify,
    gate: Semaphore,
}

impl GatedClient {
    pub fn new(inner: ScriptedClient) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    /// Resolves once at least one request is waiting at the gate.
    pub async fn wait_for_request(&self) {
        self.entered.notified().await;
    }

    pub fn open(&self) {
        self.gate.add_permits(1);
    }

    pub fn inner(&self) -> &ScriptedClient {
        &self.inner
    }
}

#[async_trait]
impl MoveClient for GatedClient {
    async fn request_move(&self, agent: &AgentRecord, request: &PlayRequest) -> MoveOutcome {
        self.entered.notify_one();
        // Permits are returned on drop, so one opened permit lets everyone through.
        let _permit = self.gate.acquire().await.expect("gate closed");
        self.inner.request_move(agent, request).await
    }
}

pub fn memory_store() -> Arc<MemoryArenaStore> {
    Arc::new(MemoryArenaStore::new())
}

/// Register an agent and release it from quarantine.
pub async fn eligible_agent(store: &dyn AgentDirectory, name: &str) -> AgentRecord {
    store
        .register_agent(
            NewAgent::new(name, format!("http://{name}.test/move"), "token").with_quarantine(false),
        )
        .await
        .unwrap()
}
