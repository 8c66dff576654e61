//! Move protocol client.
//!
//! One request per agent per round, a hard timeout, no retries. Whatever
//! goes wrong (timeout, refused connection, error status, garbage body,
//! unknown symbol) the agent is recorded as having defected. Callers never
//! see an error from this module.

use std::time::{Duration, Instant};

use arena_state::{AgentRecord, Move};
use async_trait::async_trait;
use tracing::warn;

use crate::config::EngineConfig;
use crate::metrics::METRICS;
use crate::obs;
use crate::protocol::{PlayRequest, PlayResponse};

/// Why a move was forced to a defect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveFault {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("agent returned HTTP {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl MoveFault {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MoveFault::Timeout
        } else if err.is_decode() {
            MoveFault::Malformed(err.to_string())
        } else {
            MoveFault::Transport(err.to_string())
        }
    }
}

/// Result of asking one agent for one move.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    pub mv: Move,
    /// Wall time of the whole attempt, failures included
    pub elapsed_ms: f64,
    pub fault: Option<MoveFault>,
}

impl MoveOutcome {
    pub fn played(mv: Move, elapsed_ms: f64) -> Self {
        Self {
            mv,
            elapsed_ms,
            fault: None,
        }
    }

    pub fn defaulted(fault: MoveFault, elapsed_ms: f64) -> Self {
        Self {
            mv: Move::Defect,
            elapsed_ms,
            fault: Some(fault),
        }
    }
}

/// Source of agent moves. Infallible by contract.
#[async_trait]
pub trait MoveClient: Send + Sync {
    async fn request_move(&self, agent: &AgentRecord, request: &PlayRequest) -> MoveOutcome;
}

/// Production client posting to each agent's callback URL.
#[derive(Debug, Clone)]
pub struct HttpMoveClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpMoveClient {
    /// Falls back to a stock client if the configured one cannot be built.
    /// The move timeout is applied per request either way.
    pub fn new(config: &EngineConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.move_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|err| {
                warn!(
                    error = %err,
                    user_agent = %config.user_agent,
                    "failed to build configured HTTP client, using defaults"
                );
                reqwest::Client::new()
            });
        Self {
            client,
            timeout: config.move_timeout,
        }
    }

    async fn fetch(&self, agent: &AgentRecord, request: &PlayRequest) -> Result<Move, MoveFault> {
        let response = self
            .client
            .post(&agent.callback_url)
            .bearer_auth(&agent.auth_token)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(MoveFault::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(MoveFault::Status(status.as_u16()));
        }

        // The per-request timeout also bounds reading the body.
        let body = response.bytes().await.map_err(MoveFault::from_reqwest)?;
        let parsed: PlayResponse =
            serde_json::from_slice(&body).map_err(|e| MoveFault::Malformed(e.to_string()))?;

        Move::from_symbol(&parsed.mv)
            .ok_or_else(|| MoveFault::Malformed(format!("invalid move {:?}", parsed.mv)))
    }
}

impl Default for HttpMoveClient {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[async_trait]
impl MoveClient for HttpMoveClient {
    async fn request_move(&self, agent: &AgentRecord, request: &PlayRequest) -> MoveOutcome {
        METRICS.inc_moves_requested();
        let started = Instant::now();
        let result = self.fetch(agent, request).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(mv) => MoveOutcome::played(mv, elapsed_ms),
            Err(fault) => {
                METRICS.inc_moves_defaulted();
                obs::emit_move_defaulted(&agent.name, request.round, &fault);
                MoveOutcome::defaulted(fault, elapsed_ms)
            }
        }
    }
}
