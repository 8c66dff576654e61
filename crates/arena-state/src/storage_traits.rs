//! Storage trait definitions for the arena
//!
//! These traits define the persistence seams the engine depends on:
//! - `AgentDirectory`: agent identity, callback endpoint, eligibility flags
//!   and running statistics
//! - `MatchLedger`: tournaments, matches and the append-only round history
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Rounds per match when a tournament does not say otherwise.
pub const DEFAULT_ROUND_COUNT: u32 = 200;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random id
            pub fn new() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

string_id!(
    /// Unique identifier of a registered agent
    AgentId
);
string_id!(
    /// Unique identifier of a tournament
    TournamentId
);
string_id!(
    /// Unique identifier of a match
    MatchId
);

// ---------------------------------------------------------------------------
// Moves
// ---------------------------------------------------------------------------

/// One of the two moves of the game, serialized as its wire symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Move {
    #[serde(rename = "C")]
    Cooperate,
    #[serde(rename = "D")]
    Defect,
}

impl Move {
    pub fn symbol(self) -> &'static str {
        match self {
            Move::Cooperate => "C",
            Move::Defect => "D",
        }
    }

    /// Parse a wire symbol. Anything other than `C` or `D` is rejected.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "C" => Some(Move::Cooperate),
            "D" => Some(Move::Defect),
            _ => None,
        }
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

// ---------------------------------------------------------------------------
// AgentDirectory
// ---------------------------------------------------------------------------

/// A registered agent and its running statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: AgentId,
    pub name: String,
    pub description: Option<String>,
    pub callback_url: String,
    pub auth_token: String,
    pub is_active: bool,
    pub is_quarantined: bool,
    pub total_matches: u64,
    pub total_score: u64,
    /// `total_score / total_matches`, 0 before the first completed match
    pub average_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AgentRecord {
    /// Active and not quarantined, hence schedulable.
    pub fn is_eligible(&self) -> bool {
        self.is_active && !self.is_quarantined
    }

    /// Score used for rating-based pairing and the leaderboard.
    pub fn rating(&self) -> f64 {
        if self.total_matches == 0 {
            0.0
        } else {
            self.average_score
        }
    }
}

/// Registration request for a new agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub description: Option<String>,
    pub callback_url: String,
    pub auth_token: String,
    /// New agents start in quarantine unless released explicitly
    pub quarantined: bool,
}

impl NewAgent {
    pub fn new(
        name: impl Into<String>,
        callback_url: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            callback_url: callback_url.into(),
            auth_token: auth_token.into(),
            quarantined: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_quarantine(mut self, quarantined: bool) -> Self {
        self.quarantined = quarantined;
        self
    }

    pub(crate) fn validate(&self) -> StorageResult<()> {
        if self.name.trim().is_empty() {
            return Err(StorageError::InvalidField {
                field: "name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.callback_url.trim().is_empty() {
            return Err(StorageError::InvalidField {
                field: "callback_url".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn into_record(self) -> AgentRecord {
        AgentRecord {
            agent_id: AgentId::new(),
            name: self.name,
            description: self.description,
            callback_url: self.callback_url,
            auth_token: self.auth_token,
            is_active: true,
            is_quarantined: self.quarantined,
            total_matches: 0,
            total_score: 0,
            average_score: 0.0,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// Selection of agents returned by [`AgentDirectory::list_agents`].
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub active_only: bool,
    pub eligible_only: bool,
    pub updated_since: Option<DateTime<Utc>>,
}

impl AgentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Self::default()
        }
    }

    /// Active and not quarantined.
    pub fn eligible() -> Self {
        Self {
            active_only: true,
            eligible_only: true,
            ..Self::default()
        }
    }

    pub fn updated_since(mut self, since: DateTime<Utc>) -> Self {
        self.updated_since = Some(since);
        self
    }

    pub fn matches(&self, agent: &AgentRecord) -> bool {
        if self.active_only && !agent.is_active {
            return false;
        }
        if self.eligible_only && !agent.is_eligible() {
            return false;
        }
        match self.updated_since {
            Some(since) => agent.updated_at.map(|t| t >= since).unwrap_or(false),
            None => true,
        }
    }
}

/// Agent identity and statistics.
///
/// Guarantees:
/// - Agent names are unique.
/// - Agents are never deleted, only deactivated.
/// - `list_agents` returns agents in registration order.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Register a new agent. Fails with `DuplicateAgentName` on a name clash.
    async fn register_agent(&self, agent: NewAgent) -> StorageResult<AgentRecord>;

    /// Fetch an agent by id.
    async fn get_agent(&self, agent_id: &AgentId) -> StorageResult<AgentRecord>;

    /// List agents matching `filter`, oldest registration first.
    async fn list_agents(&self, filter: &AgentFilter) -> StorageResult<Vec<AgentRecord>>;

    /// Activate or deactivate an agent.
    async fn set_agent_active(&self, agent_id: &AgentId, active: bool)
        -> StorageResult<AgentRecord>;

    /// Put an agent into or release it from quarantine.
    async fn set_agent_quarantined(
        &self,
        agent_id: &AgentId,
        quarantined: bool,
    ) -> StorageResult<AgentRecord>;
}

// ---------------------------------------------------------------------------
// MatchLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentRecord {
    pub tournament_id: TournamentId,
    pub name: String,
    pub description: Option<String>,
    /// Rounds per match
    pub round_count: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl TournamentRecord {
    pub fn has_ended(&self) -> bool {
        self.end_time.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTournament {
    pub name: String,
    pub description: Option<String>,
    pub round_count: u32,
}

impl NewTournament {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            round_count: DEFAULT_ROUND_COUNT,
        }
    }

    pub fn with_round_count(mut self, round_count: u32) -> Self {
        self.round_count = round_count;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub(crate) fn into_record(self) -> StorageResult<TournamentRecord> {
        if self.round_count == 0 {
            return Err(StorageError::InvalidField {
                field: "round_count".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(TournamentRecord {
            tournament_id: TournamentId::new(),
            name: self.name,
            description: self.description,
            round_count: self.round_count,
            start_time: None,
            end_time: None,
            is_active: true,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: MatchId,
    pub tournament_id: TournamentId,
    /// Row player of the payoff matrix
    pub agent_a_id: AgentId,
    /// Column player of the payoff matrix
    pub agent_b_id: AgentId,
    pub agent_a_score: u64,
    pub agent_b_score: u64,
    pub rounds_completed: u32,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A pairing to be created by [`MatchLedger::create_matches`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMatch {
    pub agent_a_id: AgentId,
    pub agent_b_id: AgentId,
}

impl NewMatch {
    pub fn new(agent_a_id: AgentId, agent_b_id: AgentId) -> Self {
        Self {
            agent_a_id,
            agent_b_id,
        }
    }

    pub(crate) fn into_record(self, tournament_id: &TournamentId) -> StorageResult<MatchRecord> {
        if self.agent_a_id == self.agent_b_id {
            return Err(StorageError::SelfPairing {
                agent_id: self.agent_a_id.0,
            });
        }
        Ok(MatchRecord {
            match_id: MatchId::new(),
            tournament_id: tournament_id.clone(),
            agent_a_id: self.agent_a_id,
            agent_b_id: self.agent_b_id,
            agent_a_score: 0,
            agent_b_score: 0,
            rounds_completed: 0,
            is_complete: false,
            created_at: Utc::now(),
            completed_at: None,
        })
    }
}

/// Which matches [`MatchLedger::list_matches`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchFilter {
    All,
    Incomplete,
    Complete,
}

impl MatchFilter {
    pub fn matches(self, record: &MatchRecord) -> bool {
        match self {
            MatchFilter::All => true,
            MatchFilter::Incomplete => !record.is_complete,
            MatchFilter::Complete => record.is_complete,
        }
    }
}

/// One scored exchange of moves. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub match_id: MatchId,
    /// 0-based, strictly increasing within a match
    pub round_number: u32,
    pub agent_a_move: Move,
    pub agent_b_move: Move,
    pub agent_a_score: u32,
    pub agent_b_score: u32,
    pub agent_a_latency_ms: f64,
    pub agent_b_latency_ms: f64,
    pub created_at: DateTime<Utc>,
}

/// Final tally handed to [`MatchLedger::finalize_match`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub match_id: MatchId,
    pub agent_a_score: u64,
    pub agent_b_score: u64,
    pub completed_at: DateTime<Utc>,
}

/// State after a successful [`MatchLedger::finalize_match`].
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedMatch {
    pub record: MatchRecord,
    pub agent_a: AgentRecord,
    pub agent_b: AgentRecord,
}

/// Tournament, match and round persistence.
///
/// Guarantees:
/// - `create_matches` is all-or-nothing and rejects self-pairings.
/// - `append_round` accepts only `round_number == rounds_completed`, and
///   stores the round together with the bumped `rounds_completed`.
/// - `finalize_match` marks the match complete and applies both agents'
///   `total_matches`/`total_score`/`average_score` updates as one unit; a
///   second call for the same match fails with `MatchAlreadyComplete`.
/// - An ended tournament is never modified again.
#[async_trait]
pub trait MatchLedger: Send + Sync {
    async fn create_tournament(&self, tournament: NewTournament)
        -> StorageResult<TournamentRecord>;

    async fn get_tournament(&self, tournament_id: &TournamentId)
        -> StorageResult<TournamentRecord>;

    /// List tournaments, oldest first.
    async fn list_tournaments(&self, active_only: bool) -> StorageResult<Vec<TournamentRecord>>;

    /// Record the scheduling time. An existing `start_time` is kept.
    async fn mark_tournament_started(
        &self,
        tournament_id: &TournamentId,
        at: DateTime<Utc>,
    ) -> StorageResult<TournamentRecord>;

    /// Set `end_time` and clear `is_active`. No-op on an ended tournament.
    async fn mark_tournament_ended(
        &self,
        tournament_id: &TournamentId,
        at: DateTime<Utc>,
    ) -> StorageResult<TournamentRecord>;

    /// Create all `matches` for a tournament in one unit.
    async fn create_matches(
        &self,
        tournament_id: &TournamentId,
        matches: Vec<NewMatch>,
    ) -> StorageResult<Vec<MatchRecord>>;

    async fn get_match(&self, match_id: &MatchId) -> StorageResult<MatchRecord>;

    /// List a tournament's matches in creation order.
    async fn list_matches(
        &self,
        tournament_id: &TournamentId,
        filter: MatchFilter,
    ) -> StorageResult<Vec<MatchRecord>>;

    /// Append the next round of a match and advance its `rounds_completed`.
    async fn append_round(&self, round: RoundRecord) -> StorageResult<MatchRecord>;

    /// All rounds of a match ordered by round number.
    async fn list_rounds(&self, match_id: &MatchId) -> StorageResult<Vec<RoundRecord>>;

    /// Complete a match and fold its scores into both agents' statistics.
    async fn finalize_match(&self, result: MatchResult) -> StorageResult<FinalizedMatch>;
}

/// Everything the engine needs from persistence.
pub trait ArenaStore: AgentDirectory + MatchLedger {}

impl<T: AgentDirectory + MatchLedger + ?Sized> ArenaStore for T {}

/// Fold one match score into an agent's running statistics.
pub fn apply_match_score(agent: &mut AgentRecord, score: u64, at: DateTime<Utc>) {
    agent.total_matches += 1;
    agent.total_score += score;
    agent.average_score = agent.total_score as f64 / agent.total_matches as f64;
    agent.updated_at = Some(at);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> AgentRecord {
        NewAgent::new("tit-for-tat", "http://localhost:9000/move", "secret").into_record()
    }

    #[test]
    fn new_agents_start_active_and_quarantined() {
        let a = agent();
        assert!(a.is_active);
        assert!(a.is_quarantined);
        assert!(!a.is_eligible());
        assert_eq!(a.rating(), 0.0);
    }

    #[test]
    fn apply_match_score_keeps_average_consistent() {
        let mut a = agent();
        let now = Utc::now();
        apply_match_score(&mut a, 600, now);
        apply_match_score(&mut a, 300, now);

        assert_eq!(a.total_matches, 2);
        assert_eq!(a.total_score, 900);
        assert_eq!(a.average_score, 450.0);
        assert_eq!(a.updated_at, Some(now));
    }

    #[test]
    fn move_symbols_round_trip_through_serde() {
        assert_eq!(serde_json::to_string(&Move::Cooperate).unwrap(), "\"C\"");
        assert_eq!(serde_json::from_str::<Move>("\"D\"").unwrap(), Move::Defect);
        assert!(serde_json::from_str::<Move>("\"X\"").is_err());
        assert_eq!(Move::from_symbol("C"), Some(Move::Cooperate));
        assert_eq!(Move::from_symbol("c"), None);
    }

    #[test]
    fn self_pairing_is_rejected() {
        let id = AgentId::new();
        let err = NewMatch::new(id.clone(), id)
            .into_record(&TournamentId::new())
            .unwrap_err();
        assert!(matches!(err, StorageError::SelfPairing { .. }));
    }

    #[test]
    fn zero_round_tournaments_are_rejected() {
        let err = NewTournament::new("empty")
            .with_round_count(0)
            .into_record()
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidField { .. }));
    }

    #[test]
    fn agent_filter_respects_update_window() {
        let mut a = agent();
        let now = Utc::now();
        assert!(!AgentFilter::active().updated_since(now).matches(&a));
        a.updated_at = Some(now);
        assert!(AgentFilter::active().updated_since(now).matches(&a));
        a.is_active = false;
        assert!(!AgentFilter::active().matches(&a));
        assert!(AgentFilter::all().matches(&a));
    }
}
