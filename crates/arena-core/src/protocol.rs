//! Wire types of the agent callback protocol.
//!
//! Request, posted to the agent's callback URL:
//!
//! ```json
//! {"match_id": "...", "round": 3, "history": [{"self": "C", "opponent": "D"}]}
//! ```
//!
//! Response: `{"move": "C"}` or `{"move": "D"}`.

use arena_state::{MatchId, Move};
use serde::{Deserialize, Serialize};

/// One past round seen from the requesting agent's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "self")]
    pub own: Move,
    pub opponent: Move,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayRequest {
    pub match_id: String,
    pub round: u32,
    /// Oldest first
    pub history: Vec<HistoryEntry>,
}

impl PlayRequest {
    pub fn new(match_id: &MatchId, round: u32, history: Vec<HistoryEntry>) -> Self {
        Self {
            match_id: match_id.to_string(),
            round,
            history,
        }
    }
}

/// Raw response body. The move stays a string so a bad symbol can be
/// told apart from a body that is not JSON at all.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayResponse {
    #[serde(rename = "move")]
    pub mv: String,
}
