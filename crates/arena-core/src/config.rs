//! Engine configuration.
//!
//! Defaults suit production; `from_env` lets an operator tune the move
//! timeout and batch size without a rebuild.

use std::time::Duration;

use arena_state::DEFAULT_ROUND_COUNT;
use tracing::warn;

pub const DEFAULT_MOVE_TIMEOUT: Duration = Duration::from_millis(200);
pub const DEFAULT_CONCURRENCY: usize = 5;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard limit on one move request, send to full response
    pub move_timeout: Duration,
    /// Matches per batch when a run does not specify one
    pub default_concurrency: usize,
    /// Rounds per match for tournaments created without an explicit count
    pub default_round_count: u32,
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            move_timeout: DEFAULT_MOVE_TIMEOUT,
            default_concurrency: DEFAULT_CONCURRENCY,
            default_round_count: DEFAULT_ROUND_COUNT,
            user_agent: format!("dilemma-arena/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl EngineConfig {
    /// Build from environment variables
    ///
    /// Reads:
    /// - ARENA_MOVE_TIMEOUT_MS (default: 200)
    /// - ARENA_CONCURRENCY (default: 5)
    /// - ARENA_ROUND_COUNT (default: 200)
    ///
    /// Unparseable or zero values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(ms) = positive::<u64>(&lookup, "ARENA_MOVE_TIMEOUT_MS") {
            config.move_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = positive::<usize>(&lookup, "ARENA_CONCURRENCY") {
            config.default_concurrency = n;
        }
        if let Some(n) = positive::<u32>(&lookup, "ARENA_ROUND_COUNT") {
            config.default_round_count = n;
        }

        config
    }
}

fn positive<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) if v > T::default() => Some(v),
        _ => {
            warn!(key, value = %raw, "ignoring invalid configuration value");
            None
        }
    }
}
