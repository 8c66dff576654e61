//! Dilemma Arena CLI
//!
//! The `arena` command manages agents and tournaments and drives the
//! tournament engine against the configured SurrealDB store.
//!
//! ## Commands
//!
//! - `agent`: register, list, quarantine, activate or deactivate agents
//! - `tournament`: create or list tournaments
//! - `schedule`: generate a tournament's matches
//! - `run`: play all pending matches of a tournament
//! - `run-match`: play a single match
//! - `status`: tournament progress
//! - `leaderboard`: agents ranked by average score
//! - `match show`: one match and its rounds

use std::sync::Arc;

use anyhow::{Context, Result};
use arena_core::{
    EngineConfig, LeaderboardEntry, Orchestrator, PairingStrategy, RunOutcome, Timeframe,
    TournamentStatus,
};
use arena_state::{
    AgentFilter, AgentId, AgentRecord, ArenaStore, MatchId, MatchRecord, NewAgent, NewTournament,
    RoundRecord, SurrealArenaStore, TournamentId, TournamentRecord,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "arena")]
#[command(author = "Dilemma Arena Developers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Iterated Prisoner's Dilemma tournaments between HTTP agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Output format for command results
    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage agents
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },

    /// Manage tournaments
    Tournament {
        #[command(subcommand)]
        action: TournamentAction,
    },

    /// Generate the matches of a tournament from the eligible agents
    Schedule {
        tournament_id: String,

        /// Pairing strategy: round_robin or rating
        #[arg(short, long, default_value = "round_robin")]
        strategy: String,
    },

    /// Play every pending match of a tournament
    Run {
        tournament_id: String,

        /// Matches played concurrently per batch (default: ARENA_CONCURRENCY or 5)
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Play a single match to completion
    RunMatch { match_id: String },

    /// Show tournament progress
    Status { tournament_id: String },

    /// Rank active agents by average score
    Leaderboard {
        /// Only agents that play in this tournament
        #[arg(short, long)]
        tournament: Option<String>,

        /// all, daily or weekly
        #[arg(long, default_value = "all")]
        timeframe: String,
    },

    /// Inspect matches
    Match {
        #[command(subcommand)]
        action: MatchAction,
    },
}

#[derive(Subcommand)]
enum AgentAction {
    /// Register a new agent (quarantined until released)
    Register {
        #[arg(short, long)]
        name: String,

        /// Callback URL receiving move requests
        #[arg(short, long)]
        url: String,

        /// Bearer token sent with every move request
        #[arg(short, long)]
        token: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Skip quarantine and make the agent eligible immediately
        #[arg(long)]
        release: bool,
    },

    /// List agents
    List {
        /// Include inactive agents
        #[arg(long)]
        all: bool,

        /// Only agents eligible for scheduling
        #[arg(long, conflicts_with = "all")]
        eligible: bool,
    },

    /// Put an agent into quarantine, or release it with --release
    Quarantine {
        agent_id: String,

        #[arg(long)]
        release: bool,
    },

    /// Reactivate an agent
    Activate { agent_id: String },

    /// Deactivate an agent (agents are never deleted)
    Deactivate { agent_id: String },
}

#[derive(Subcommand)]
enum TournamentAction {
    /// Create a tournament
    Create {
        #[arg(short, long)]
        name: String,

        /// Rounds per match (default: ARENA_ROUND_COUNT or 200)
        #[arg(short, long)]
        rounds: Option<u32>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// List tournaments
    List {
        /// Only tournaments that have not ended
        #[arg(long)]
        active: bool,
    },
}

#[derive(Subcommand)]
enum MatchAction {
    /// Show one match
    Show {
        match_id: String,

        /// Include every round
        #[arg(long)]
        rounds: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    arena_core::telemetry::init_tracing(cli.json, level);

    let store = SurrealArenaStore::from_env()
        .await
        .context("Failed to connect to arena database")?;
    let config = EngineConfig::from_env();
    let orchestrator = Orchestrator::with_http_client(Arc::new(store), config);

    execute(&orchestrator, cli.command, cli.format).await
}

async fn execute(orch: &Orchestrator, command: Commands, format: Format) -> Result<()> {
    match command {
        Commands::Agent { action } => match action {
            AgentAction::Register {
                name,
                url,
                token,
                description,
                release,
            } => {
                cmd_agent_register(orch, &name, &url, &token, description, release, format)
                    .await
                    .map(|_| ())
            }
            AgentAction::List { all, eligible } => {
                cmd_agent_list(orch, all, eligible, format).await
            }
            AgentAction::Quarantine { agent_id, release } => {
                cmd_agent_quarantine(orch, &agent_id, !release, format).await
            }
            AgentAction::Activate { agent_id } => {
                cmd_agent_active(orch, &agent_id, true, format).await
            }
            AgentAction::Deactivate { agent_id } => {
                cmd_agent_active(orch, &agent_id, false, format).await
            }
        },
        Commands::Tournament { action } => match action {
            TournamentAction::Create {
                name,
                rounds,
                description,
            } => cmd_tournament_create(orch, &name, rounds, description, format)
                .await
                .map(|_| ()),
            TournamentAction::List { active } => cmd_tournament_list(orch, active, format).await,
        },
        Commands::Schedule {
            tournament_id,
            strategy,
        } => cmd_schedule(orch, &tournament_id, &strategy, format).await,
        Commands::Run {
            tournament_id,
            concurrency,
        } => cmd_run(orch, &tournament_id, concurrency, format).await,
        Commands::RunMatch { match_id } => cmd_run_match(orch, &match_id, format).await,
        Commands::Status { tournament_id } => cmd_status(orch, &tournament_id, format).await,
        Commands::Leaderboard {
            tournament,
            timeframe,
        } => cmd_leaderboard(orch, tournament.as_deref(), &timeframe, format).await,
        Commands::Match { action } => match action {
            MatchAction::Show { match_id, rounds } => {
                cmd_match_show(orch, &match_id, rounds, format).await
            }
        },
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn store(orch: &Orchestrator) -> &dyn ArenaStore {
    orch.store().as_ref()
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

fn print_agent(agent: &AgentRecord) {
    let state = match (agent.is_active, agent.is_quarantined) {
        (false, _) => "inactive",
        (true, true) => "quarantined",
        (true, false) => "eligible",
    };
    println!(
        "{}  {:<20} {:<11} matches={:<5} avg={:.2}  {}",
        agent.agent_id,
        agent.name,
        state,
        agent.total_matches,
        agent.average_score,
        agent.callback_url
    );
}

async fn cmd_agent_register(
    orch: &Orchestrator,
    name: &str,
    url: &str,
    token: &str,
    description: Option<String>,
    release: bool,
    format: Format,
) -> Result<AgentRecord> {
    let mut request = NewAgent::new(name, url, token).with_quarantine(!release);
    if let Some(description) = description {
        request = request.with_description(description);
    }
    let agent = store(orch)
        .register_agent(request)
        .await
        .with_context(|| format!("Failed to register agent '{}'", name))?;

    info!(agent_id = %agent.agent_id, "agent registered");
    match format {
        Format::Json => print_json(&agent)?,
        Format::Text => {
            println!("Registered agent '{}'", agent.name);
            println!("ID: {}", agent.agent_id);
            if agent.is_quarantined {
                println!(
                    "Quarantined: release with 'arena agent quarantine {} --release'",
                    agent.agent_id
                );
            }
        }
    }
    Ok(agent)
}

async fn cmd_agent_list(
    orch: &Orchestrator,
    all: bool,
    eligible: bool,
    format: Format,
) -> Result<()> {
    let filter = if eligible {
        AgentFilter::eligible()
    } else if all {
        AgentFilter::all()
    } else {
        AgentFilter::active()
    };
    let agents = store(orch).list_agents(&filter).await?;

    match format {
        Format::Json => print_json(&agents)?,
        Format::Text if agents.is_empty() => println!("No agents found."),
        Format::Text => agents.iter().for_each(print_agent),
    }
    Ok(())
}

async fn cmd_agent_quarantine(
    orch: &Orchestrator,
    agent_id: &str,
    quarantined: bool,
    format: Format,
) -> Result<()> {
    let agent = store(orch)
        .set_agent_quarantined(&AgentId::from(agent_id), quarantined)
        .await
        .with_context(|| format!("Failed to update agent {}", agent_id))?;
    match format {
        Format::Json => print_json(&agent)?,
        Format::Text => print_agent(&agent),
    }
    Ok(())
}

async fn cmd_agent_active(
    orch: &Orchestrator,
    agent_id: &str,
    active: bool,
    format: Format,
) -> Result<()> {
    let agent = store(orch)
        .set_agent_active(&AgentId::from(agent_id), active)
        .await
        .with_context(|| format!("Failed to update agent {}", agent_id))?;
    match format {
        Format::Json => print_json(&agent)?,
        Format::Text => print_agent(&agent),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tournaments
// ---------------------------------------------------------------------------

fn print_tournament(t: &TournamentRecord) {
    let state = if t.has_ended() {
        "ended"
    } else if t.start_time.is_some() {
        "started"
    } else {
        "new"
    };
    println!(
        "{}  {:<24} {:<8} rounds={}",
        t.tournament_id, t.name, state, t.round_count
    );
}

async fn cmd_tournament_create(
    orch: &Orchestrator,
    name: &str,
    rounds: Option<u32>,
    description: Option<String>,
    format: Format,
) -> Result<TournamentRecord> {
    let rounds = rounds.unwrap_or(orch.config().default_round_count);
    let mut request = NewTournament::new(name).with_round_count(rounds);
    if let Some(description) = description {
        request = request.with_description(description);
    }
    let tournament = store(orch)
        .create_tournament(request)
        .await
        .with_context(|| format!("Failed to create tournament '{}'", name))?;

    match format {
        Format::Json => print_json(&tournament)?,
        Format::Text => {
            println!("Created tournament '{}'", tournament.name);
            println!("ID: {}", tournament.tournament_id);
            println!("Rounds per match: {}", tournament.round_count);
        }
    }
    Ok(tournament)
}

async fn cmd_tournament_list(orch: &Orchestrator, active: bool, format: Format) -> Result<()> {
    let tournaments = store(orch).list_tournaments(active).await?;
    match format {
        Format::Json => print_json(&tournaments)?,
        Format::Text if tournaments.is_empty() => println!("No tournaments found."),
        Format::Text => tournaments.iter().for_each(print_tournament),
    }
    Ok(())
}

async fn cmd_schedule(
    orch: &Orchestrator,
    tournament_id: &str,
    strategy: &str,
    format: Format,
) -> Result<()> {
    let strategy: PairingStrategy = strategy.parse()?;
    let report = orch
        .schedule(&TournamentId::from(tournament_id), strategy)
        .await
        .with_context(|| format!("Failed to schedule tournament {}", tournament_id))?;

    match format {
        Format::Json => print_json(&report)?,
        Format::Text => {
            println!(
                "Scheduled {} matches for '{}' ({})",
                report.matches.len(),
                report.tournament.name,
                report.strategy
            );
            for m in &report.matches {
                println!("  {}  {} vs {}", m.match_id, m.agent_a_id, m.agent_b_id);
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Running
// ---------------------------------------------------------------------------

async fn cmd_run(
    orch: &Orchestrator,
    tournament_id: &str,
    concurrency: Option<usize>,
    format: Format,
) -> Result<()> {
    let concurrency = concurrency.unwrap_or(orch.config().default_concurrency);
    let report = orch
        .run(&TournamentId::from(tournament_id), concurrency)
        .await
        .with_context(|| format!("Failed to run tournament {}", tournament_id))?;

    match format {
        Format::Json => print_json(&report)?,
        Format::Text => {
            println!(
                "Played {} matches in {} ms ({} failed)",
                report.attempted, report.duration_ms, report.failed
            );
            match report.outcome {
                RunOutcome::Completed => println!("Tournament complete."),
                RunOutcome::PartiallyComplete { stragglers } => println!(
                    "{} matches still incomplete; run again to resume them.",
                    stragglers
                ),
            }
        }
    }
    Ok(())
}

async fn cmd_run_match(orch: &Orchestrator, match_id: &str, format: Format) -> Result<()> {
    let summary = orch
        .run_match(&MatchId::from(match_id))
        .await
        .with_context(|| format!("Failed to run match {}", match_id))?;

    match format {
        Format::Json => print_json(&summary)?,
        Format::Text => {
            println!(
                "{} {} - {} {}",
                summary.agent_a.name,
                summary.agent_a_score,
                summary.agent_b_score,
                summary.agent_b.name
            );
            if summary.resumed_from > 0 {
                println!("Resumed from round {}", summary.resumed_from);
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn print_status(status: &TournamentStatus) {
    println!("Tournament: {} ({})", status.name, status.tournament_id);
    println!("Active:     {}", status.is_active);
    if let Some(start) = status.start_time {
        println!("Started:    {}", start.to_rfc3339());
    }
    if let Some(end) = status.end_time {
        println!("Ended:      {}", end.to_rfc3339());
    }
    println!(
        "Progress:   {} ({:.1}%)",
        status.progress, status.percent_complete
    );
}

async fn cmd_status(orch: &Orchestrator, tournament_id: &str, format: Format) -> Result<()> {
    let status = orch
        .status(&TournamentId::from(tournament_id))
        .await
        .with_context(|| format!("Failed to load tournament {}", tournament_id))?;
    match format {
        Format::Json => print_json(&status)?,
        Format::Text => print_status(&status),
    }
    Ok(())
}

fn print_leaderboard(entries: &[LeaderboardEntry]) {
    if entries.is_empty() {
        println!("No agents ranked.");
        return;
    }
    println!("{:>4}  {:<20} {:>8} {:>10} {:>8}", "#", "agent", "matches", "score", "avg");
    for e in entries {
        println!(
            "{:>4}  {:<20} {:>8} {:>10} {:>8.2}",
            e.rank, e.name, e.total_matches, e.total_score, e.average_score
        );
    }
}

async fn cmd_leaderboard(
    orch: &Orchestrator,
    tournament: Option<&str>,
    timeframe: &str,
    format: Format,
) -> Result<()> {
    let timeframe: Timeframe = timeframe.parse()?;
    let tournament = tournament.map(TournamentId::from);
    let entries = orch.leaderboard(tournament.as_ref(), timeframe).await?;
    match format {
        Format::Json => print_json(&entries)?,
        Format::Text => print_leaderboard(&entries),
    }
    Ok(())
}

#[derive(Serialize)]
struct MatchView {
    #[serde(flatten)]
    record: MatchRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    rounds: Option<Vec<RoundRecord>>,
}

async fn cmd_match_show(
    orch: &Orchestrator,
    match_id: &str,
    with_rounds: bool,
    format: Format,
) -> Result<()> {
    let id = MatchId::from(match_id);
    let record = store(orch)
        .get_match(&id)
        .await
        .with_context(|| format!("Failed to load match {}", match_id))?;
    let rounds = if with_rounds {
        Some(store(orch).list_rounds(&id).await?)
    } else {
        None
    };

    match format {
        Format::Json => print_json(&MatchView { record, rounds })?,
        Format::Text => {
            println!("Match:      {}", record.match_id);
            println!("Tournament: {}", record.tournament_id);
            println!("A:          {} ({} pts)", record.agent_a_id, record.agent_a_score);
            println!("B:          {} ({} pts)", record.agent_b_id, record.agent_b_score);
            println!(
                "Rounds:     {}{}",
                record.rounds_completed,
                if record.is_complete { " (complete)" } else { "" }
            );
            for r in rounds.iter().flatten() {
                println!(
                    "  {:>4}  {} {}  {}-{}  {:>7.1}ms {:>7.1}ms",
                    r.round_number,
                    r.agent_a_move,
                    r.agent_b_move,
                    r.agent_a_score,
                    r.agent_b_score,
                    r.agent_a_latency_ms,
                    r.agent_b_latency_ms
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_state::fakes::MemoryArenaStore;
    use arena_state::MatchFilter;

    fn orchestrator() -> Orchestrator {
        Orchestrator::with_http_client(Arc::new(MemoryArenaStore::new()), EngineConfig::default())
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "arena", "run", "t-1", "--concurrency", "3", "--format", "json", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, Format::Json);
        assert!(matches!(
            cli.command,
            Commands::Run {
                concurrency: Some(3),
                ..
            }
        ));
    }

    #[test]
    fn list_flags_conflict() {
        assert!(Cli::try_parse_from(["arena", "agent", "list", "--all", "--eligible"]).is_err());
    }

    #[tokio::test]
    async fn register_then_release_agent() {
        let orch = orchestrator();
        let agent = cmd_agent_register(
            &orch,
            "tit-for-tat",
            "http://127.0.0.1:9/move",
            "secret",
            Some("copies the opponent".to_string()),
            false,
            Format::Text,
        )
        .await
        .unwrap();
        assert!(agent.is_quarantined);

        cmd_agent_quarantine(&orch, agent.agent_id.as_str(), false, Format::Json)
            .await
            .unwrap();
        let eligible = store(&orch)
            .list_agents(&AgentFilter::eligible())
            .await
            .unwrap();
        assert_eq!(eligible.len(), 1);
    }

    #[tokio::test]
    async fn tournament_defaults_to_configured_round_count() {
        let orch = orchestrator();
        let t = cmd_tournament_create(&orch, "weekly", None, None, Format::Text)
            .await
            .unwrap();
        assert_eq!(t.round_count, orch.config().default_round_count);
    }

    #[tokio::test]
    async fn schedule_rejects_unknown_strategy() {
        let orch = orchestrator();
        let t = cmd_tournament_create(&orch, "cup", Some(3), None, Format::Text)
            .await
            .unwrap();
        let err = cmd_schedule(&orch, t.tournament_id.as_str(), "swiss", Format::Text)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("swiss"));
    }

    #[tokio::test]
    async fn status_and_match_show_for_scheduled_tournament() {
        let orch = orchestrator();
        for name in ["a", "b", "c"] {
            let url = "http://127.0.0.1:9/move";
            cmd_agent_register(&orch, name, url, "t", None, true, Format::Text)
                .await
                .unwrap();
        }
        let t = cmd_tournament_create(&orch, "cup", Some(1), None, Format::Text)
            .await
            .unwrap();
        let id = t.tournament_id.as_str();
        cmd_schedule(&orch, id, "round-robin", Format::Json)
            .await
            .unwrap();
        cmd_status(&orch, id, Format::Text).await.unwrap();

        let matches = store(&orch)
            .list_matches(&t.tournament_id, MatchFilter::All)
            .await
            .unwrap();
        assert_eq!(matches.len(), 3);
        cmd_match_show(&orch, matches[0].match_id.as_str(), true, Format::Json)
            .await
            .unwrap();
        cmd_leaderboard(&orch, Some(id), "weekly", Format::Text)
            .await
            .unwrap();
    }
}
