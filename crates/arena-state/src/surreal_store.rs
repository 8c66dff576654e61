//! SurrealDB-backed arena store
//!
//! Uses the rows in `schema` for persistence, converting to/from the
//! `storage_traits` records at the boundary. Multi-record writes
//! (`append_round`, `finalize_match`) run inside a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::StorageError;
use crate::handle;
use crate::schema::{AgentRow, MatchRow, RoundRow, TournamentRow};
use crate::storage_traits::*;

/// SurrealDB-backed implementation of [`AgentDirectory`] and [`MatchLedger`].
pub struct SurrealArenaStore {
    db: Surreal<Any>,
    /// Serializes match finalization so concurrent completions touching the
    /// same agent never race on its statistics.
    finalize_lock: Mutex<()>,
}

impl SurrealArenaStore {
    /// Wrap an already connected database.
    pub fn new(db: Surreal<Any>) -> Self {
        Self {
            db,
            finalize_lock: Mutex::new(()),
        }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(Self::new(handle::connect_in_memory().await?))
    }

    /// Connect using the `SURREALDB_*` environment chain.
    pub async fn from_env() -> crate::Result<Self> {
        Ok(Self::new(handle::connect_from_env().await?))
    }

    // -- private helpers -----------------------------------------------------

    async fn select_where<T: DeserializeOwned>(
        &self,
        sql: &'static str,
        key: &'static str,
        value: String,
    ) -> StorageResult<Vec<T>> {
        let mut res = self.db.query(sql).bind((key, value)).await?;
        Ok(res.take(0)?)
    }

    async fn fetch_agent(&self, agent_id: &AgentId) -> StorageResult<AgentRow> {
        let rows: Vec<AgentRow> = self
            .select_where(
                "SELECT * FROM agents WHERE agent_id = $id",
                "id",
                agent_id.0.clone(),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::AgentNotFound {
                agent_id: agent_id.0.clone(),
            })
    }

    async fn fetch_tournament(&self, tournament_id: &TournamentId) -> StorageResult<TournamentRow> {
        let rows: Vec<TournamentRow> = self
            .select_where(
                "SELECT * FROM tournaments WHERE tournament_id = $id",
                "id",
                tournament_id.0.clone(),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::TournamentNotFound {
                tournament_id: tournament_id.0.clone(),
            })
    }

    async fn fetch_match(&self, match_id: &MatchId) -> StorageResult<MatchRow> {
        let rows: Vec<MatchRow> = self
            .select_where(
                "SELECT * FROM matches WHERE match_id = $id",
                "id",
                match_id.0.clone(),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::MatchNotFound {
                match_id: match_id.0.clone(),
            })
    }

    async fn update_agent_flag(
        &self,
        agent_id: &AgentId,
        sql: &'static str,
        value: bool,
    ) -> StorageResult<AgentRecord> {
        let mut res = self
            .db
            .query(sql)
            .bind(("id", agent_id.0.clone()))
            .bind(("value", value))
            .bind(("at", SurrealDatetime::from(Utc::now())))
            .await?;
        let rows: Vec<AgentRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(AgentRecord::from)
            .ok_or_else(|| StorageError::AgentNotFound {
                agent_id: agent_id.0.clone(),
            })
    }
}

#[async_trait]
impl AgentDirectory for SurrealArenaStore {
    #[instrument(skip(self, agent), fields(name = %agent.name))]
    async fn register_agent(&self, agent: NewAgent) -> StorageResult<AgentRecord> {
        agent.validate()?;

        let existing: Vec<AgentRow> = self
            .select_where(
                "SELECT * FROM agents WHERE name = $name",
                "name",
                agent.name.clone(),
            )
            .await?;
        if !existing.is_empty() {
            return Err(StorageError::DuplicateAgentName { name: agent.name });
        }

        let record = agent.into_record();
        debug!(agent_id = %record.agent_id, "registering agent");

        let _created: Option<AgentRow> = self
            .db
            .create("agents")
            .content(AgentRow::from(record.clone()))
            .await?;

        Ok(record)
    }

    async fn get_agent(&self, agent_id: &AgentId) -> StorageResult<AgentRecord> {
        self.fetch_agent(agent_id).await.map(AgentRecord::from)
    }

    async fn list_agents(&self, filter: &AgentFilter) -> StorageResult<Vec<AgentRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM agents ORDER BY created_at ASC")
            .await?;
        let rows: Vec<AgentRow> = res.take(0)?;
        Ok(rows
            .into_iter()
            .map(AgentRecord::from)
            .filter(|a| filter.matches(a))
            .collect())
    }

    async fn set_agent_active(
        &self,
        agent_id: &AgentId,
        active: bool,
    ) -> StorageResult<AgentRecord> {
        self.update_agent_flag(
            agent_id,
            "UPDATE agents SET is_active = $value, updated_at = $at WHERE agent_id = $id",
            active,
        )
        .await
    }

    async fn set_agent_quarantined(
        &self,
        agent_id: &AgentId,
        quarantined: bool,
    ) -> StorageResult<AgentRecord> {
        self.update_agent_flag(
            agent_id,
            "UPDATE agents SET is_quarantined = $value, updated_at = $at WHERE agent_id = $id",
            quarantined,
        )
        .await
    }
}

#[async_trait]
impl MatchLedger for SurrealArenaStore {
    async fn create_tournament(
        &self,
        tournament: NewTournament,
    ) -> StorageResult<TournamentRecord> {
        let record = tournament.into_record()?;
        let _created: Option<TournamentRow> = self
            .db
            .create("tournaments")
            .content(TournamentRow::from(record.clone()))
            .await?;
        Ok(record)
    }

    async fn get_tournament(
        &self,
        tournament_id: &TournamentId,
    ) -> StorageResult<TournamentRecord> {
        self.fetch_tournament(tournament_id)
            .await
            .map(TournamentRecord::from)
    }

    async fn list_tournaments(&self, active_only: bool) -> StorageResult<Vec<TournamentRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM tournaments ORDER BY created_at ASC")
            .await?;
        let rows: Vec<TournamentRow> = res.take(0)?;
        Ok(rows
            .into_iter()
            .map(TournamentRecord::from)
            .filter(|t| !active_only || t.is_active)
            .collect())
    }

    async fn mark_tournament_started(
        &self,
        tournament_id: &TournamentId,
        at: DateTime<Utc>,
    ) -> StorageResult<TournamentRecord> {
        let row = self.fetch_tournament(tournament_id).await?;
        if row.start_time.is_some() || row.end_time.is_some() {
            return Ok(row.into());
        }

        let mut res = self
            .db
            .query("UPDATE tournaments SET start_time = $at WHERE tournament_id = $id")
            .bind(("id", tournament_id.0.clone()))
            .bind(("at", SurrealDatetime::from(at)))
            .await?;
        let rows: Vec<TournamentRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(TournamentRecord::from)
            .ok_or_else(|| StorageError::TournamentNotFound {
                tournament_id: tournament_id.0.clone(),
            })
    }

    async fn mark_tournament_ended(
        &self,
        tournament_id: &TournamentId,
        at: DateTime<Utc>,
    ) -> StorageResult<TournamentRecord> {
        let row = self.fetch_tournament(tournament_id).await?;
        if row.end_time.is_some() {
            return Ok(row.into());
        }

        let mut res = self
            .db
            .query(
                "UPDATE tournaments SET end_time = $at, is_active = false WHERE tournament_id = $id",
            )
            .bind(("id", tournament_id.0.clone()))
            .bind(("at", SurrealDatetime::from(at)))
            .await?;
        let rows: Vec<TournamentRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(TournamentRecord::from)
            .ok_or_else(|| StorageError::TournamentNotFound {
                tournament_id: tournament_id.0.clone(),
            })
    }

    #[instrument(skip(self, tournament_id, matches), fields(tournament_id = %tournament_id, count = matches.len()))]
    async fn create_matches(
        &self,
        tournament_id: &TournamentId,
        matches: Vec<NewMatch>,
    ) -> StorageResult<Vec<MatchRecord>> {
        self.fetch_tournament(tournament_id).await?;

        let mut known: Vec<AgentId> = Vec::new();
        let mut records = Vec::with_capacity(matches.len());
        for pairing in matches {
            for agent_id in [&pairing.agent_a_id, &pairing.agent_b_id] {
                if !known.contains(agent_id) {
                    self.fetch_agent(agent_id).await?;
                    known.push(agent_id.clone());
                }
            }
            records.push(pairing.into_record(tournament_id)?);
        }
        if records.is_empty() {
            return Ok(records);
        }

        let offset = self
            .list_matches(tournament_id, MatchFilter::All)
            .await?
            .len() as u64;
        let rows: Vec<MatchRow> = records
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, r)| MatchRow::from_record(r, offset + i as u64))
            .collect();

        // A single INSERT of the whole batch is atomic.
        self.db
            .query("INSERT INTO matches $rows")
            .bind(("rows", rows))
            .await
            .and_then(|res| res.check())?;

        debug!("matches created");
        Ok(records)
    }

    async fn get_match(&self, match_id: &MatchId) -> StorageResult<MatchRecord> {
        self.fetch_match(match_id).await.map(MatchRecord::from)
    }

    async fn list_matches(
        &self,
        tournament_id: &TournamentId,
        filter: MatchFilter,
    ) -> StorageResult<Vec<MatchRecord>> {
        self.fetch_tournament(tournament_id).await?;
        let rows: Vec<MatchRow> = self
            .select_where(
                "SELECT * FROM matches WHERE tournament_id = $id ORDER BY seq ASC",
                "id",
                tournament_id.0.clone(),
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(MatchRecord::from)
            .filter(|m| filter.matches(m))
            .collect())
    }

    #[instrument(skip(self, round), fields(match_id = %round.match_id, round = round.round_number))]
    async fn append_round(&self, round: RoundRecord) -> StorageResult<MatchRecord> {
        let row = self.fetch_match(&round.match_id).await?;
        if row.is_complete {
            return Err(StorageError::MatchAlreadyComplete {
                match_id: row.match_id,
            });
        }
        if round.round_number != row.rounds_completed {
            return Err(StorageError::RoundOutOfOrder {
                match_id: row.match_id,
                expected: row.rounds_completed,
                got: round.round_number,
            });
        }

        let match_id = round.match_id.clone();
        let next = round.round_number + 1;
        self.db
            .query(
                r#"
                BEGIN TRANSACTION;
                CREATE rounds CONTENT $round;
                UPDATE matches SET rounds_completed = $next WHERE match_id = $mid;
                COMMIT TRANSACTION;
                "#,
            )
            .bind(("round", RoundRow::from(round)))
            .bind(("next", next))
            .bind(("mid", match_id.0.clone()))
            .await
            .and_then(|res| res.check())?;

        self.get_match(&match_id).await
    }

    async fn list_rounds(&self, match_id: &MatchId) -> StorageResult<Vec<RoundRecord>> {
        self.fetch_match(match_id).await?;
        let rows: Vec<RoundRow> = self
            .select_where(
                "SELECT * FROM rounds WHERE match_id = $id ORDER BY round_number ASC",
                "id",
                match_id.0.clone(),
            )
            .await?;
        rows.into_iter().map(RoundRow::into_record).collect()
    }

    #[instrument(skip(self, result), fields(match_id = %result.match_id))]
    async fn finalize_match(&self, result: MatchResult) -> StorageResult<FinalizedMatch> {
        let _guard = self.finalize_lock.lock().await;

        let row = self.fetch_match(&result.match_id).await?;
        if row.is_complete {
            return Err(StorageError::MatchAlreadyComplete {
                match_id: row.match_id,
            });
        }
        let a_id = AgentId(row.agent_a_id.clone());
        let b_id = AgentId(row.agent_b_id.clone());
        self.fetch_agent(&a_id).await?;
        self.fetch_agent(&b_id).await?;

        self.db
            .query(
                r#"
                BEGIN TRANSACTION;
                UPDATE matches SET is_complete = true, agent_a_score = $a_score,
                    agent_b_score = $b_score, completed_at = $at WHERE match_id = $mid;
                UPDATE agents SET total_matches += 1, total_score += $a_score,
                    updated_at = $at WHERE agent_id = $a_id;
                UPDATE agents SET average_score = <float> total_score / total_matches
                    WHERE agent_id = $a_id;
                UPDATE agents SET total_matches += 1, total_score += $b_score,
                    updated_at = $at WHERE agent_id = $b_id;
                UPDATE agents SET average_score = <float> total_score / total_matches
                    WHERE agent_id = $b_id;
                COMMIT TRANSACTION;
                "#,
            )
            .bind(("mid", result.match_id.0.clone()))
            .bind(("a_id", a_id.0.clone()))
            .bind(("b_id", b_id.0.clone()))
            .bind(("a_score", result.agent_a_score))
            .bind(("b_score", result.agent_b_score))
            .bind(("at", SurrealDatetime::from(result.completed_at)))
            .await
            .and_then(|res| res.check())?;

        Ok(FinalizedMatch {
            record: self.get_match(&result.match_id).await?,
            agent_a: self.get_agent(&a_id).await?,
            agent_b: self.get_agent(&b_id).await?,
        })
    }
}
