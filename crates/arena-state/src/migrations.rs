//! SurrealDB schema initialization
//!
//! Sets up the four arena tables with their uniqueness constraints and
//! lookup indexes. Safe to call on every connection.

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all arena tables
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing arena SurrealDB schema");

    init_agents_table(db).await?;
    init_tournaments_table(db).await?;
    init_matches_table(db).await?;
    init_rounds_table(db).await?;

    info!("Arena schema initialization complete");
    Ok(())
}

async fn run_ddl(db: &Surreal<Any>, sql: &str) -> Result<()> {
    db.query(sql)
        .await
        .and_then(|res| res.check())
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    Ok(())
}

/// Initialize `agents` table
///
/// Schema:
/// ```text
/// TABLE agents {
///   agent_id:        STRING (unique)
///   name:            STRING (unique)
///   description:     STRING?
///   callback_url:    STRING
///   auth_token:      STRING
///   is_active:       BOOL
///   is_quarantined:  BOOL
///   total_matches:   INT
///   total_score:     INT
///   average_score:   FLOAT
///   created_at:      DATETIME
///   updated_at:      DATETIME?
/// }
/// ```
async fn init_agents_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing agents table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS agents SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_agent_id ON TABLE agents COLUMNS agent_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_agent_name ON TABLE agents COLUMNS name UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_agent_eligible ON TABLE agents COLUMNS is_active, is_quarantined;
    "#;

    run_ddl(db, sql).await?;
    debug!("agents table initialized");
    Ok(())
}

/// Initialize `tournaments` table
async fn init_tournaments_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing tournaments table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS tournaments SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_tournament_id ON TABLE tournaments COLUMNS tournament_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_tournament_active ON TABLE tournaments COLUMNS is_active;
    "#;

    run_ddl(db, sql).await?;
    debug!("tournaments table initialized");
    Ok(())
}

/// Initialize `matches` table
///
/// Constraints:
/// - `match_id` is unique
/// - `agent_a_id != agent_b_id` (enforced via app logic before insert)
/// - `rounds_completed` only grows, in lockstep with `rounds` rows
async fn init_matches_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing matches table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS matches SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_match_id ON TABLE matches COLUMNS match_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_match_tournament ON TABLE matches COLUMNS tournament_id, is_complete;
    "#;

    run_ddl(db, sql).await?;
    debug!("matches table initialized");
    Ok(())
}

/// Initialize `rounds` table
///
/// Constraints:
/// - `(match_id, round_number)` is unique, so a replayed or concurrent
///   append of an existing round is rejected by the database
/// - rows are never updated or deleted
async fn init_rounds_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing rounds table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS rounds SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_round_match_number ON TABLE rounds COLUMNS match_id, round_number UNIQUE;
    "#;

    run_ddl(db, sql).await?;
    debug!("rounds table initialized");
    Ok(())
}
