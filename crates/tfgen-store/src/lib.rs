//! tfgen-store: relational persistence.
//!
//! SQLite via sqlx. Rich structures (workflow state, deployment records,
//! compiled rules) are stored as JSON columns next to the keys the API
//! queries by; sealed credentials never touch the database in plaintext.

pub mod deployments;
pub mod environments;
pub mod memory;
pub mod policies;
pub mod sessions;

pub use deployments::SqliteDeploymentStore;
pub use environments::SqliteEnvironmentStore;
pub use memory::{MemoryDeploymentStore, MemoryPolicyStore, MemorySessionStore};
pub use policies::SqlitePolicyStore;
pub use sessions::SqliteSessionStore;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::str::FromStr;

use tfgen_core::StoreError;

pub(crate) fn store_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::new(e.to_string())
}

/// Open (and create if missing) the database and apply the schema.
pub async fn connect(database_url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(store_err)?
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await.map_err(store_err)?;
    apply_schema(&pool).await?;
    Ok(pool)
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            state      TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS policies (
            id                    TEXT PRIMARY KEY,
            name                  TEXT NOT NULL UNIQUE,
            description           TEXT NOT NULL DEFAULT '',
            natural_language_rule TEXT NOT NULL,
            cloud_platform        TEXT NOT NULL DEFAULT 'all',
            severity              TEXT NOT NULL DEFAULT 'error',
            enabled               INTEGER NOT NULL DEFAULT 1,
            compiled              TEXT,
            updated_at            TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS environments (
            id                 TEXT PRIMARY KEY,
            name               TEXT NOT NULL UNIQUE,
            description        TEXT NOT NULL DEFAULT '',
            platform           TEXT NOT NULL,
            credentials_sealed TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS deployments (
            deployment_id TEXT PRIMARY KEY,
            session_id    TEXT NOT NULL,
            status        TEXT NOT NULL,
            record        TEXT NOT NULL,
            created_at    TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_deployments_session
            ON deployments (session_id)",
    ];
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(store_err)?;
    }
    Ok(())
}
