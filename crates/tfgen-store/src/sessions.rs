//! Session state persistence.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use tfgen_core::{SessionStore, StoreError, WorkflowState};

use crate::store_err;

/// Stores the full [`WorkflowState`] as a JSON column keyed by session id.
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<WorkflowState>, StoreError> {
        let row = sqlx::query("SELECT state FROM sessions WHERE session_id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        match row {
            Some(row) => {
                let raw: String = row.get("state");
                let state = serde_json::from_str(&raw).map_err(store_err)?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, state: &WorkflowState) -> Result<(), StoreError> {
        let raw = serde_json::to_string(state).map_err(store_err)?;
        sqlx::query(
            "INSERT INTO sessions (session_id, state, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET state = ?2, updated_at = ?3",
        )
        .bind(&state.session_id)
        .bind(&raw)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect;

    #[tokio::test]
    async fn test_roundtrip_and_overwrite() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let store = SqliteSessionStore::new(pool);

        assert!(store.load("s1").await.unwrap().is_none());

        let mut state = WorkflowState::new("s1");
        state.push_user("hello");
        store.save(&state).await.unwrap();

        state.push_assistant("hi");
        store.save(&state).await.unwrap();

        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.session_id, "s1");
    }
}
