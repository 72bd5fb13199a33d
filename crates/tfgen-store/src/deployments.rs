//! Deployment record persistence.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use tfgen_core::StoreError;
use tfgen_deploy::{Deployment, DeploymentStore};

use crate::store_err;

/// The whole record is a JSON column; session id and status are split out
/// for the listing queries.
#[derive(Clone)]
pub struct SqliteDeploymentStore {
    pool: SqlitePool,
}

impl SqliteDeploymentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_for_session(
        &self,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<Deployment>, StoreError> {
        let rows = sqlx::query(
            "SELECT record FROM deployments WHERE session_id = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| {
                let raw: String = row.get("record");
                serde_json::from_str(&raw).map_err(store_err)
            })
            .collect()
    }

    async fn write(&self, deployment: &Deployment) -> Result<(), StoreError> {
        let record = serde_json::to_string(deployment).map_err(store_err)?;
        sqlx::query(
            "INSERT INTO deployments (deployment_id, session_id, status, record, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(deployment_id) DO UPDATE SET status = ?3, record = ?4",
        )
        .bind(&deployment.deployment_id)
        .bind(&deployment.session_id)
        .bind(deployment.status.as_str())
        .bind(record)
        .bind(deployment.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl DeploymentStore for SqliteDeploymentStore {
    async fn insert(&self, deployment: &Deployment) -> Result<(), StoreError> {
        self.write(deployment).await
    }

    async fn update(&self, deployment: &Deployment) -> Result<(), StoreError> {
        self.write(deployment).await
    }

    async fn get(&self, deployment_id: &str) -> Result<Option<Deployment>, StoreError> {
        let row = sqlx::query("SELECT record FROM deployments WHERE deployment_id = ?1")
            .bind(deployment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        match row {
            Some(row) => {
                let raw: String = row.get("record");
                Ok(Some(serde_json::from_str(&raw).map_err(store_err)?))
            }
            None => Ok(None),
        }
    }
}
