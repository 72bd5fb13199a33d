//! Deployment environment persistence with sealed credentials.

use sqlx::{Row, SqlitePool};

use tfgen_core::StoreError;
use tfgen_deploy::{Environment, SecretBox};

use crate::store_err;

/// Credentials are sealed with the process-wide key before they reach the
/// database and opened only on read.
#[derive(Clone)]
pub struct SqliteEnvironmentStore {
    pool: SqlitePool,
    secret_box: SecretBox,
}

impl SqliteEnvironmentStore {
    pub fn new(pool: SqlitePool, secret_box: SecretBox) -> Self {
        Self { pool, secret_box }
    }

    pub async fn upsert(&self, environment: &Environment) -> Result<(), StoreError> {
        let sealed = self.secret_box.seal_credentials(&environment.credentials);
        sqlx::query(
            "INSERT INTO environments (id, name, description, platform, credentials_sealed)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 name = ?2, description = ?3, platform = ?4, credentials_sealed = ?5",
        )
        .bind(&environment.id)
        .bind(&environment.name)
        .bind(&environment.description)
        .bind(environment.platform().as_str())
        .bind(sealed)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Environment>, StoreError> {
        let row = sqlx::query("SELECT * FROM environments WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let sealed: String = row.get("credentials_sealed");
        let credentials = self
            .secret_box
            .open_credentials(&sealed)
            .map_err(store_err)?;

        Ok(Some(Environment {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            credentials,
        }))
    }

    /// Names and ids only; no credential material.
    pub async fn list_summaries(&self) -> Result<Vec<(String, String, String)>, StoreError> {
        let rows = sqlx::query("SELECT id, name, platform FROM environments ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(rows
            .iter()
            .map(|row| (row.get("id"), row.get("name"), row.get("platform")))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect;
    use tfgen_deploy::CloudCredentials;

    #[tokio::test]
    async fn test_credentials_sealed_at_rest() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let store = SqliteEnvironmentStore::new(pool.clone(), SecretBox::from_passphrase("k"));

        let environment = Environment::new(
            "prod",
            CloudCredentials::Aws {
                access_key_id: "AKIASECRETID".to_string(),
                secret_access_key: "supersecret".to_string(),
                region: Some("us-east-1".to_string()),
            },
        );
        store.upsert(&environment).await.unwrap();

        // The raw row never contains plaintext credential material.
        let raw: String = sqlx::query("SELECT credentials_sealed FROM environments")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get("credentials_sealed");
        assert!(!raw.contains("AKIASECRETID"));
        assert!(!raw.contains("supersecret"));

        let loaded = store.get(&environment.id).await.unwrap().unwrap();
        assert_eq!(loaded.credentials, environment.credentials);
    }
}
