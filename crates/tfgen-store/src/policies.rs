//! Policy CRUD and the provider feeding the compliance stage.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use tfgen_core::StoreError;
use tfgen_policy::{Policy, PolicyProvider};

use crate::store_err;

#[derive(Clone)]
pub struct SqlitePolicyStore {
    pool: SqlitePool,
}

impl SqlitePolicyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Policy>, StoreError> {
        let rows = sqlx::query("SELECT * FROM policies ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.iter().map(policy_from_row).collect()
    }

    pub async fn get(&self, id: &str) -> Result<Option<Policy>, StoreError> {
        let row = sqlx::query("SELECT * FROM policies WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.as_ref().map(policy_from_row).transpose()
    }

    pub async fn upsert(&self, policy: &Policy) -> Result<(), StoreError> {
        let platform = serde_json::to_string(&policy.cloud_platform)
            .map_err(store_err)?
            .trim_matches('"')
            .to_string();
        let severity = serde_json::to_string(&policy.severity)
            .map_err(store_err)?
            .trim_matches('"')
            .to_string();
        let compiled = policy
            .compiled
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(store_err)?;

        sqlx::query(
            "INSERT INTO policies
                 (id, name, description, natural_language_rule, cloud_platform,
                  severity, enabled, compiled, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                 name = ?2, description = ?3, natural_language_rule = ?4,
                 cloud_platform = ?5, severity = ?6, enabled = ?7,
                 compiled = ?8, updated_at = ?9",
        )
        .bind(&policy.id)
        .bind(&policy.name)
        .bind(&policy.description)
        .bind(&policy.natural_language_rule)
        .bind(platform)
        .bind(severity)
        .bind(policy.enabled as i64)
        .bind(compiled)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM policies WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected() > 0)
    }

    /// Flip `enabled` and return the new record.
    pub async fn toggle(&self, id: &str) -> Result<Option<Policy>, StoreError> {
        sqlx::query("UPDATE policies SET enabled = NOT enabled WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        self.get(id).await
    }
}

fn policy_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Policy, StoreError> {
    let compiled: Option<String> = row.get("compiled");
    let compiled = compiled
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(store_err)?;

    let platform: String = row.get("cloud_platform");
    let severity: String = row.get("severity");

    Ok(Policy {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        natural_language_rule: row.get("natural_language_rule"),
        cloud_platform: serde_json::from_value(serde_json::Value::String(platform))
            .map_err(store_err)?,
        severity: serde_json::from_value(serde_json::Value::String(severity))
            .map_err(store_err)?,
        enabled: row.get::<i64, _>("enabled") != 0,
        compiled,
    })
}

#[async_trait]
impl PolicyProvider for SqlitePolicyStore {
    async fn enabled_policies(&self) -> Result<Vec<Policy>, StoreError> {
        let rows = sqlx::query("SELECT * FROM policies WHERE enabled = 1 ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.iter().map(policy_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect;
    use tfgen_policy::{CompiledRule, PlatformScope, Severity};

    fn sample_policy() -> Policy {
        Policy::new("pol-1", "No open SSH", "Block port 22 from the internet")
            .with_scope(PlatformScope::Aws)
            .with_severity(Severity::Error)
            .with_compiled(CompiledRule::RequiredTags {
                tags: vec!["Project".to_string()],
            })
    }

    #[tokio::test]
    async fn test_crud_roundtrip() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let store = SqlitePolicyStore::new(pool);

        store.upsert(&sample_policy()).await.unwrap();
        let loaded = store.get("pol-1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "No open SSH");
        assert_eq!(loaded.cloud_platform, PlatformScope::Aws);
        assert!(loaded.compiled.is_some());

        // Idempotent update.
        let mut updated = loaded.clone();
        updated.description = "tightened".to_string();
        store.upsert(&updated).await.unwrap();
        store.upsert(&updated).await.unwrap();
        assert_eq!(
            store.get("pol-1").await.unwrap().unwrap().description,
            "tightened"
        );

        assert!(store.delete("pol-1").await.unwrap());
        assert!(store.get("pol-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_toggle_and_enabled_filter() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let store = SqlitePolicyStore::new(pool);
        store.upsert(&sample_policy()).await.unwrap();

        assert_eq!(store.enabled_policies().await.unwrap().len(), 1);

        let toggled = store.toggle("pol-1").await.unwrap().unwrap();
        assert!(!toggled.enabled);
        assert!(store.enabled_policies().await.unwrap().is_empty());

        let toggled = store.toggle("pol-1").await.unwrap().unwrap();
        assert!(toggled.enabled);
    }
}
