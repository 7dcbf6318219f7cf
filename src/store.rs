use crate::forecast::types::TemperatureUnit;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// The blobs a user may keep. Each is read and written whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey {
    Profile,
    Routine,
    Preferences,
}

impl FromStr for StoreKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "profile" => Ok(StoreKey::Profile),
            "routine" => Ok(StoreKey::Routine),
            "preferences" => Ok(StoreKey::Preferences),
            other => Err(StoreError::InvalidData(format!("unknown store key: {}", other))),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreKey::Profile => "profile",
            StoreKey::Routine => "routine",
            StoreKey::Preferences => "preferences",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredBlob {
    pub user_id: Uuid,
    pub key: String,
    pub value: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl StoredBlob {
    pub fn json(&self) -> Result<serde_json::Value, StoreError> {
        serde_json::from_str(&self.value).map_err(|e| StoreError::InvalidData(e.to_string()))
    }
}

/// The fields of the `preferences` blob the server acts on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub unit: Option<TemperatureUnit>,
    pub city: Option<String>,
}

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool; in-memory databases are pinned to one connection so every
    /// query sees the same data.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn init_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_store (
                user_id BLOB NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn put(
        &self,
        user_id: Uuid,
        key: StoreKey,
        value: &serde_json::Value,
    ) -> Result<StoredBlob, StoreError> {
        let now = chrono::Utc::now();
        let encoded = serde_json::to_string(value).map_err(|e| StoreError::InvalidData(e.to_string()))?;

        let result = sqlx::query_as::<_, StoredBlob>(
            r#"
            INSERT INTO user_store (user_id, key, value, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(key.to_string())
        .bind(encoded)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Stored {} for user {}", key, user_id);
        Ok(result)
    }

    pub async fn get(&self, user_id: Uuid, key: StoreKey) -> Result<StoredBlob, StoreError> {
        let result = sqlx::query_as::<_, StoredBlob>(
            "SELECT * FROM user_store WHERE user_id = $1 AND key = $2",
        )
        .bind(user_id)
        .bind(key.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("{} for user {}", key, user_id)))?;

        Ok(result)
    }

    /// Parsed preferences; a missing or malformed blob yields defaults.
    pub async fn preferences(&self, user_id: Uuid) -> Result<Preferences, StoreError> {
        match self.get(user_id, StoreKey::Preferences).await {
            Ok(blob) => Ok(serde_json::from_str(&blob.value).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed preferences for {}: {}", user_id, e);
                Preferences::default()
            })),
            Err(StoreError::NotFound(_)) => Ok(Preferences::default()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> Store {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store.init_tables().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_put_then_get_replaces_whole_blob() {
        let store = store().await;
        let user = Uuid::new_v4();

        store
            .put(user, StoreKey::Profile, &json!({ "name": "Ana", "city": "Lisbon, PT" }))
            .await
            .unwrap();
        store
            .put(user, StoreKey::Profile, &json!({ "name": "Ana" }))
            .await
            .unwrap();

        let blob = store.get(user, StoreKey::Profile).await.unwrap();
        assert_eq!(blob.json().unwrap(), json!({ "name": "Ana" }));
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let store = store().await;

        let result = store.get(Uuid::new_v4(), StoreKey::Routine).await;

        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_preferences_parse_and_default() {
        let store = store().await;
        let user = Uuid::new_v4();
        assert_eq!(store.preferences(user).await.unwrap(), Preferences::default());

        store
            .put(user, StoreKey::Preferences, &json!({ "unit": "fahrenheit", "city": "Tokyo, JP", "theme": "dark" }))
            .await
            .unwrap();

        let prefs = store.preferences(user).await.unwrap();
        assert_eq!(prefs.unit, Some(TemperatureUnit::Fahrenheit));
        assert_eq!(prefs.city.as_deref(), Some("Tokyo, JP"));
    }

    #[test]
    fn test_store_key_parsing() {
        assert_eq!("routine".parse::<StoreKey>().unwrap(), StoreKey::Routine);
        assert!("secrets".parse::<StoreKey>().is_err());
    }
}
