//! SQLite-backed cache store, shared across processes

use crate::cache::{CacheEntry, CacheError, CacheKey, CacheStore};
use crate::persistence::connect_sqlite;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::Backend(e.to_string())
    }
}

/// SQLite cache store
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    /// Open (or create) a cache database
    pub async fn new(db_path: &str) -> Result<Self, CacheError> {
        let pool = connect_sqlite(db_path).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Open the cache under the platform data directory
    pub async fn with_default_path() -> Result<Self, CacheError> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("shipyard");
        std::fs::create_dir_all(&db_dir)?;

        let db_path = db_dir.join("cache.db");
        Self::new(&db_path.to_string_lossy()).await
    }

    async fn init(&self) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                scope TEXT NOT NULL,
                hash TEXT NOT NULL,
                task_name TEXT NOT NULL,
                output TEXT NOT NULL,
                artifact_ref TEXT,
                exports TEXT NOT NULL DEFAULT '{}',
                stored_at TEXT NOT NULL,
                PRIMARY KEY (scope, hash)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn from_row(row: &SqliteRow) -> Result<CacheEntry, CacheError> {
        let exports: HashMap<String, String> =
            serde_json::from_str(&row.get::<String, _>("exports"))?;
        Ok(CacheEntry {
            key: CacheKey {
                scope: row.get("scope"),
                hash: row.get("hash"),
            },
            task_name: row.get("task_name"),
            output: row.get("output"),
            artifact_ref: row.get("artifact_ref"),
            exports,
            stored_at: DateTime::from_naive_utc_and_offset(
                row.get::<NaiveDateTime, _>("stored_at"),
                Utc,
            ),
        })
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let row = sqlx::query(
            r#"
            SELECT scope, hash, task_name, output, artifact_ref, exports, stored_at
            FROM cache_entries
            WHERE scope = ?1 AND hash = ?2
            "#,
        )
        .bind(&key.scope)
        .bind(&key.hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn store(&self, entry: CacheEntry) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO cache_entries
            (scope, hash, task_name, output, artifact_ref, exports, stored_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&entry.key.scope)
        .bind(&entry.key.hash)
        .bind(&entry.task_name)
        .bind(&entry.output)
        .bind(&entry.artifact_ref)
        .bind(serde_json::to_string(&entry.exports)?)
        .bind(entry.stored_at.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let rows = sqlx::query(
            r#"
            SELECT scope, hash, task_name, output, artifact_ref, exports, stored_at
            FROM cache_entries
            ORDER BY stored_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }
}
