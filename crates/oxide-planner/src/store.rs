//! Persisted migration state.
//!
//! The last recorded [`MigrationState`] lives in the `oxide_migrations_meta`
//! table, one row per revision. The row with the highest revision is the
//! current state.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use crate::error::{PlanError, Result};
use crate::state::MigrationState;

/// SQL to create the migration state table (SQLite).
pub const CREATE_STATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS oxide_migrations_meta (
    revision INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    state TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
"#;

/// Storage for recorded migration states.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns the state with the highest revision, if any.
    async fn last_state(&self) -> Result<Option<MigrationState>>;

    /// Records `state` under `revision`, replacing any existing record.
    async fn upsert(&self, revision: i64, name: &str, state: &MigrationState) -> Result<()>;
}

/// Metadata of a recorded state.
#[derive(Debug, Clone)]
pub struct StateRecord {
    /// Revision number.
    pub revision: i64,
    /// Migration file name.
    pub name: String,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed state store.
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Creates a store on `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ensures the state table exists.
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(CREATE_STATE_TABLE_SQL)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Lists recorded states, oldest first.
    pub async fn records(&self) -> Result<Vec<StateRecord>> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT revision, name, created_at FROM oxide_migrations_meta ORDER BY revision",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(revision, name, created_at)| StateRecord {
                revision,
                name,
                created_at: parse_timestamp(&created_at),
            })
            .collect())
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime format fallback
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|dt| dt.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn last_state(&self) -> Result<Option<MigrationState>> {
        self.ensure_table().await?;

        let row: Option<(i64, String)> = sqlx::query_as(
            "SELECT revision, state FROM oxide_migrations_meta ORDER BY revision DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((revision, state)) => {
                debug!(revision, "Loaded migration state");
                let parsed = MigrationState::from_json(&state).map_err(|e| {
                    PlanError::InvalidState(format!("revision {}: {}", revision, e))
                })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, revision: i64, name: &str, state: &MigrationState) -> Result<()> {
        self.ensure_table().await?;
        let json = state.to_json()?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM oxide_migrations_meta WHERE revision = ?")
            .bind(revision)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO oxide_migrations_meta (revision, name, state) VALUES (?, ?, ?)")
            .bind(revision)
            .bind(name)
            .bind(json)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(revision, name, "Recorded migration state");
        Ok(())
    }
}

/// In-memory state store, for previews and tests.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    rows: Mutex<BTreeMap<i64, (String, MigrationState)>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded revisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name recorded for `revision`.
    #[must_use]
    pub fn name_of(&self, revision: i64) -> Option<String> {
        self.rows
            .lock()
            .ok()
            .and_then(|rows| rows.get(&revision).map(|(name, _)| name.clone()))
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn last_state(&self) -> Result<Option<MigrationState>> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| PlanError::InvalidState("state store lock poisoned".to_string()))?;
        Ok(rows.values().next_back().map(|(_, state)| state.clone()))
    }

    async fn upsert(&self, revision: i64, name: &str, state: &MigrationState) -> Result<()> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| PlanError::InvalidState("state store lock poisoned".to_string()))?;
        rows.insert(revision, (name.to_string(), state.clone()));
        Ok(())
    }
}
