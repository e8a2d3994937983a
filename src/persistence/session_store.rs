// Embedded durable KV for session state, backed by SQLite in WAL journaling
// mode with full synchronous commits — the spec's "sessions.db".

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::error::PipelineError;
use crate::session::model::Session;

pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(15)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                state_json TEXT NOT NULL,
                history_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_activity TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), String> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    pub async fn insert(&self, session: &Session) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO sessions (id, status, state_json, history_json, created_at, last_activity) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(session.status.as_str())
        .bind(serde_json::to_string(&session.state).map_err(|e| PipelineError::Internal(e.to_string()))?)
        .bind(serde_json::to_string(&session.validation_history).map_err(|e| PipelineError::Internal(e.to_string()))?)
        .bind(session.created_at)
        .bind(session.last_activity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: &uuid::Uuid) -> Result<Option<Session>, PipelineError> {
        let row: Option<(String, String, String, String, chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> =
            sqlx::query_as(
                "SELECT id, status, state_json, history_json, created_at, last_activity \
                 FROM sessions WHERE id = ?",
            )
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        let Some((id_str, status, state_json, history_json, created_at, last_activity)) = row else {
            return Ok(None);
        };

        Ok(Some(Session {
            id: uuid::Uuid::parse_str(&id_str).map_err(|e| PipelineError::Internal(e.to_string()))?,
            status: status.parse().map_err(PipelineError::Internal)?,
            state: serde_json::from_str(&state_json).map_err(|e| PipelineError::Internal(e.to_string()))?,
            validation_history: serde_json::from_str(&history_json).map_err(|e| PipelineError::Internal(e.to_string()))?,
            created_at,
            last_activity,
        }))
    }

    pub async fn update(&self, session: &Session) -> Result<(), PipelineError> {
        sqlx::query(
            "UPDATE sessions SET status = ?, state_json = ?, history_json = ?, last_activity = ? WHERE id = ?",
        )
        .bind(session.status.as_str())
        .bind(serde_json::to_string(&session.state).map_err(|e| PipelineError::Internal(e.to_string()))?)
        .bind(serde_json::to_string(&session.validation_history).map_err(|e| PipelineError::Internal(e.to_string()))?)
        .bind(session.last_activity)
        .bind(session.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Marks all `active` sessions untouched since `cutoff` as `expired`.
    pub async fn expire_stale(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64, PipelineError> {
        let result = sqlx::query(
            "UPDATE sessions SET status = 'expired' WHERE status = 'active' AND last_activity < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Full WAL checkpoint — used during graceful shutdown to guarantee
    /// durability before process exit.
    pub async fn flush_all(&self) -> Result<(), PipelineError> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
