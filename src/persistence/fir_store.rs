// Relational persistence for finalised FIR records and the audit trail.
// MySQL via sqlx, mirroring the teacher's query_as/transaction discipline.

use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

use crate::error::PipelineError;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct FirRecord {
    pub fir_number: String,
    pub session_id: String,
    pub status: String,
    pub fir_content: String,
    pub auth_key_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct FirSummary {
    pub fir_number: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

pub struct FirStore {
    pool: MySqlPool,
}

impl FirStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), String> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    /// Inserts a draft FIR. Retries up to 3 times on a unique-constraint
    /// violation by asking `make_number` for a fresh candidate.
    pub async fn insert_draft(
        &self,
        session_id: &str,
        fir_content: &str,
        make_number: impl Fn() -> String,
    ) -> Result<String, PipelineError> {
        let mut last_err = None;
        for _ in 0..3 {
            let fir_number = make_number();
            let result = sqlx::query(
                "INSERT INTO fir_records (fir_number, session_id, status, fir_content) \
                 VALUES (?, ?, 'draft', ?)",
            )
            .bind(&fir_number)
            .bind(session_id)
            .bind(fir_content)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => return Ok(fir_number),
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    last_err = Some(db_err.to_string());
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(PipelineError::Internal(format!(
            "fir number allocation exhausted retries: {}",
            last_err.unwrap_or_default()
        )))
    }

    pub async fn finalize(&self, fir_number: &str, auth_key_hash: &str) -> Result<u64, PipelineError> {
        let result = sqlx::query(
            "UPDATE fir_records SET status = 'finalized', auth_key_hash = ?, finalized_at = ? \
             WHERE fir_number = ? AND status = 'draft'",
        )
        .bind(auth_key_hash)
        .bind(Utc::now())
        .bind(fir_number)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn get(&self, fir_number: &str) -> Result<Option<FirRecord>, PipelineError> {
        let record = sqlx::query_as::<_, FirRecord>("SELECT * FROM fir_records WHERE fir_number = ?")
            .bind(fir_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<FirSummary>, PipelineError> {
        let records = sqlx::query_as::<_, FirSummary>(
            "SELECT fir_number, status, created_at FROM fir_records \
             ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}

/// Fire-and-forget audit log insert. Errors are logged but never propagated —
/// an audit failure must not break the request that triggered it.
pub async fn log_audit(pool: &MySqlPool, action: &str, details: serde_json::Value, ip: Option<&str>) {
    if let Err(e) = sqlx::query(
        "INSERT INTO audit_log (action, details, ip_address, at) VALUES (?, ?, ?, ?)",
    )
    .bind(action)
    .bind(details)
    .bind(ip)
    .bind(Utc::now())
    .execute(pool)
    .await
    {
        tracing::warn!("audit: failed to log action={}: {}", action, e);
    }
}
