//! The durable report log (ingestion queue).
//!
//! Reports are append-only; the only mutation after insert is the
//! `processed_at` / `processing_error` transition performed by the
//! aggregation worker. Rows with `processed_at IS NULL` are the work
//! queue; `reserve` hands out batches under `FOR UPDATE SKIP LOCKED`
//! so concurrent workers never collide, and a reservation lives
//! exactly as long as the caller's transaction.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::Row;

use crate::error::Result;
use crate::LocusDb;

/// A reserved, not-yet-processed report.
#[derive(Debug, Clone)]
pub struct QueuedReport {
    pub id: i64,
    pub submitted_at: DateTime<Utc>,
    pub raw: Vec<u8>,
}

impl LocusDb {
    /// Append one raw report. Durable (committed) before return;
    /// `submitted_at` is assigned by the database clock so the row
    /// lands in the partition covering the receive instant.
    pub async fn append_report(
        &self,
        timestamp: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        user_agent: Option<&str>,
        raw: &[u8],
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"INSERT INTO report ("timestamp", latitude, longitude, user_agent, raw)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id"#,
        )
        .bind(timestamp)
        .bind(latitude)
        .bind(longitude)
        .bind(user_agent)
        .bind(raw)
        .fetch_one(self.pool())
        .await?;

        Ok(row.get::<i64, _>("id"))
    }
}

/// Reserve up to `limit` unprocessed reports, oldest receive time
/// first. Rows already locked by another worker are skipped, not
/// waited on.
pub async fn reserve(conn: &mut PgConnection, limit: i64) -> Result<Vec<QueuedReport>> {
    let rows = sqlx::query(
        r#"SELECT id, submitted_at, raw FROM report
           WHERE processed_at IS NULL
           ORDER BY submitted_at
           LIMIT $1
           FOR UPDATE SKIP LOCKED"#,
    )
    .bind(limit)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| QueuedReport {
            id: row.get("id"),
            submitted_at: row.get("submitted_at"),
            raw: row.get("raw"),
        })
        .collect())
}

/// Mark a report successfully aggregated.
pub async fn mark_done(
    conn: &mut PgConnection,
    id: i64,
    submitted_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE report SET processed_at = now() WHERE id = $1 AND submitted_at = $2")
        .bind(id)
        .bind(submitted_at)
        .execute(conn)
        .await?;

    Ok(())
}

/// Mark a report permanently failed with a short diagnostic. Failed
/// reports are not retried.
pub async fn mark_failed(
    conn: &mut PgConnection,
    id: i64,
    submitted_at: DateTime<Utc>,
    error: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE report SET processed_at = now(), processing_error = $3 \
         WHERE id = $1 AND submitted_at = $2",
    )
    .bind(id)
    .bind(submitted_at)
    .bind(error)
    .execute(conn)
    .await?;

    Ok(())
}
