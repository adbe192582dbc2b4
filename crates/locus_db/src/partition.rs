//! Daily partition lifecycle for the report log.
//!
//! Each partition covers one UTC day and is named `report_YYYY_MM_DD`.
//! A freshly created partition gets two hot indexes: a partial index
//! over the unprocessed tail, which keeps the dequeue scan
//! proportional to the queue instead of the table, and a plain range
//! index on `submitted_at`. Partitions older than today get a BRIN
//! index for cheap cold reads. Maintenance runs under an advisory
//! lock so two service instances never race to create or drop the
//! same partition; losing the race wastes work but is not an error.

use chrono::{Days, NaiveDate, Utc};
use sqlx::postgres::PgConnection;
use sqlx::Row;
use tracing::{info, warn};

use crate::error::Result;
use crate::LocusDb;

/// Advisory lock key for partition maintenance.
const MAINTENANCE_LOCK_KEY: i64 = 0x6c6f_6375_7301;

/// Name of the partition covering `date`.
pub fn partition_name(date: NaiveDate) -> String {
    format!("report_{}", date.format("%Y_%m_%d"))
}

/// Inverse of [`partition_name`]; `None` for tables that are not
/// daily report partitions.
pub fn partition_date(name: &str) -> Option<NaiveDate> {
    let suffix = name.strip_prefix("report_")?;
    NaiveDate::parse_from_str(suffix, "%Y_%m_%d").ok()
}

/// Cutoff below which partitions have aged out.
pub fn expiry_cutoff(today: NaiveDate, retain_days: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(retain_days as u64))
        .unwrap_or(NaiveDate::MIN)
}

impl LocusDb {
    /// Run one maintenance sweep: create the forward horizon, index
    /// cold partitions, drop expired ones. Serialized across
    /// instances by an advisory lock held for the transaction.
    pub async fn maintain_partitions(
        &self,
        horizon_days: u32,
        retain_days: u32,
        cascade: bool,
    ) -> Result<()> {
        let today = Utc::now().date_naive();
        let mut tx = self.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(MAINTENANCE_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        ensure_forward(&mut tx, today, horizon_days).await?;
        install_cold_indexes(&mut tx, today).await?;
        drop_expired(&mut tx, today, retain_days, cascade).await?;

        tx.commit().await?;
        Ok(())
    }
}

/// Create the daily partitions covering `today` through
/// `today + horizon_days` if absent, installing the hot indexes on
/// each.
pub async fn ensure_forward(
    conn: &mut PgConnection,
    today: NaiveDate,
    horizon_days: u32,
) -> Result<()> {
    for offset in 0..=horizon_days as u64 {
        let date = match today.checked_add_days(Days::new(offset)) {
            Some(d) => d,
            None => break,
        };
        let next = match date.checked_add_days(Days::new(1)) {
            Some(d) => d,
            None => break,
        };

        let name = partition_name(date);
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {name} PARTITION OF report \
             FOR VALUES FROM ('{from}') TO ('{to}')",
            from = date.format("%Y-%m-%d"),
            to = next.format("%Y-%m-%d"),
        ))
        .execute(&mut *conn)
        .await?;

        install_hot_indexes(&mut *conn, &name).await?;
    }
    Ok(())
}

/// Idempotently create the two per-partition hot indexes.
pub async fn install_hot_indexes(conn: &mut PgConnection, partition: &str) -> Result<()> {
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS {partition}_queue_idx ON {partition} \
         (processed_at, submitted_at) WHERE processed_at IS NULL"
    ))
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS {partition}_submitted_idx ON {partition} (submitted_at)"
    ))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Give partitions older than today a BRIN index on `submitted_at`.
async fn install_cold_indexes(conn: &mut PgConnection, today: NaiveDate) -> Result<()> {
    for name in list_partitions(&mut *conn).await? {
        let Some(date) = partition_date(&name) else {
            continue;
        };
        if date >= today {
            continue;
        }
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {name}_brin_idx ON {name} USING brin (submitted_at)"
        ))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Drop daily partitions strictly older than `today - retain_days`.
/// Individual drop failures are logged and skipped, never fatal to
/// the batch.
pub async fn drop_expired(
    conn: &mut PgConnection,
    today: NaiveDate,
    retain_days: u32,
    cascade: bool,
) -> Result<()> {
    let cutoff = expiry_cutoff(today, retain_days);
    let suffix = if cascade { " CASCADE" } else { "" };

    for name in list_partitions(&mut *conn).await? {
        let Some(date) = partition_date(&name) else {
            continue;
        };
        if date >= cutoff {
            continue;
        }
        match sqlx::query(&format!("DROP TABLE IF EXISTS {name}{suffix}"))
            .execute(&mut *conn)
            .await
        {
            Ok(_) => info!(partition = %name, "Dropped expired partition"),
            Err(e) => warn!(partition = %name, error = %e, "Failed to drop partition, skipping"),
        }
    }
    Ok(())
}

/// All current child partitions of the report table.
async fn list_partitions(conn: &mut PgConnection) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT c.relname FROM pg_inherits i \
         JOIN pg_class c ON c.oid = i.inhrelid \
         JOIN pg_class p ON p.oid = i.inhparent \
         WHERE p.relname = 'report'",
    )
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(|row| row.get("relname")).collect())
}
