//! Database schema creation for all locus tables.
//!
//! All CREATE TABLE statements live here - single source of truth.
//! Per-partition DDL is the partition module's business.

use sqlx::postgres::PgPool;
use tracing::info;

use crate::error::Result;

/// Ensure all tables exist.
pub(crate) async fn ensure_schema(pool: &PgPool) -> Result<()> {
    create_report_table(pool).await?;
    create_emitter_tables(pool).await?;
    create_coarse_table(pool).await?;

    info!("Database schema verified");
    Ok(())
}

/// The durable ingestion log, range-partitioned by receive time so the
/// hot tail stays small and old days can be dropped wholesale.
async fn create_report_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS report (
            id BIGSERIAL,
            submitted_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            "timestamp" TIMESTAMPTZ NOT NULL,
            latitude DOUBLE PRECISION NOT NULL,
            longitude DOUBLE PRECISION NOT NULL,
            user_agent TEXT,
            raw BYTEA NOT NULL,
            processed_at TIMESTAMPTZ,
            processing_error TEXT,
            PRIMARY KEY (id, submitted_at)
        ) PARTITION BY RANGE (submitted_at)"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per emitter, updated in place on every observation, so the
/// three tables get aggressive autovacuum settings.
async fn create_emitter_tables(pool: &PgPool) -> Result<()> {
    for ddl in [
        r#"CREATE TABLE IF NOT EXISTS wifi (
            mac TEXT PRIMARY KEY,
            min_lat DOUBLE PRECISION NOT NULL,
            min_lon DOUBLE PRECISION NOT NULL,
            max_lat DOUBLE PRECISION NOT NULL,
            max_lon DOUBLE PRECISION NOT NULL,
            lat DOUBLE PRECISION NOT NULL,
            lon DOUBLE PRECISION NOT NULL,
            accuracy DOUBLE PRECISION NOT NULL,
            total_weight DOUBLE PRECISION NOT NULL,
            min_strength DOUBLE PRECISION NOT NULL,
            max_strength DOUBLE PRECISION NOT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS bluetooth (
            mac TEXT PRIMARY KEY,
            min_lat DOUBLE PRECISION NOT NULL,
            min_lon DOUBLE PRECISION NOT NULL,
            max_lat DOUBLE PRECISION NOT NULL,
            max_lon DOUBLE PRECISION NOT NULL,
            lat DOUBLE PRECISION NOT NULL,
            lon DOUBLE PRECISION NOT NULL,
            accuracy DOUBLE PRECISION NOT NULL,
            total_weight DOUBLE PRECISION NOT NULL,
            min_strength DOUBLE PRECISION NOT NULL,
            max_strength DOUBLE PRECISION NOT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS cell (
            radio SMALLINT NOT NULL,
            country SMALLINT NOT NULL,
            network SMALLINT NOT NULL,
            area INTEGER NOT NULL,
            cell BIGINT NOT NULL,
            unit SMALLINT NOT NULL,
            min_lat DOUBLE PRECISION NOT NULL,
            min_lon DOUBLE PRECISION NOT NULL,
            max_lat DOUBLE PRECISION NOT NULL,
            max_lon DOUBLE PRECISION NOT NULL,
            lat DOUBLE PRECISION NOT NULL,
            lon DOUBLE PRECISION NOT NULL,
            accuracy DOUBLE PRECISION NOT NULL,
            total_weight DOUBLE PRECISION NOT NULL,
            min_strength DOUBLE PRECISION NOT NULL,
            max_strength DOUBLE PRECISION NOT NULL,
            PRIMARY KEY (radio, country, network, area, cell, unit)
        )"#,
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    for table in ["wifi", "bluetooth", "cell"] {
        sqlx::query(&format!(
            "ALTER TABLE {table} SET (autovacuum_vacuum_scale_factor = 0.02, \
             autovacuum_analyze_scale_factor = 0.02)"
        ))
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Read-only coarse cell priors imported out of band from a public
/// reference dataset. Fallback source for the inference engine only.
async fn create_coarse_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS cell_import (
            radio SMALLINT NOT NULL,
            country SMALLINT NOT NULL,
            network SMALLINT NOT NULL,
            area INTEGER NOT NULL,
            cell BIGINT NOT NULL,
            unit SMALLINT NOT NULL,
            lat DOUBLE PRECISION NOT NULL,
            lon DOUBLE PRECISION NOT NULL,
            radius DOUBLE PRECISION NOT NULL,
            PRIMARY KEY (radio, country, network, area, cell, unit)
        )"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
