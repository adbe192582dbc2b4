//! PostgreSQL storage layer for the locus geolocation service.
//!
//! One struct, [`LocusDb`], owns the connection pool; the typed
//! operations live in domain modules: the durable report log
//! (`report_log`), the per-emitter aggregates (`emitter`), the daily
//! partition lifecycle (`partition`) and the imported coarse cell
//! dataset (`coarse`).
//!
//! PostgreSQL is not an interchangeable backend here: daily range
//! partitioning, `FOR UPDATE SKIP LOCKED` dequeue and advisory locks
//! are all load-bearing parts of the design.

mod error;
mod schema;

pub mod coarse;
pub mod emitter;
pub mod partition;
pub mod report_log;

pub use error::{DbError, Result};
pub use report_log::QueuedReport;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::info;

/// Handle to the service database.
#[derive(Clone)]
pub struct LocusDb {
    pool: PgPool,
}

impl LocusDb {
    /// Connect to the database at `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;

        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create all tables and the initial partitions if absent.
    pub async fn ensure_schema(&self) -> Result<()> {
        schema::ensure_schema(&self.pool).await
    }

    /// The underlying pool, for request handlers that run a single
    /// statement outside an explicit transaction.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a transaction. Every request or worker batch owns exactly
    /// one and releases it on every exit path.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// Close the pool.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
