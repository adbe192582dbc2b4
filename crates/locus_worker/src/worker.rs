//! The reserve → fold → mark loop.
//!
//! One iteration reserves a batch of unprocessed reports, folds their
//! observations into per-emitter deltas, applies the deltas to the
//! emitter store and marks every report done or failed - all inside a
//! single transaction. A report therefore contributes to an aggregate
//! exactly zero or one times, with no idempotence key: if anything
//! aborts, the whole batch returns to the queue.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use locus_db::{emitter, report_log, DbError, LocusDb};
use locus_model::weight::signal_weight;
use locus_model::{CellKey, EmitterAggregate};

use crate::extract::{extract, ExtractConfig};

/// Worker tuning, taken from the service configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum reports reserved per iteration.
    pub batch_size: i64,
    /// Pause when the queue is empty.
    pub idle_delay: Duration,
    /// Pause after a storage error before the next attempt.
    pub error_backoff: Duration,
    /// Upper bound on one batch; an overrunning transaction is
    /// aborted and the reservation returns to the queue.
    pub batch_deadline: Duration,
    pub extract: ExtractConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            idle_delay: Duration::from_secs(5),
            error_backoff: Duration::from_secs(2),
            batch_deadline: Duration::from_secs(120),
            extract: ExtractConfig::default(),
        }
    }
}

/// A single aggregation worker. Stateless between iterations; the
/// report log is the only source of retry state, so any number of
/// workers can run against the same database.
pub struct AggregationWorker {
    db: LocusDb,
    config: WorkerConfig,
}

/// Fold one observation into the per-key delta map.
fn fold<K: Eq + Hash>(deltas: &mut HashMap<K, EmitterAggregate>, key: K, lat: f64, lon: f64, strength: f64) {
    let obs = EmitterAggregate::observation(lat, lon, signal_weight(strength), strength);
    deltas
        .entry(key)
        .and_modify(|agg| agg.merge(&obs))
        .or_insert(obs);
}

impl AggregationWorker {
    pub fn new(db: LocusDb, config: WorkerConfig) -> Self {
        Self { db, config }
    }

    /// Run until the task is dropped.
    pub async fn run(self) {
        loop {
            match timeout(self.config.batch_deadline, self.process_batch()).await {
                Ok(Ok(0)) => sleep(self.config.idle_delay).await,
                Ok(Ok(_)) => {}
                Ok(Err(e)) if e.is_transient() => {
                    warn!(error = %e, "Transient storage error, batch returned to queue");
                    sleep(self.config.error_backoff).await;
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Storage error while aggregating");
                    sleep(self.config.error_backoff).await;
                }
                Err(_) => {
                    // Dropping the in-flight future rolled the
                    // transaction back.
                    warn!("Batch deadline exceeded, reservation returned to queue");
                }
            }
        }
    }

    /// Process one batch. Returns the number of reports consumed.
    pub async fn process_batch(&self) -> Result<usize, DbError> {
        let mut tx = self.db.begin().await?;

        let batch = report_log::reserve(&mut tx, self.config.batch_size).await?;
        if batch.is_empty() {
            tx.commit().await?;
            return Ok(0);
        }

        let now = Utc::now();
        let mut wifi: HashMap<String, EmitterAggregate> = HashMap::new();
        let mut bluetooth: HashMap<String, EmitterAggregate> = HashMap::new();
        let mut cells: HashMap<CellKey, EmitterAggregate> = HashMap::new();

        let mut failed = 0usize;
        for report in &batch {
            match extract(&report.raw, now, &self.config.extract) {
                Ok(obs) => {
                    for (mac, strength) in obs.wifi {
                        fold(&mut wifi, mac, obs.lat, obs.lon, strength);
                    }
                    for (mac, strength) in obs.bluetooth {
                        fold(&mut bluetooth, mac, obs.lat, obs.lon, strength);
                    }
                    for (key, strength) in obs.cells {
                        fold(&mut cells, key, obs.lat, obs.lon, strength);
                    }
                    report_log::mark_done(&mut tx, report.id, report.submitted_at).await?;
                }
                Err(e) => {
                    failed += 1;
                    warn!(report = report.id, error = %e, "Report rejected");
                    report_log::mark_failed(&mut tx, report.id, report.submitted_at, &e.to_string())
                        .await?;
                }
            }
        }

        let emitters = wifi.len() + bluetooth.len() + cells.len();
        emitter::upsert_wifi(&mut tx, &wifi).await?;
        emitter::upsert_bluetooth(&mut tx, &bluetooth).await?;
        emitter::upsert_cell(&mut tx, &cells).await?;

        tx.commit().await?;

        info!(
            reports = batch.len(),
            failed, emitters, "Aggregated report batch"
        );
        Ok(batch.len())
    }
}
