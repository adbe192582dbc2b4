//! Periodic background tasks.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use locus_db::LocusDb;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(3600);

/// Hourly partition maintenance: extend the forward horizon, index
/// cold partitions, drop those past retention. Failures are logged
/// and retried on the next tick.
pub fn partition_maintenance_task(
    db: LocusDb,
    horizon_days: u32,
    retain_days: u32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match db.maintain_partitions(horizon_days, retain_days, false).await {
                Ok(()) => info!("Partition maintenance complete"),
                Err(e) => error!(error = %e, "Partition maintenance failed"),
            }
        }
    })
}
