//! Background aggregation worker.
//!
//! Consumes the unprocessed tail of the report log, derives
//! per-emitter observations from each raw report and folds them into
//! the emitter store. One batch is one storage transaction end to
//! end, so a crash at any point simply re-delivers the batch.

mod extract;
mod worker;

pub use extract::{extract, ExtractConfig, ExtractError, Observations};
pub use worker::{AggregationWorker, WorkerConfig};
