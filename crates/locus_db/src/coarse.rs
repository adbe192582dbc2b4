//! Imported coarse cell priors.
//!
//! The `cell_import` table is populated out of band from a public
//! reference dataset and is read-only as far as this service is
//! concerned. The inference engine consults it only when none of a
//! query's emitters resolve in the learned store.

use sqlx::postgres::PgConnection;
use sqlx::Row;

use locus_model::{CellKey, CellRadio};

use crate::error::{DbError, Result};

/// One coarse cell-level prior.
#[derive(Debug, Clone)]
pub struct CoarseCell {
    pub key: CellKey,
    pub lat: f64,
    pub lon: f64,
    /// Coverage radius of the prior, meters.
    pub radius: f64,
}

/// Look up coarse priors for the given cell keys. Missing keys are
/// absent from the result.
pub async fn get_many(conn: &mut PgConnection, keys: &[CellKey]) -> Result<Vec<CoarseCell>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let radios: Vec<i16> = keys.iter().map(|k| k.radio.code()).collect();
    let countries: Vec<i16> = keys.iter().map(|k| k.country).collect();
    let networks: Vec<i16> = keys.iter().map(|k| k.network).collect();
    let areas: Vec<i32> = keys.iter().map(|k| k.area).collect();
    let cells: Vec<i64> = keys.iter().map(|k| k.cell).collect();
    let units: Vec<i16> = keys.iter().map(|k| k.unit).collect();

    let rows = sqlx::query(
        "SELECT radio, country, network, area, cell, unit, lat, lon, radius FROM cell_import \
         WHERE (radio, country, network, area, cell, unit) IN (
             SELECT * FROM UNNEST($1::smallint[], $2::smallint[], $3::smallint[], \
                                  $4::integer[], $5::bigint[], $6::smallint[]))",
    )
    .bind(&radios)
    .bind(&countries)
    .bind(&networks)
    .bind(&areas)
    .bind(&cells)
    .bind(&units)
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|row| {
            let code: i16 = row.get("radio");
            let radio = CellRadio::from_code(code)
                .ok_or_else(|| DbError::invalid_state(format!("unknown radio code {code}")))?;
            Ok(CoarseCell {
                key: CellKey {
                    radio,
                    country: row.get("country"),
                    network: row.get("network"),
                    area: row.get("area"),
                    cell: row.get("cell"),
                    unit: row.get("unit"),
                },
                lat: row.get("lat"),
                lon: row.get("lon"),
                radius: row.get("radius"),
            })
        })
        .collect()
}
