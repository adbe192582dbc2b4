//! The emitter store: one weighted aggregate row per Wi-Fi BSSID,
//! Bluetooth address or cell six-tuple.
//!
//! `upsert_*` takes batch-local deltas (already folded per key by the
//! caller) and merges each one into the stored row inside the `ON
//! CONFLICT` arm, so the read-modify-write happens under the row lock
//! and concurrent workers touching the same emitter serialize instead
//! of losing updates. One statement per key.
//!
//! The merge arithmetic mirrors `EmitterAggregate::merge`: union of
//! the bounding box and strength envelope, weighted mean of the
//! centroid, accuracy recomputed as the half-diagonal of the merged
//! box on the spherical earth.

use std::collections::HashMap;

use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row;

use locus_model::geo::EARTH_RADIUS_M;
use locus_model::{CellKey, CellRadio, EmitterAggregate};

use crate::error::{DbError, Result};

const PAYLOAD_COLUMNS: &str = "min_lat, min_lon, max_lat, max_lon, lat, lon, accuracy, \
                               total_weight, min_strength, max_strength";

/// Half-diagonal of the merged bounding box, in SQL. `{t}` is the
/// target table, whose columns hold the pre-merge row.
fn merged_accuracy_sql(t: &str) -> String {
    format!(
        "0.5 * sqrt(\
             pow(radians(GREATEST({t}.max_lon, EXCLUDED.max_lon) - LEAST({t}.min_lon, EXCLUDED.min_lon)) \
                 * cos(radians((LEAST({t}.min_lat, EXCLUDED.min_lat) + GREATEST({t}.max_lat, EXCLUDED.max_lat)) / 2.0)) \
                 * {r}, 2) \
           + pow(radians(GREATEST({t}.max_lat, EXCLUDED.max_lat) - LEAST({t}.min_lat, EXCLUDED.min_lat)) * {r}, 2))",
        r = EARTH_RADIUS_M,
    )
}

/// The DO UPDATE arm shared by all three tables.
fn merge_set_sql(t: &str) -> String {
    format!(
        "min_lat = LEAST({t}.min_lat, EXCLUDED.min_lat), \
         min_lon = LEAST({t}.min_lon, EXCLUDED.min_lon), \
         max_lat = GREATEST({t}.max_lat, EXCLUDED.max_lat), \
         max_lon = GREATEST({t}.max_lon, EXCLUDED.max_lon), \
         lat = ({t}.lat * {t}.total_weight + EXCLUDED.lat * EXCLUDED.total_weight) \
             / ({t}.total_weight + EXCLUDED.total_weight), \
         lon = ({t}.lon * {t}.total_weight + EXCLUDED.lon * EXCLUDED.total_weight) \
             / ({t}.total_weight + EXCLUDED.total_weight), \
         accuracy = {acc}, \
         total_weight = {t}.total_weight + EXCLUDED.total_weight, \
         min_strength = LEAST({t}.min_strength, EXCLUDED.min_strength), \
         max_strength = GREATEST({t}.max_strength, EXCLUDED.max_strength)",
        acc = merged_accuracy_sql(t),
    )
}

fn row_to_aggregate(row: &PgRow) -> EmitterAggregate {
    EmitterAggregate {
        min_lat: row.get("min_lat"),
        min_lon: row.get("min_lon"),
        max_lat: row.get("max_lat"),
        max_lon: row.get("max_lon"),
        lat: row.get("lat"),
        lon: row.get("lon"),
        accuracy: row.get("accuracy"),
        total_weight: row.get("total_weight"),
        min_strength: row.get("min_strength"),
        max_strength: row.get("max_strength"),
    }
}

/// Reject rows that violate the aggregate invariants instead of
/// serving them.
fn checked(agg: EmitterAggregate, what: &str) -> Result<EmitterAggregate> {
    if agg.is_consistent() {
        Ok(agg)
    } else {
        Err(DbError::invalid_state(format!(
            "emitter aggregate for {what} is inconsistent"
        )))
    }
}

async fn get_mac_many(
    conn: &mut PgConnection,
    table: &str,
    macs: &[String],
) -> Result<HashMap<String, EmitterAggregate>> {
    if macs.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query(&format!(
        "SELECT mac, {PAYLOAD_COLUMNS} FROM {table} WHERE mac = ANY($1)"
    ))
    .bind(macs)
    .fetch_all(conn)
    .await?;

    let mut out = HashMap::with_capacity(rows.len());
    for row in rows {
        let mac: String = row.get("mac");
        let agg = checked(row_to_aggregate(&row), &mac)?;
        out.insert(mac, agg);
    }
    Ok(out)
}

async fn upsert_mac_many(
    conn: &mut PgConnection,
    table: &str,
    deltas: &HashMap<String, EmitterAggregate>,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO {table} (mac, {PAYLOAD_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (mac) DO UPDATE SET {set}",
        set = merge_set_sql(table),
    );

    for (mac, d) in deltas {
        sqlx::query(&sql)
            .bind(mac)
            .bind(d.min_lat)
            .bind(d.min_lon)
            .bind(d.max_lat)
            .bind(d.max_lon)
            .bind(d.lat)
            .bind(d.lon)
            .bind(d.accuracy)
            .bind(d.total_weight)
            .bind(d.min_strength)
            .bind(d.max_strength)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Look up Wi-Fi aggregates by normalized MAC. Missing keys are simply
/// absent from the result.
pub async fn get_wifi_many(
    conn: &mut PgConnection,
    macs: &[String],
) -> Result<HashMap<String, EmitterAggregate>> {
    get_mac_many(conn, "wifi", macs).await
}

/// Look up Bluetooth aggregates by normalized MAC.
pub async fn get_bluetooth_many(
    conn: &mut PgConnection,
    macs: &[String],
) -> Result<HashMap<String, EmitterAggregate>> {
    get_mac_many(conn, "bluetooth", macs).await
}

/// Apply folded Wi-Fi deltas.
pub async fn upsert_wifi(
    conn: &mut PgConnection,
    deltas: &HashMap<String, EmitterAggregate>,
) -> Result<()> {
    upsert_mac_many(conn, "wifi", deltas).await
}

/// Apply folded Bluetooth deltas.
pub async fn upsert_bluetooth(
    conn: &mut PgConnection,
    deltas: &HashMap<String, EmitterAggregate>,
) -> Result<()> {
    upsert_mac_many(conn, "bluetooth", deltas).await
}

/// Look up cell aggregates by six-tuple key.
pub async fn get_cell_many(
    conn: &mut PgConnection,
    keys: &[CellKey],
) -> Result<HashMap<CellKey, EmitterAggregate>> {
    if keys.is_empty() {
        return Ok(HashMap::new());
    }

    let radios: Vec<i16> = keys.iter().map(|k| k.radio.code()).collect();
    let countries: Vec<i16> = keys.iter().map(|k| k.country).collect();
    let networks: Vec<i16> = keys.iter().map(|k| k.network).collect();
    let areas: Vec<i32> = keys.iter().map(|k| k.area).collect();
    let cells: Vec<i64> = keys.iter().map(|k| k.cell).collect();
    let units: Vec<i16> = keys.iter().map(|k| k.unit).collect();

    let rows = sqlx::query(&format!(
        "SELECT radio, country, network, area, cell, unit, {PAYLOAD_COLUMNS} FROM cell \
         WHERE (radio, country, network, area, cell, unit) IN (
             SELECT * FROM UNNEST($1::smallint[], $2::smallint[], $3::smallint[], \
                                  $4::integer[], $5::bigint[], $6::smallint[]))"
    ))
    .bind(&radios)
    .bind(&countries)
    .bind(&networks)
    .bind(&areas)
    .bind(&cells)
    .bind(&units)
    .fetch_all(conn)
    .await?;

    let mut out = HashMap::with_capacity(rows.len());
    for row in rows {
        let code: i16 = row.get("radio");
        let radio = CellRadio::from_code(code)
            .ok_or_else(|| DbError::invalid_state(format!("unknown radio code {code}")))?;
        let key = CellKey {
            radio,
            country: row.get("country"),
            network: row.get("network"),
            area: row.get("area"),
            cell: row.get("cell"),
            unit: row.get("unit"),
        };
        let agg = checked(row_to_aggregate(&row), &format!("{key:?}"))?;
        out.insert(key, agg);
    }
    Ok(out)
}

/// Apply folded cell deltas.
pub async fn upsert_cell(
    conn: &mut PgConnection,
    deltas: &HashMap<CellKey, EmitterAggregate>,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO cell (radio, country, network, area, cell, unit, {PAYLOAD_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
         ON CONFLICT (radio, country, network, area, cell, unit) DO UPDATE SET {set}",
        set = merge_set_sql("cell"),
    );

    for (key, d) in deltas {
        sqlx::query(&sql)
            .bind(key.radio.code())
            .bind(key.country)
            .bind(key.network)
            .bind(key.area)
            .bind(key.cell)
            .bind(key.unit)
            .bind(d.min_lat)
            .bind(d.min_lon)
            .bind(d.max_lat)
            .bind(d.max_lon)
            .bind(d.lat)
            .bind(d.lon)
            .bind(d.accuracy)
            .bind(d.total_weight)
            .bind(d.min_strength)
            .bind(d.max_strength)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
