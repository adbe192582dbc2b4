//! The inference engine: answers a locate query from the learned
//! emitter store, falling back to the imported coarse cell dataset.
//!
//! Priority order: a GNSS fix in the query is returned verbatim;
//! otherwise the observed emitters are resolved in the store, weighted
//! by signal strength and stored accuracy, trimmed of outliers and
//! fused into a weighted centroid; if none resolve, the coarse
//! cell-level prior with the smallest radius answers; failing all of
//! that, the query has no coverage.

use std::cmp::Ordering;
use std::collections::HashMap;

use locus_db::coarse::{self, CoarseCell};
use locus_db::{emitter, DbError, LocusDb};
use locus_model::weight::{signal_weight, DEFAULT_STRENGTH_DBM};
use locus_model::{geo, CellKey, LocateRequest, LocateResponse};
use locus_model::{EmitterAggregate, MacAddr};

use crate::error::ApiError;

/// Accuracy reported for a pass-through GNSS fix without its own.
const DEFAULT_GNSS_ACCURACY_M: f64 = 10.0;

/// Floor of any fused accuracy estimate.
const MIN_ACCURACY_M: f64 = 10.0;

/// Floor applied to a stored accuracy before taking its inverse as a
/// weight, so tight single-observation emitters do not get infinite
/// trust.
const STORE_ACCURACY_FLOOR_M: f64 = 1.0;

/// Share of resolved emitters discarded as outliers.
const TRIM_FRACTION: f64 = 0.10;

/// Trimming is only attempted above this many resolved emitters.
const TRIM_MIN_POINTS: usize = 4;

/// One resolved emitter with the strength the query observed it at.
#[derive(Debug, Clone)]
struct Candidate {
    lat: f64,
    lon: f64,
    store_accuracy: f64,
    strength: f64,
}

/// Answer a locate query.
pub async fn run(db: &LocusDb, req: LocateRequest) -> Result<LocateResponse, ApiError> {
    if let Some(fix) = gnss_fix(&req) {
        return Ok(fix);
    }

    // Collect and normalize the query's emitter keys. Duplicates keep
    // their first-seen strength.
    let mut wifi_query: HashMap<String, f64> = HashMap::new();
    for ap in &req.wifi {
        let mac: MacAddr = ap
            .mac
            .parse()
            .map_err(|e| ApiError::validation(format!("invalid mac address {:?}: {e}", ap.mac)))?;
        wifi_query
            .entry(mac.normalized())
            .or_insert(ap.rssi.unwrap_or(DEFAULT_STRENGTH_DBM));
    }

    let mut bluetooth_query: HashMap<String, f64> = HashMap::new();
    for beacon in &req.bluetooth {
        let mac: MacAddr = beacon.mac.parse().map_err(|e| {
            ApiError::validation(format!("invalid mac address {:?}: {e}", beacon.mac))
        })?;
        bluetooth_query
            .entry(mac.normalized())
            .or_insert(beacon.rssi.unwrap_or(DEFAULT_STRENGTH_DBM));
    }

    let mut cell_query: HashMap<CellKey, f64> = HashMap::new();
    for obs in req.cell.as_ref().map(|c| c.observations()).unwrap_or_default() {
        let key = obs
            .key
            .ok_or_else(|| ApiError::validation("invalid cell identity"))?;
        cell_query
            .entry(key)
            .or_insert(obs.strength.unwrap_or(DEFAULT_STRENGTH_DBM));
    }

    let wifi_keys: Vec<String> = wifi_query.keys().cloned().collect();
    let bluetooth_keys: Vec<String> = bluetooth_query.keys().cloned().collect();
    let cell_keys: Vec<CellKey> = cell_query.keys().copied().collect();

    // All storage reads of one query share one transaction.
    let mut tx = db.begin().await?;
    let wifi_hits = emitter::get_wifi_many(&mut tx, &wifi_keys).await?;
    let bluetooth_hits = emitter::get_bluetooth_many(&mut tx, &bluetooth_keys).await?;
    let cell_hits = emitter::get_cell_many(&mut tx, &cell_keys).await?;

    let mut candidates = Vec::new();
    collect(&mut candidates, &wifi_query, &wifi_hits);
    collect(&mut candidates, &bluetooth_query, &bluetooth_hits);
    collect(&mut candidates, &cell_query, &cell_hits);

    if candidates.is_empty() {
        let coarse_hits = coarse::get_many(&mut tx, &cell_keys).await?;
        tx.commit().await.map_err(DbError::from)?;
        let best = best_coarse(&coarse_hits).ok_or(ApiError::NoCoverage)?;
        return Ok(LocateResponse::new(best.lat, best.lon, best.radius));
    }
    tx.commit().await.map_err(DbError::from)?;

    let (lat, lon, accuracy) = fuse(&candidates);
    Ok(LocateResponse::new(lat, lon, accuracy))
}

/// The pass-through path: a query carrying its own fix answers itself.
fn gnss_fix(req: &LocateRequest) -> Option<LocateResponse> {
    let gnss = req.gnss.as_ref()?;
    if !gnss.latitude.is_finite() || !gnss.longitude.is_finite() {
        return None;
    }
    Some(
        LocateResponse::new(
            gnss.latitude,
            gnss.longitude,
            gnss.accuracy.unwrap_or(DEFAULT_GNSS_ACCURACY_M),
        )
        .with_altitude(gnss.altitude),
    )
}

fn collect<K: std::hash::Hash + Eq>(
    candidates: &mut Vec<Candidate>,
    query: &HashMap<K, f64>,
    hits: &HashMap<K, EmitterAggregate>,
) {
    for (key, agg) in hits {
        if let Some(&strength) = query.get(key) {
            candidates.push(Candidate {
                lat: agg.lat,
                lon: agg.lon,
                store_accuracy: agg.accuracy,
                strength,
            });
        }
    }
}

/// The coarse prior with the tightest radius wins.
fn best_coarse(cells: &[CoarseCell]) -> Option<&CoarseCell> {
    cells
        .iter()
        .min_by(|a, b| a.radius.partial_cmp(&b.radius).unwrap_or(Ordering::Equal))
}

fn weighted_mean(candidates: &[Candidate], weights: &[f64], kept: &[usize]) -> (f64, f64) {
    let mut lat = 0.0;
    let mut lon = 0.0;
    let mut total = 0.0;
    for &i in kept {
        lat += candidates[i].lat * weights[i];
        lon += candidates[i].lon * weights[i];
        total += weights[i];
    }
    (lat / total, lon / total)
}

/// Fuse resolved emitters into a point and accuracy radius.
///
/// Per-emitter weight is the signal weight of the query's observation
/// scaled by the inverse of the stored accuracy: trust tight emitters
/// more than loose ones, strong observations more than faint ones.
fn fuse(candidates: &[Candidate]) -> (f64, f64, f64) {
    let n = candidates.len();
    let weights: Vec<f64> = candidates
        .iter()
        .map(|c| signal_weight(c.strength) / c.store_accuracy.max(STORE_ACCURACY_FLOOR_M))
        .collect();
    let all: Vec<usize> = (0..n).collect();

    // First pass, then discard the farthest tail and recompute.
    let kept: Vec<usize> = if n >= TRIM_MIN_POINTS {
        let (lat0, lon0) = weighted_mean(candidates, &weights, &all);
        let mut by_distance = all.clone();
        by_distance.sort_by(|&a, &b| {
            let da = geo::distance_m(lat0, lon0, candidates[a].lat, candidates[a].lon);
            let db = geo::distance_m(lat0, lon0, candidates[b].lat, candidates[b].lon);
            da.partial_cmp(&db).unwrap_or(Ordering::Equal)
        });
        let discard = ((n as f64 * TRIM_FRACTION).ceil() as usize).min(n - 1);
        by_distance[..n - discard].to_vec()
    } else {
        all
    };

    let (lat, lon) = weighted_mean(candidates, &weights, &kept);

    let mut weighted_d2 = 0.0;
    let mut total_weight = 0.0;
    let mut cap = 0.0f64;
    for &i in &kept {
        let d = geo::distance_m(lat, lon, candidates[i].lat, candidates[i].lon);
        weighted_d2 += weights[i] * d * d;
        total_weight += weights[i];
        cap = cap.max(candidates[i].store_accuracy);
    }
    let rms = (weighted_d2 / total_weight).sqrt();
    let accuracy = rms.min(cap).max(MIN_ACCURACY_M);

    (lat, lon, accuracy)
}
