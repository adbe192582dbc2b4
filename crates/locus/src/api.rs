//! HTTP handlers.
//!
//! Only the bare minimum of a submission is decoded here: enough to
//! fill the report row's truth columns. Full decoding and validation
//! belong to the aggregation worker, where a bad item costs a
//! per-item diagnostic instead of a rejected batch.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::USER_AGENT;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};

use locus_model::report::{IngestPeek, Submission};
use locus_model::{LocateRequest, LocateResponse};

use crate::error::ApiError;
use crate::locate;
use crate::server::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({"message": "OK"}))
}

pub async fn locate(
    State(state): State<AppState>,
    payload: Result<Json<LocateRequest>, JsonRejection>,
) -> Result<Json<LocateResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::validation(e.to_string()))?;
    let response = locate::run(&state.db, request).await?;
    Ok(Json(response))
}

pub async fn report(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Submission>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(submission) = payload.map_err(|e| ApiError::validation(e.to_string()))?;
    ingest(&state, &headers, submission).await?;
    // durably appended; per-item processing outcome is asynchronous
    Ok(StatusCode::ACCEPTED)
}

/// Legacy ingestion endpoint, reachable only on the restricted
/// network. Same `items` envelope with renamed fields; the worker
/// normalizes the dialect at extraction time.
pub async fn geosubmit(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Submission>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(submission) = payload.map_err(|e| ApiError::validation(e.to_string()))?;
    ingest(&state, &headers, submission).await?;
    Ok(StatusCode::OK)
}

/// Append every plausible item of a submission to the report log.
/// Items that cannot even yield a truth position are dropped here;
/// everything else is stored byte-for-byte for the worker.
async fn ingest(
    state: &AppState,
    headers: &HeaderMap,
    submission: Submission,
) -> Result<(), ApiError> {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok());
    let now = Utc::now();

    for item in &submission.items {
        let peek: IngestPeek = match serde_json::from_str(item.get()) {
            Ok(peek) => peek,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable report item");
                continue;
            }
        };
        let Some((lat, lon)) = peek.truth() else {
            warn!("Dropping report item without a truth position");
            continue;
        };
        // Null-island test fixes carry no signal.
        if lat.abs() <= 1.0 && lon.abs() <= 1.0 {
            debug!("Dropping report item near the degenerate origin");
            continue;
        }

        let timestamp = peek
            .timestamp
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(now);

        state
            .db
            .append_report(timestamp, lat, lon, user_agent, item.get().as_bytes())
            .await?;
    }

    Ok(())
}
