//! Raw report extraction: parse, validate, normalize.
//!
//! A report that fails validation here is marked permanently failed
//! with the error text as its diagnostic; it is never retried.
//! Individually invalid emitters (bad MAC syntax, malformed cell
//! identity) are skipped without failing the report, unless nothing
//! survives.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use locus_model::weight::DEFAULT_STRENGTH_DBM;
use locus_model::{CellKey, MacAddr, ReportItem};

/// How far a device clock may lag behind the server.
const MAX_TIMESTAMP_LAG_DAYS: i64 = 30;

/// How far a device clock may run ahead of the server.
const MAX_TIMESTAMP_SKEW_DAYS: i64 = 1;

/// Validation knobs, taken from the service configuration.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Reports with a coarser GNSS fix than this are rejected, meters.
    pub gnss_max_accuracy_m: f64,
    /// Skip locally-administered (randomized) Wi-Fi MACs.
    pub laa_filter: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            gnss_max_accuracy_m: 200.0,
            laa_filter: true,
        }
    }
}

/// Why a report was rejected. The rendered message is persisted as
/// the report's `processing_error`.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("malformed report: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("timestamp {0} outside the accepted window")]
    TimestampOutOfRange(i64),

    #[error("position ({lat}, {lon}) outside valid range")]
    PositionOutOfRange { lat: f64, lon: f64 },

    #[error("gnss accuracy {0} m coarser than the configured limit")]
    FixTooCoarse(f64),

    #[error("report carries no emitters")]
    NoEmitters,

    #[error("no emitter survived normalization")]
    NoUsableEmitters,
}

/// Validated observations of one report: the GNSS truth plus every
/// surviving emitter with its strength (defaulted when absent).
#[derive(Debug, Clone)]
pub struct Observations {
    pub lat: f64,
    pub lon: f64,
    pub wifi: Vec<(String, f64)>,
    pub bluetooth: Vec<(String, f64)>,
    pub cells: Vec<(CellKey, f64)>,
}

impl Observations {
    pub fn emitter_count(&self) -> usize {
        self.wifi.len() + self.bluetooth.len() + self.cells.len()
    }
}

/// Parse and validate one raw report, accepting both wire dialects.
pub fn extract(
    raw: &[u8],
    now: DateTime<Utc>,
    config: &ExtractConfig,
) -> Result<Observations, ExtractError> {
    let item = ReportItem::from_raw(raw)?;

    // A missing device timestamp means "just now"; a present one must
    // fall inside the accepted clock-skew window.
    if let Some(ts) = item.timestamp {
        let lower = now - Duration::days(MAX_TIMESTAMP_LAG_DAYS);
        let upper = now + Duration::days(MAX_TIMESTAMP_SKEW_DAYS);
        let ts_utc = DateTime::<Utc>::from_timestamp_millis(ts)
            .ok_or(ExtractError::TimestampOutOfRange(ts))?;
        if ts_utc < lower || ts_utc > upper {
            return Err(ExtractError::TimestampOutOfRange(ts));
        }
    }

    let lat = item.gnss.latitude;
    let lon = item.gnss.longitude;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(ExtractError::PositionOutOfRange { lat, lon });
    }

    if let Some(accuracy) = item.gnss.accuracy {
        if accuracy > config.gnss_max_accuracy_m {
            return Err(ExtractError::FixTooCoarse(accuracy));
        }
    }

    let wifi_raw = item.wifi.unwrap_or_default();
    let bluetooth_raw = item.bluetooth.unwrap_or_default();
    let cell_raw = item
        .cell
        .map(|block| block.observations())
        .unwrap_or_default();

    if wifi_raw.is_empty() && bluetooth_raw.is_empty() && cell_raw.is_empty() {
        return Err(ExtractError::NoEmitters);
    }

    let mut wifi = Vec::with_capacity(wifi_raw.len());
    for ap in wifi_raw {
        let Ok(mac) = ap.mac.parse::<MacAddr>() else {
            continue;
        };
        if config.laa_filter && mac.is_local() {
            continue;
        }
        wifi.push((mac.normalized(), ap.rssi.unwrap_or(DEFAULT_STRENGTH_DBM)));
    }

    let mut bluetooth = Vec::with_capacity(bluetooth_raw.len());
    for beacon in bluetooth_raw {
        let Ok(mac) = beacon.mac.parse::<MacAddr>() else {
            continue;
        };
        bluetooth.push((mac.normalized(), beacon.rssi.unwrap_or(DEFAULT_STRENGTH_DBM)));
    }

    let mut cells = Vec::with_capacity(cell_raw.len());
    for obs in cell_raw {
        let Some(key) = obs.key else {
            continue;
        };
        cells.push((key, obs.strength.unwrap_or(DEFAULT_STRENGTH_DBM)));
    }

    let observations = Observations {
        lat,
        lon,
        wifi,
        bluetooth,
        cells,
    };
    if observations.emitter_count() == 0 {
        return Err(ExtractError::NoUsableEmitters);
    }
    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_733_000_000_000).unwrap()
    }

    fn config() -> ExtractConfig {
        ExtractConfig::default()
    }

    fn base_report(extra: &str) -> Vec<u8> {
        format!(
            r#"{{
                "timestamp": 1733000000000,
                "gnss": {{"latitude": 56.0112, "longitude": 37.4765, "accuracy": 5.0}},
                {extra}
            }}"#
        )
        .into_bytes()
    }

    #[test]
    fn happy_path_collects_all_kinds() {
        let raw = base_report(
            r#""wifi": [{"mac": "5ca6e669e5ec", "rssi": -81}, {"mac": "50:FF:20:EC:90:D7", "rssi": -73}],
               "bluetooth": [{"mac": "ac87a30732b8", "rssi": -60}],
               "cell": {"lte": [{"mcc": 250, "mnc": 2, "tac": 5016, "eci": 40944044, "rsrp": -97}]}"#,
        );
        let obs = extract(&raw, now(), &config()).unwrap();
        assert_eq!(obs.wifi.len(), 2);
        assert_eq!(obs.wifi[1].0, "50ff20ec90d7");
        assert_eq!(obs.bluetooth.len(), 1);
        assert_eq!(obs.cells.len(), 1);
        assert_eq!(obs.emitter_count(), 4);
    }

    #[test]
    fn stale_and_future_timestamps_are_rejected() {
        let month_ago = now() - Duration::days(31);
        let raw = format!(
            r#"{{"timestamp": {}, "gnss": {{"latitude": 1.0, "longitude": 1.0}},
                 "wifi": [{{"mac": "ac87a30732b8"}}]}}"#,
            month_ago.timestamp_millis()
        );
        assert!(matches!(
            extract(raw.as_bytes(), now(), &config()),
            Err(ExtractError::TimestampOutOfRange(_))
        ));

        let in_two_days = now() + Duration::days(2);
        let raw = format!(
            r#"{{"timestamp": {}, "gnss": {{"latitude": 1.0, "longitude": 1.0}},
                 "wifi": [{{"mac": "ac87a30732b8"}}]}}"#,
            in_two_days.timestamp_millis()
        );
        assert!(matches!(
            extract(raw.as_bytes(), now(), &config()),
            Err(ExtractError::TimestampOutOfRange(_))
        ));
    }

    #[test]
    fn missing_timestamp_is_accepted() {
        let raw = br#"{"gnss": {"latitude": 1.0, "longitude": 1.0},
                       "wifi": [{"mac": "ac87a30732b8", "rssi": -70}]}"#;
        assert!(extract(raw, now(), &config()).is_ok());
    }

    #[test]
    fn out_of_range_position_is_rejected() {
        let raw = br#"{"gnss": {"latitude": 91.0, "longitude": 0.0},
                       "wifi": [{"mac": "ac87a30732b8"}]}"#;
        assert!(matches!(
            extract(raw, now(), &config()),
            Err(ExtractError::PositionOutOfRange { .. })
        ));

        let raw = br#"{"gnss": {"latitude": 0.0, "longitude": -180.5},
                       "wifi": [{"mac": "ac87a30732b8"}]}"#;
        assert!(matches!(
            extract(raw, now(), &config()),
            Err(ExtractError::PositionOutOfRange { .. })
        ));
    }

    #[test]
    fn coarse_fix_is_rejected() {
        let raw = br#"{"gnss": {"latitude": 1.0, "longitude": 1.0, "accuracy": 350.0},
                       "wifi": [{"mac": "ac87a30732b8"}]}"#;
        assert!(matches!(
            extract(raw, now(), &config()),
            Err(ExtractError::FixTooCoarse(_))
        ));
    }

    #[test]
    fn invalid_macs_are_skipped_not_fatal() {
        let raw = base_report(
            r#""wifi": [{"mac": "not-a-mac", "rssi": -70}, {"mac": "ac87a30732b8", "rssi": -70}]"#,
        );
        let obs = extract(&raw, now(), &config()).unwrap();
        assert_eq!(obs.wifi.len(), 1);

        // zero survivors fails the report
        let raw = base_report(r#""wifi": [{"mac": "not-a-mac"}, {"mac": "123"}]"#);
        assert!(matches!(
            extract(&raw, now(), &config()),
            Err(ExtractError::NoUsableEmitters)
        ));
    }

    #[test]
    fn locally_administered_macs_are_filtered() {
        let raw = base_report(
            r#""wifi": [{"mac": "12:34:56:78:90:ab", "rssi": -50},
                        {"mac": "ac87a30732b8", "rssi": -70}]"#,
        );
        let obs = extract(&raw, now(), &config()).unwrap();
        assert_eq!(obs.wifi.len(), 1);
        assert_eq!(obs.wifi[0].0, "ac87a30732b8");

        let keep_all = ExtractConfig {
            laa_filter: false,
            ..config()
        };
        let obs = extract(&raw, now(), &keep_all).unwrap();
        assert_eq!(obs.wifi.len(), 2);
    }

    #[test]
    fn missing_strength_gets_the_default() {
        let raw = base_report(r#""wifi": [{"mac": "ac87a30732b8"}]"#);
        let obs = extract(&raw, now(), &config()).unwrap();
        assert_eq!(obs.wifi[0].1, DEFAULT_STRENGTH_DBM);
    }

    #[test]
    fn empty_report_is_rejected() {
        let raw = base_report(r#""wifi": []"#);
        assert!(matches!(
            extract(&raw, now(), &config()),
            Err(ExtractError::NoEmitters)
        ));
    }

    #[test]
    fn invalid_nr_tac_skips_only_that_cell() {
        let raw = base_report(
            r#""cell": {"nr": [
                {"mcc": 250, "mnc": 1, "tac": -5, "nci": 1},
                {"mcc": 250, "mnc": 1, "tac": 1234, "nci": 2, "ss_rsrp": -100}
            ]}"#,
        );
        let obs = extract(&raw, now(), &config()).unwrap();
        assert_eq!(obs.cells.len(), 1);
        assert_eq!(obs.cells[0].0.cell, 2);
    }

    #[test]
    fn legacy_dialect_extracts() {
        let raw = br#"{
            "timestamp": 1733000000000,
            "position": {"latitude": 56.0112, "longitude": 37.4765},
            "wifiAccessPoints": [{"macAddress": "50:FF:20:EC:90:D7", "signalStrength": -73}]
        }"#;
        let obs = extract(raw, now(), &config()).unwrap();
        assert_eq!(obs.wifi, vec![("50ff20ec90d7".to_string(), -73.0)]);
    }
}
