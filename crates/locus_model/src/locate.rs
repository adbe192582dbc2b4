//! Locate query wire types.

use serde::{Deserialize, Serialize};

use crate::cell::CellBlock;
use crate::report::{BluetoothObs, Gnss, WifiObs};

/// Body of `POST /api/v1/locate`. Every section is optional; an empty
/// query is syntactically valid and resolves to no coverage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocateRequest {
    /// Milliseconds since the epoch; defaults to the server clock.
    pub timestamp: Option<i64>,
    pub device_id: Option<String>,
    pub gnss: Option<Gnss>,
    #[serde(default)]
    pub wifi: Vec<WifiObs>,
    #[serde(default)]
    pub bluetooth: Vec<BluetoothObs>,
    pub cell: Option<CellBlock>,
}

/// A resolved position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub longitude: f64,
    pub latitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

/// Body of a successful locate response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocateResponse {
    pub location: Location,
    /// Radius of the accuracy estimate, meters.
    pub accuracy: f64,
}

impl LocateResponse {
    /// Build a response, rounding coordinates to six decimal places
    /// (about 0.1 m, well under any accuracy this service reports).
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self {
            location: Location {
                longitude: round6(longitude),
                latitude: round6(latitude),
                altitude: None,
            },
            accuracy,
        }
    }

    pub fn with_altitude(mut self, altitude: Option<f64>) -> Self {
        self.location.altitude = altitude;
        self
    }
}

fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}
