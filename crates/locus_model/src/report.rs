//! Submitted ground-truth reports.
//!
//! Two wire dialects feed the same pipeline: the canonical shape used
//! by `/api/v1/report` (snake_case, `gnss` block) and the legacy
//! `/v2/geosubmit` shape (camelCase, `position` block, flat
//! `cellTowers` array). Only the bare minimum is parsed at ingestion
//! time; the full decode happens in the aggregation worker so that a
//! malformed item costs a per-item error instead of a dropped batch.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::cell::{CellBlock, Gsm, Lte, Nr, Wcdma};

/// A batch submission: items are kept as raw JSON so the stored bytes
/// are exactly what the client sent.
#[derive(Debug, Deserialize)]
pub struct Submission {
    pub items: Vec<Box<RawValue>>,
}

/// Minimal per-item view decoded at ingestion time: just enough to
/// fill the report row's truth columns. Accepts both dialects.
#[derive(Debug, Deserialize)]
pub struct IngestPeek {
    pub timestamp: Option<i64>,
    gnss: Option<PeekPosition>,
    position: Option<PeekPosition>,
}

#[derive(Debug, Deserialize)]
struct PeekPosition {
    latitude: f64,
    longitude: f64,
}

impl IngestPeek {
    /// The GNSS truth of the item, whichever dialect carried it.
    pub fn truth(&self) -> Option<(f64, f64)> {
        self.gnss
            .as_ref()
            .or(self.position.as_ref())
            .map(|p| (p.latitude, p.longitude))
    }
}

/// GNSS block of a canonical report item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gnss {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    /// Horizontal accuracy of the fix, meters.
    pub accuracy: Option<f64>,
    pub bearing: Option<f64>,
    pub speed: Option<f64>,
}

/// A Wi-Fi access point observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiObs {
    pub mac: String,
    /// RSSI, dBm.
    pub rssi: Option<f64>,
    pub ssid: Option<String>,
    pub channel: Option<u16>,
    pub frequency: Option<f64>,
    pub snr: Option<f64>,
    pub bandwidth: Option<f64>,
    pub age: Option<i32>,
}

/// A Bluetooth beacon observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BluetoothObs {
    pub mac: String,
    pub rssi: Option<f64>,
    pub age: Option<i32>,
}

/// One canonical report item: a GNSS fix plus the radio environment
/// observed at that instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportItem {
    /// Device-side measurement time, milliseconds since the epoch.
    pub timestamp: Option<i64>,
    pub device_id: Option<String>,
    pub gnss: Gnss,
    pub wifi: Option<Vec<WifiObs>>,
    pub bluetooth: Option<Vec<BluetoothObs>>,
    pub cell: Option<CellBlock>,
}

impl ReportItem {
    /// Decode a stored raw item, trying the canonical dialect first
    /// and falling back to the legacy geosubmit shape.
    pub fn from_raw(raw: &[u8]) -> Result<Self, serde_json::Error> {
        match serde_json::from_slice::<ReportItem>(raw) {
            Ok(item) => Ok(item),
            Err(canonical_err) => match serde_json::from_slice::<LegacyReportItem>(raw) {
                Ok(legacy) => Ok(legacy.into()),
                Err(_) => Err(canonical_err),
            },
        }
    }
}

// --- Legacy geosubmit dialect ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyReportItem {
    pub timestamp: Option<i64>,
    pub device_id: Option<String>,
    pub position: LegacyPosition,
    pub wifi_access_points: Option<Vec<LegacyWifi>>,
    pub cell_towers: Option<Vec<LegacyCellTower>>,
    pub bluetooth_beacons: Option<Vec<LegacyBluetooth>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub altitude: Option<f64>,
    pub altitude_accuracy: Option<f64>,
    pub age: Option<i32>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub pressure: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyWifi {
    pub mac_address: String,
    pub signal_strength: Option<f64>,
    pub signal_to_noise_ratio: Option<f64>,
    pub ssid: Option<String>,
    pub channel: Option<u16>,
    pub frequency: Option<f64>,
    pub age: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBluetooth {
    pub mac_address: String,
    pub signal_strength: Option<f64>,
    pub age: Option<i32>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegacyRadioType {
    Gsm,
    Wcdma,
    Lte,
    Nr,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCellTower {
    pub radio_type: LegacyRadioType,
    pub mobile_country_code: u16,
    pub mobile_network_code: u16,
    pub location_area_code: Option<u32>,
    pub cell_id: Option<u64>,
    pub primary_scrambling_code: Option<u16>,
    pub signal_strength: Option<f64>,
    /// Arbitrary Strength Unit, converted to dBm when no explicit
    /// signal strength is present.
    pub asu: Option<i16>,
    pub age: Option<i32>,
}

impl LegacyCellTower {
    /// Received power in dBm, preferring the explicit reading over the
    /// per-family ASU conversion. ASU 99 means unknown.
    pub fn strength(&self) -> Option<f64> {
        if self.signal_strength.is_some() {
            return self.signal_strength;
        }
        let asu = self.asu.filter(|a| *a != 99)?;
        Some(match self.radio_type {
            LegacyRadioType::Gsm => 2.0 * asu as f64 - 113.0,
            LegacyRadioType::Wcdma => asu as f64 - 120.0,
            LegacyRadioType::Lte | LegacyRadioType::Nr => asu as f64 - 140.0,
        })
    }
}

impl From<LegacyReportItem> for ReportItem {
    fn from(legacy: LegacyReportItem) -> Self {
        let mut cell = CellBlock::default();
        for tower in legacy.cell_towers.unwrap_or_default() {
            // A tower without an area or cell identity cannot form a
            // six-tuple; drop it here like any other invalid emitter.
            let (Some(area), Some(ci)) = (tower.location_area_code, tower.cell_id) else {
                continue;
            };
            let strength = tower.strength();
            match tower.radio_type {
                LegacyRadioType::Gsm => cell.gsm.get_or_insert_with(Vec::new).push(Gsm {
                    mcc: tower.mobile_country_code,
                    mnc: tower.mobile_network_code,
                    lac: area,
                    ci,
                    rxlev: strength,
                    age: tower.age,
                    ..Default::default()
                }),
                LegacyRadioType::Wcdma => cell.wcdma.get_or_insert_with(Vec::new).push(Wcdma {
                    mcc: tower.mobile_country_code,
                    mnc: tower.mobile_network_code,
                    lac: area,
                    ci,
                    rscp: strength,
                    age: tower.age,
                    psc: tower.primary_scrambling_code,
                    ..Default::default()
                }),
                LegacyRadioType::Lte => cell.lte.get_or_insert_with(Vec::new).push(Lte {
                    mcc: tower.mobile_country_code,
                    mnc: tower.mobile_network_code,
                    tac: area,
                    eci: ci,
                    rsrp: strength,
                    age: tower.age,
                    pci: tower.primary_scrambling_code,
                    ..Default::default()
                }),
                LegacyRadioType::Nr => cell.nr.get_or_insert_with(Vec::new).push(Nr {
                    mcc: tower.mobile_country_code,
                    mnc: tower.mobile_network_code,
                    tac: area as i64,
                    nci: ci,
                    ss_rsrp: strength,
                    age: tower.age,
                    pci: tower.primary_scrambling_code,
                    ..Default::default()
                }),
            }
        }

        let wifi = legacy.wifi_access_points.map(|aps| {
            aps.into_iter()
                .map(|ap| WifiObs {
                    mac: ap.mac_address,
                    rssi: ap.signal_strength,
                    ssid: ap.ssid,
                    channel: ap.channel,
                    frequency: ap.frequency,
                    snr: ap.signal_to_noise_ratio,
                    bandwidth: None,
                    age: ap.age,
                })
                .collect()
        });

        let bluetooth = legacy.bluetooth_beacons.map(|beacons| {
            beacons
                .into_iter()
                .map(|b| BluetoothObs {
                    mac: b.mac_address,
                    rssi: b.signal_strength,
                    age: b.age,
                })
                .collect()
        });

        ReportItem {
            timestamp: legacy.timestamp,
            device_id: legacy.device_id,
            gnss: Gnss {
                latitude: legacy.position.latitude,
                longitude: legacy.position.longitude,
                altitude: legacy.position.altitude,
                accuracy: legacy.position.accuracy,
                bearing: legacy.position.heading,
                speed: legacy.position.speed,
            },
            wifi,
            bluetooth,
            cell: if cell.is_empty() { None } else { Some(cell) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellRadio;

    #[test]
    fn canonical_item_parses() {
        let raw = br#"{
            "timestamp": 1733000000000,
            "device_id": "abc",
            "gnss": {"latitude": 56.0112, "longitude": 37.4765, "accuracy": 4.5},
            "wifi": [
                {"mac": "5ca6e669e5ec", "rssi": -81},
                {"mac": "50:ff:20:ec:90:d7", "rssi": -73, "ssid": "cafe"}
            ],
            "cell": {"lte": [{"mcc": 250, "mnc": 2, "tac": 5016, "eci": 40944044, "rsrp": -97}]}
        }"#;
        let item = ReportItem::from_raw(raw).unwrap();
        assert_eq!(item.gnss.latitude, 56.0112);
        assert_eq!(item.wifi.as_ref().unwrap().len(), 2);
        let obs = item.cell.unwrap().observations();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].key.unwrap().radio, CellRadio::Lte);
    }

    #[test]
    fn legacy_item_maps_onto_canonical_shape() {
        let raw = br#"{
            "timestamp": 1733000000000,
            "position": {"latitude": 56.0112, "longitude": 37.4765, "accuracy": 7.0, "heading": 120.0},
            "wifiAccessPoints": [{"macAddress": "50:FF:20:EC:90:D7", "signalStrength": -73}],
            "cellTowers": [{
                "radioType": "lte",
                "mobileCountryCode": 250,
                "mobileNetworkCode": 2,
                "locationAreaCode": 5016,
                "cellId": 40944044,
                "primaryScramblingCode": 124,
                "signalStrength": -97
            }],
            "bluetoothBeacons": [{"macAddress": "aabbccddeeff", "signalStrength": -60}]
        }"#;
        let item = ReportItem::from_raw(raw).unwrap();
        assert_eq!(item.gnss.longitude, 37.4765);
        assert_eq!(item.gnss.bearing, Some(120.0));
        assert_eq!(item.wifi.as_ref().unwrap()[0].mac, "50:FF:20:EC:90:D7");
        assert_eq!(item.bluetooth.as_ref().unwrap()[0].rssi, Some(-60.0));

        let obs = item.cell.unwrap().observations();
        let key = obs[0].key.unwrap();
        assert_eq!(key.radio, CellRadio::Lte);
        assert_eq!(key.area, 5016);
        assert_eq!(key.unit, 124);
        assert_eq!(obs[0].strength, Some(-97.0));
    }

    #[test]
    fn legacy_tower_asu_conversion() {
        let tower = |radio, asu| LegacyCellTower {
            radio_type: radio,
            mobile_country_code: 250,
            mobile_network_code: 2,
            location_area_code: Some(1),
            cell_id: Some(1),
            primary_scrambling_code: None,
            signal_strength: None,
            asu: Some(asu),
            age: None,
        };
        assert_eq!(tower(LegacyRadioType::Gsm, 15).strength(), Some(-83.0));
        assert_eq!(tower(LegacyRadioType::Wcdma, 35).strength(), Some(-85.0));
        assert_eq!(tower(LegacyRadioType::Lte, 32).strength(), Some(-108.0));
        assert_eq!(tower(LegacyRadioType::Nr, 32).strength(), Some(-108.0));
        // 99 means unknown
        assert_eq!(tower(LegacyRadioType::Lte, 99).strength(), None);
        // explicit reading wins over ASU
        let explicit = LegacyCellTower {
            signal_strength: Some(-20.0),
            ..tower(LegacyRadioType::Lte, 32)
        };
        assert_eq!(explicit.strength(), Some(-20.0));
    }

    #[test]
    fn legacy_tower_without_identity_is_dropped() {
        let raw = br#"{
            "position": {"latitude": 10.0, "longitude": 10.0},
            "cellTowers": [{"radioType": "gsm", "mobileCountryCode": 250,
                            "mobileNetworkCode": 2, "locationAreaCode": null, "cellId": null}]
        }"#;
        let item = ReportItem::from_raw(raw).unwrap();
        assert!(item.cell.is_none());
    }

    #[test]
    fn peek_reads_either_dialect() {
        let canonical: IngestPeek =
            serde_json::from_str(r#"{"gnss": {"latitude": 1.5, "longitude": 2.5}}"#).unwrap();
        assert_eq!(canonical.truth(), Some((1.5, 2.5)));

        let legacy: IngestPeek =
            serde_json::from_str(r#"{"position": {"latitude": 3.5, "longitude": 4.5}}"#).unwrap();
        assert_eq!(legacy.truth(), Some((3.5, 4.5)));

        let neither: IngestPeek = serde_json::from_str(r#"{"timestamp": 1}"#).unwrap();
        assert_eq!(neither.truth(), None);
    }

    #[test]
    fn malformed_raw_reports_canonical_error() {
        assert!(ReportItem::from_raw(b"{").is_err());
        assert!(ReportItem::from_raw(b"{\"timestamp\": 1}").is_err());
    }
}
