//! Cellular radio types: the four supported families and the
//! six-tuple key that identifies one cell across all of them.
//!
//! Clients report cells partitioned by family (`gsm` / `wcdma` / `lte`
//! / `nr`), each with its own identifier and signal-strength field
//! names. Storage flattens everything onto one key shape:
//! `(radio, country, network, area, cell, unit)`.

use serde::{Deserialize, Serialize};

/// Radio access family. The discriminants are the codes persisted in
/// the `radio` key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum CellRadio {
    Gsm = 2,
    Wcdma = 3,
    Lte = 4,
    Nr = 5,
}

impl CellRadio {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            2 => Some(Self::Gsm),
            3 => Some(Self::Wcdma),
            4 => Some(Self::Lte),
            5 => Some(Self::Nr),
            _ => None,
        }
    }
}

/// Identity of a single cell: radio family, MCC, MNC, area code
/// (LAC/TAC), cell identity (CI/ECI/NCI) and the family's secondary
/// physical-layer identifier (PSC/PCI/SSBI, 0 when absent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub radio: CellRadio,
    pub country: i16,
    pub network: i16,
    pub area: i32,
    pub cell: i64,
    pub unit: i16,
}

/// MCC and MNC are three-digit codes; out-of-range submissions are
/// clamped rather than rejected.
fn clamp_code(v: u16) -> i16 {
    v.clamp(1, 999) as i16
}

/// A 2G cell entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gsm {
    pub mcc: u16,
    pub mnc: u16,
    pub lac: u32,
    pub ci: u64,
    /// RXLEV, dBm.
    pub rxlev: Option<f64>,
    pub age: Option<i32>,
    pub bsic: Option<u32>,
    pub arfcn: Option<u32>,
    pub ta: Option<f64>,
}

/// A 3G cell entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Wcdma {
    pub mcc: u16,
    pub mnc: u16,
    pub lac: u32,
    pub ci: u64,
    /// RSCP, dBm.
    pub rscp: Option<f64>,
    pub age: Option<i32>,
    pub psc: Option<u16>,
    pub uarfcn: Option<u32>,
}

/// A 4G cell entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lte {
    pub mcc: u16,
    pub mnc: u16,
    pub tac: u32,
    pub eci: u64,
    /// RSRP, dBm.
    pub rsrp: Option<f64>,
    pub age: Option<i32>,
    pub rsrq: Option<f64>,
    pub pci: Option<u16>,
    pub earfcn: Option<u32>,
    pub ta: Option<f64>,
}

/// A 5G cell entry.
///
/// `tac` arrives as a signed value in some client builds but is a
/// 24-bit unsigned quantity; negatives invalidate the entry. The
/// historical `arcfn` spelling is accepted on input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Nr {
    pub mcc: u16,
    pub mnc: u16,
    pub tac: i64,
    pub nci: u64,
    /// SS-RSRP, dBm.
    pub ss_rsrp: Option<f64>,
    pub age: Option<i32>,
    pub rsrq: Option<f64>,
    pub pci: Option<u16>,
    #[serde(alias = "arcfn")]
    pub arfcn: Option<u32>,
    pub ssbi: Option<u16>,
}

impl Gsm {
    pub fn key(&self) -> Option<CellKey> {
        Some(CellKey {
            radio: CellRadio::Gsm,
            country: clamp_code(self.mcc),
            network: clamp_code(self.mnc),
            area: i32::try_from(self.lac).ok()?,
            cell: i64::try_from(self.ci).ok()?,
            unit: 0,
        })
    }

    pub fn strength(&self) -> Option<f64> {
        self.rxlev
    }
}

impl Wcdma {
    pub fn key(&self) -> Option<CellKey> {
        Some(CellKey {
            radio: CellRadio::Wcdma,
            country: clamp_code(self.mcc),
            network: clamp_code(self.mnc),
            area: i32::try_from(self.lac).ok()?,
            cell: i64::try_from(self.ci).ok()?,
            unit: self.psc.map(|p| p as i16).unwrap_or(0),
        })
    }

    pub fn strength(&self) -> Option<f64> {
        self.rscp
    }
}

impl Lte {
    pub fn key(&self) -> Option<CellKey> {
        Some(CellKey {
            radio: CellRadio::Lte,
            country: clamp_code(self.mcc),
            network: clamp_code(self.mnc),
            area: i32::try_from(self.tac).ok()?,
            cell: i64::try_from(self.eci).ok()?,
            unit: self.pci.filter(|p| *p <= 1007).map(|p| p as i16).unwrap_or(0),
        })
    }

    pub fn strength(&self) -> Option<f64> {
        self.rsrp
    }
}

impl Nr {
    /// None when `tac` falls outside the unsigned 24-bit range.
    pub fn key(&self) -> Option<CellKey> {
        if !(0..=0xFF_FFFF).contains(&self.tac) {
            return None;
        }
        Some(CellKey {
            radio: CellRadio::Nr,
            country: clamp_code(self.mcc),
            network: clamp_code(self.mnc),
            area: self.tac as i32,
            cell: i64::try_from(self.nci).ok()?,
            unit: self.ssbi.map(|s| s as i16).unwrap_or(0),
        })
    }

    pub fn strength(&self) -> Option<f64> {
        self.ss_rsrp
    }
}

/// The `cell` object of a report or locate request: one optional array
/// per family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CellBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gsm: Option<Vec<Gsm>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wcdma: Option<Vec<Wcdma>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<Vec<Lte>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nr: Option<Vec<Nr>>,
}

/// One cell entry reduced to key + strength. `key` is `None` for
/// entries whose identifiers do not form a valid six-tuple; callers
/// skip those individually.
#[derive(Debug, Clone, Copy)]
pub struct CellObservation {
    pub key: Option<CellKey>,
    pub strength: Option<f64>,
}

impl CellBlock {
    pub fn is_empty(&self) -> bool {
        self.observations().is_empty()
    }

    /// Flatten all families into key/strength pairs.
    pub fn observations(&self) -> Vec<CellObservation> {
        let mut out = Vec::new();
        if let Some(gsm) = &self.gsm {
            out.extend(gsm.iter().map(|c| CellObservation {
                key: c.key(),
                strength: c.strength(),
            }));
        }
        if let Some(wcdma) = &self.wcdma {
            out.extend(wcdma.iter().map(|c| CellObservation {
                key: c.key(),
                strength: c.strength(),
            }));
        }
        if let Some(lte) = &self.lte {
            out.extend(lte.iter().map(|c| CellObservation {
                key: c.key(),
                strength: c.strength(),
            }));
        }
        if let Some(nr) = &self.nr {
            out.extend(nr.iter().map(|c| CellObservation {
                key: c.key(),
                strength: c.strength(),
            }));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radio_codes_roundtrip() {
        for radio in [CellRadio::Gsm, CellRadio::Wcdma, CellRadio::Lte, CellRadio::Nr] {
            assert_eq!(CellRadio::from_code(radio.code()), Some(radio));
        }
        assert_eq!(CellRadio::from_code(0), None);
        assert_eq!(CellRadio::from_code(6), None);
    }

    #[test]
    fn mcc_mnc_are_clamped() {
        let cell = Gsm {
            mcc: 0,
            mnc: 1200,
            lac: 9742,
            ci: 2878,
            ..Default::default()
        };
        let key = cell.key().unwrap();
        assert_eq!(key.country, 1);
        assert_eq!(key.network, 999);
        assert_eq!(key.unit, 0);
    }

    #[test]
    fn secondary_identifier_defaults_to_zero() {
        let lte = Lte {
            mcc: 250,
            mnc: 2,
            tac: 5016,
            eci: 40_944_044,
            rsrp: Some(-97.0),
            ..Default::default()
        };
        assert_eq!(lte.key().unwrap().unit, 0);

        let with_pci = Lte {
            pci: Some(124),
            ..lte.clone()
        };
        assert_eq!(with_pci.key().unwrap().unit, 124);
        // both resolve the same area/cell identity
        assert_eq!(lte.key().unwrap().cell, 40_944_044);
    }

    #[test]
    fn nr_tac_is_unsigned_24_bit() {
        let base = Nr {
            mcc: 250,
            mnc: 1,
            tac: 0x00_ABCD,
            nci: 123_456_789,
            ss_rsrp: Some(-101.0),
            ..Default::default()
        };
        assert!(base.key().is_some());

        let negative = Nr { tac: -1, ..base.clone() };
        assert!(negative.key().is_none());

        let oversized = Nr { tac: 0x0100_0000, ..base };
        assert!(oversized.key().is_none());
    }

    #[test]
    fn nr_accepts_transposed_arfcn_spelling() {
        let json = r#"{"mcc":250,"mnc":1,"tac":1234,"nci":42,"arcfn":630000}"#;
        let nr: Nr = serde_json::from_str(json).unwrap();
        assert_eq!(nr.arfcn, Some(630_000));

        // the corrected spelling is what we emit
        let out = serde_json::to_string(&nr).unwrap();
        assert!(out.contains("\"arfcn\":630000"));
        assert!(!out.contains("arcfn"));
    }

    #[test]
    fn block_flattens_all_families() {
        let block = CellBlock {
            gsm: Some(vec![Gsm {
                mcc: 250,
                mnc: 2,
                lac: 9742,
                ci: 2878,
                rxlev: Some(-80.0),
                ..Default::default()
            }]),
            lte: Some(vec![Lte {
                mcc: 250,
                mnc: 1,
                tac: 15016,
                eci: 576_267,
                rsrp: Some(-53.0),
                ..Default::default()
            }]),
            ..Default::default()
        };
        let obs = block.observations();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].key.unwrap().radio, CellRadio::Gsm);
        assert_eq!(obs[1].key.unwrap().radio, CellRadio::Lte);
        assert_eq!(obs[1].strength, Some(-53.0));
    }
}
