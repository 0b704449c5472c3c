//! Canonical row types: what transforms write and loaders read.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ArtifactError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GdpRow {
    #[serde(rename = "Id")]
    pub id: u32,
    #[serde(rename = "Province")]
    pub province: String,
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(rename = "GDP Nominal (billion RP)")]
    pub nominal_rp: f64,
    #[serde(rename = "GDP Nominal (billion USD)")]
    pub nominal_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrpRow {
    #[serde(rename = "Id")]
    pub id: u32,
    #[serde(rename = "Province")]
    pub province: String,
    #[serde(rename = "Per capita (thousand RP)")]
    pub per_capita_rp: f64,
    #[serde(rename = "Per capita Nominal (USD)")]
    pub per_capita_usd: f64,
}

/// One province of the reconciled HDI table. Values are fixed-width
/// decimal strings keyed by year.
#[derive(Debug, Clone, PartialEq)]
pub struct HdiRow {
    pub id: u32,
    pub province: String,
    pub values: BTreeMap<u16, String>,
}

/// The HDI table with its year columns in ascending order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HdiTable {
    pub years: Vec<u16>,
    pub rows: Vec<HdiRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    #[serde(rename = "Year")]
    pub year: String,
    #[serde(rename = "Average")]
    pub average: f64,
}

// ── Province dimension rows, derived from GDP ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvinceRow {
    #[serde(rename = "Id")]
    pub id: u32,
    #[serde(rename = "Province")]
    pub province: String,
    #[serde(rename = "Region")]
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionRow {
    #[serde(rename = "Id")]
    pub id: u32,
    #[serde(rename = "Region")]
    pub region: String,
}

/// Rows that carry a province name and a dense surrogate id.
pub trait Provincial {
    fn province(&self) -> &str;
    fn set_id(&mut self, id: u32);
}

impl Provincial for GdpRow {
    fn province(&self) -> &str {
        &self.province
    }
    fn set_id(&mut self, id: u32) {
        self.id = id;
    }
}

impl Provincial for GrpRow {
    fn province(&self) -> &str {
        &self.province
    }
    fn set_id(&mut self, id: u32) {
        self.id = id;
    }
}

impl Provincial for HdiRow {
    fn province(&self) -> &str {
        &self.province
    }
    fn set_id(&mut self, id: u32) {
        self.id = id;
    }
}

pub const ID_COLUMN: &str = "Id";
pub const PROVINCE_COLUMN: &str = "Province";

impl HdiTable {
    pub fn header(&self) -> Vec<String> {
        let mut header = vec![ID_COLUMN.to_string(), PROVINCE_COLUMN.to_string()];
        header.extend(self.years.iter().map(u16::to_string));
        header
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, csv::Error> {
        let mut w = csv::Writer::from_writer(Vec::new());
        w.write_record(self.header())?;
        for row in &self.rows {
            let mut record = vec![row.id.to_string(), row.province.clone()];
            for year in &self.years {
                record.push(row.values.get(year).cloned().unwrap_or_default());
            }
            w.write_record(&record)?;
        }
        w.into_inner().map_err(|e| e.into_error().into())
    }

    /// Read a table written by [`HdiTable::to_csv`]. Every column after
    /// `Id, Province` must be a year, every `Id` an integer, and every record
    /// as wide as the header.
    pub fn read_csv(path: &Path) -> Result<Self, ArtifactError> {
        let mut r = csv::Reader::from_path(path)?;
        let headers = r.headers()?.clone();

        let mut years = Vec::with_capacity(headers.len().saturating_sub(2));
        for (position, h) in headers.iter().enumerate() {
            let ok = match position {
                0 => h == ID_COLUMN,
                1 => h == PROVINCE_COLUMN,
                _ => match h.parse::<u16>() {
                    Ok(year) => {
                        years.push(year);
                        true
                    }
                    Err(_) => false,
                },
            };
            if !ok {
                return Err(ArtifactError::UnexpectedColumn {
                    column: h.to_string(),
                    position,
                });
            }
        }
        if headers.len() < 2 {
            return Err(ArtifactError::UnexpectedColumn {
                column: String::new(),
                position: headers.len(),
            });
        }

        let mut rows = Vec::new();
        for (i, record) in r.records().enumerate() {
            // flexible(false): records narrower or wider than the header fail here
            let record = record?;
            let raw_id = &record[0];
            let id = raw_id.parse().map_err(|_| ArtifactError::InvalidId {
                record: i as u64 + 1,
                value: raw_id.to_string(),
            })?;
            let values = years
                .iter()
                .zip(record.iter().skip(2))
                .map(|(y, v)| (*y, v.to_string()))
                .collect();
            rows.push(HdiRow {
                id,
                province: record[1].to_string(),
                values,
            });
        }
        Ok(HdiTable { years, rows })
    }
}

/// Serialize typed rows to CSV bytes with their renamed headers.
pub fn to_csv<T: Serialize>(rows: &[T]) -> Result<Vec<u8>, csv::Error> {
    let mut w = csv::Writer::from_writer(Vec::new());
    for row in rows {
        w.serialize(row)?;
    }
    w.into_inner().map_err(|e| e.into_error().into())
}

pub fn read_csv<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, csv::Error> {
    csv::Reader::from_path(path)?.deserialize().collect()
}
