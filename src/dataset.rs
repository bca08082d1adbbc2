//! Naming conventions of the NYC TLC trip record files.

use anyhow::{Result, anyhow};
use std::fmt;

/// Kind of taxi service a trip record file covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxiType {
    Yellow,
    Green,
    /// For-hire vehicles
    Fhv,
    /// High-volume for-hire vehicles
    Fhvhv,
}

impl TaxiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxiType::Yellow => "yellow",
            TaxiType::Green => "green",
            TaxiType::Fhv => "fhv",
            TaxiType::Fhvhv => "fhvhv",
        }
    }

    /// Parse taxi type from string (case-insensitive); also the CLI's value parser
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "yellow" => Ok(TaxiType::Yellow),
            "green" => Ok(TaxiType::Green),
            "fhv" => Ok(TaxiType::Fhv),
            "fhvhv" => Ok(TaxiType::Fhvhv),
            _ => Err(anyhow!(
                "Unsupported taxi type: {}. Supported types: yellow, green, fhv, fhvhv",
                s
            )),
        }
    }
}

impl fmt::Display for TaxiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the URL of a monthly trip record file, e.g.
/// `{prefix}/yellow_tripdata_2025-01.parquet`
pub fn trip_data_url(prefix: &str, taxi_type: TaxiType, year: u16, month: u8) -> Result<String> {
    if !(1..=12).contains(&month) {
        return Err(anyhow!("Invalid month {}: expected 1 through 12", month));
    }

    Ok(format!(
        "{}/{}_tripdata_{:04}-{:02}.parquet",
        prefix.trim_end_matches('/'),
        taxi_type,
        year,
        month
    ))
}

/// Table name used when the caller does not pick one
pub fn default_table_name(taxi_type: TaxiType) -> String {
    format!("{}_taxi_trips", taxi_type)
}
