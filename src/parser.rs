//! CSV loaders for the station list and trip records.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::RecordError;

/// A docking station as stored in `stations.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    #[serde(rename = "station_name")]
    pub name: String,
    #[serde(rename = "station_latitude")]
    pub latitude: f64,
    #[serde(rename = "station_longitude")]
    pub longitude: f64,
    #[serde(rename = "station_capacity", deserialize_with = "de_count")]
    pub capacity: i32,
    #[serde(rename = "station_available", deserialize_with = "de_count")]
    pub available: i32,
    #[serde(
        rename = "station_optimal",
        default,
        deserialize_with = "de_optional_count"
    )]
    pub optimal: Option<i32>,
}

impl Station {
    pub fn new(name: impl Into<String>, capacity: i32, available: i32) -> Self {
        Self {
            name: name.into(),
            latitude: 0.0,
            longitude: 0.0,
            capacity,
            available,
            optimal: None,
        }
    }

    /// Checks `0 <= available <= capacity`.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.available < 0 || self.available > self.capacity {
            return Err(RecordError::AvailabilityOutOfRange {
                station: self.name.clone(),
                available: self.available,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

/// A single historic trip as stored in `records.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    #[serde(with = "timestamp")]
    pub started_at: NaiveDateTime,
    #[serde(with = "timestamp")]
    pub ended_at: NaiveDateTime,
    /// Trip duration in seconds.
    pub duration: f64,
    pub start_station_name: String,
    pub end_station_name: String,
}

impl TripRecord {
    pub fn start_date(&self) -> NaiveDate {
        self.started_at.date()
    }

    /// `true` if the trip ends on a later calendar day than it started.
    pub fn is_overnight(&self) -> bool {
        self.ended_at.date() != self.started_at.date()
    }

    pub fn start_hour(&self) -> usize {
        self.started_at.hour() as usize
    }

    pub fn is_round_trip(&self) -> bool {
        self.start_station_name == self.end_station_name
    }
}

/// Reads all stations from `path`.
///
/// Rows violating `0 <= available <= capacity` are kept but reported.
pub fn load_stations(path: impl AsRef<Path>) -> Result<Vec<Station>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut rdr = csv::Reader::from_reader(file);

    let mut stations = Vec::new();
    for result in rdr.deserialize() {
        let station: Station =
            result.with_context(|| format!("parsing station row in {}", path.display()))?;
        if let Err(e) = station.validate() {
            warn!(error = %e, "Station violates availability invariant");
        }
        stations.push(station);
    }

    debug!(path = %path.display(), count = stations.len(), "Stations loaded");
    Ok(stations)
}

/// Reads all trip records from `path`.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<TripRecord>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut rdr = csv::Reader::from_reader(file);

    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: TripRecord =
            result.with_context(|| format!("parsing trip row in {}", path.display()))?;
        records.push(record);
    }

    debug!(path = %path.display(), count = records.len(), "Records loaded");
    Ok(records)
}

/// Parses a timestamp into the wall-clock time it denotes.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff][+HH:MM]` and the same with a
/// `T` separator. Offsets are dropped after parsing; the local time of the
/// stamp is what hourly bucketing works on.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, RecordError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt.naive_local());
        }
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    Err(RecordError::Timestamp(s.to_string()))
}

pub(crate) mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&dt.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_timestamp(&s).map_err(serde::de::Error::custom)
    }
}

/// Counts are written as integers, but upstream tools sometimes emit `12.0`.
fn de_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    let value = f64::deserialize(deserializer)?;
    Ok(value.round() as i32)
}

fn de_optional_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .map(|v| Some(v.round() as i32))
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2019, 8, 5)
            .unwrap()
            .and_hms_opt(8, 10, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2019-08-05 08:10:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2019-08-05T08:10:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2019-08-05 08:10:00+00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2019-08-05T08:10:00Z").unwrap(), expected);
    }

    #[test]
    fn test_parse_timestamp_keeps_local_time() {
        let dt = parse_timestamp("2019-08-05 23:30:38.467000+01:00").unwrap();
        assert_eq!(dt.hour(), 23);
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2019, 8, 5).unwrap());
    }

    #[test]
    fn test_parse_timestamp_invalid() {
        assert_eq!(
            parse_timestamp("yesterday"),
            Err(RecordError::Timestamp("yesterday".to_string()))
        );
    }

    #[test]
    fn test_load_stations_with_float_counts_and_no_optimal() {
        let file = write_temp(
            "station_name,station_latitude,station_longitude,station_capacity,station_available\n\
             Bristo Square,55.9460,-3.1900,10.0,5.0\n",
        );
        let stations = load_stations(file.path()).unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].name, "Bristo Square");
        assert_eq!(stations[0].capacity, 10);
        assert_eq!(stations[0].available, 5);
        assert_eq!(stations[0].optimal, None);
    }

    #[test]
    fn test_load_stations_with_optimal_column() {
        let file = write_temp(
            "station_name,station_latitude,station_longitude,station_capacity,station_available,station_optimal\n\
             A,55.0,-3.0,20,9,11\n\
             B,55.1,-3.1,10,5,\n",
        );
        let stations = load_stations(file.path()).unwrap();
        assert_eq!(stations[0].optimal, Some(11));
        assert_eq!(stations[1].optimal, None);
    }

    #[test]
    fn test_load_records() {
        let file = write_temp(
            "started_at,ended_at,duration,start_station_name,end_station_name\n\
             2019-08-05 23:50:00,2019-08-06 00:10:00,1200,B,A\n",
        );
        let records = load_records(file.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_overnight());
        assert_eq!(records[0].start_hour(), 23);
        assert_eq!(records[0].duration, 1200.0);
    }

    #[test]
    fn test_station_validate() {
        assert!(Station::new("A", 10, 10).validate().is_ok());
        assert!(Station::new("A", 10, 11).validate().is_err());
        assert!(Station::new("A", 10, -1).validate().is_err());
    }
}
