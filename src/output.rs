//! Persistence of pipeline artifacts.
//!
//! Supports CSV rows of any serializable type and plain text reports.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::parser::{Station, TripRecord};

/// Writes `rows` to a CSV file at `path`, replacing any existing file.
///
/// Creates parent directories as needed. The header comes from the first row.
pub fn write_rows<T: Serialize>(path: impl AsRef<Path>, rows: &[T]) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    debug!(path = %path.display(), rows = rows.len(), "Writing CSV");

    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}

/// Rewrites `stations.csv`; the `station_optimal` column is left empty where unknown.
pub fn write_stations(path: impl AsRef<Path>, stations: &[Station]) -> Result<()> {
    write_rows(path, stations)
}

pub fn write_records(path: impl AsRef<Path>, records: &[TripRecord]) -> Result<()> {
    write_rows(path, records)
}

pub fn write_text(path: impl AsRef<Path>, text: &str) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    debug!(path = %path.display(), bytes = text.len(), "Writing text");
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{load_records, load_stations, parse_timestamp};
    use std::fs;

    #[test]
    fn test_write_rows_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/stations.csv");

        write_stations(&path, &[Station::new("A", 10, 5)]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "station_name,station_latitude,station_longitude,station_capacity,station_available,station_optimal"
        );
        assert_eq!(lines[1], "A,0.0,0.0,10,5,");
    }

    #[test]
    fn test_stations_reload_with_optimal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stations.csv");
        let mut station = Station::new("Bristo Square", 10, 5);
        station.optimal = Some(6);

        write_stations(&path, &[station.clone()]).unwrap();
        assert_eq!(load_stations(&path).unwrap(), vec![station]);
    }

    #[test]
    fn test_records_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.csv");
        let record = TripRecord {
            started_at: parse_timestamp("2019-08-05 08:10:00.5").unwrap(),
            ended_at: parse_timestamp("2019-08-05 08:25:00").unwrap(),
            duration: 899.5,
            start_station_name: "A".to_string(),
            end_station_name: "B".to_string(),
        };

        write_records(&path, &[record.clone()]).unwrap();
        assert_eq!(load_records(&path).unwrap(), vec![record]);
    }

    #[test]
    fn test_write_text_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.txt");
        write_text(&path, "first").unwrap();
        write_text(&path, "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }
}
