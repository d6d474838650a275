use chrono::{Datelike, Weekday};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::analyzers::utility::{mean, median};
use crate::parser::{Station, TripRecord};

/// Which dataset a [`DatasetStats`] describes; the report text differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Training,
    Validation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetStats {
    pub kind: DatasetKind,
    pub days_in_set: usize,
    pub total_trips: usize,
    /// Trips minus overnight trips and trips ending on a weekend.
    pub corrected_trips: usize,
    // durations in minutes
    pub max_duration: f64,
    pub min_duration: f64,
    pub mean_duration: f64,
    pub median_duration: f64,
}

impl DatasetStats {
    pub fn from_records(records: &[TripRecord], kind: DatasetKind) -> Self {
        let days: BTreeSet<_> = records.iter().map(TripRecord::start_date).collect();
        let minutes: Vec<f64> = records.iter().map(|r| r.duration / 60.0).collect();

        let overnight = records.iter().filter(|r| r.is_overnight()).count();
        let weekend_end = records
            .iter()
            .filter(|r| matches!(r.ended_at.weekday(), Weekday::Sat | Weekday::Sun))
            .count();

        Self {
            kind,
            days_in_set: days.len(),
            total_trips: records.len(),
            corrected_trips: records.len().saturating_sub(overnight + weekend_end),
            max_duration: minutes.iter().copied().fold(0.0, f64::max),
            min_duration: if minutes.is_empty() {
                0.0
            } else {
                minutes.iter().copied().fold(f64::INFINITY, f64::min)
            },
            mean_duration: mean(&minutes),
            median_duration: median(&minutes),
        }
    }

    pub fn trips_per_day(&self) -> f64 {
        per_day(self.total_trips, self.days_in_set)
    }

    pub fn corrected_trips_per_day(&self) -> f64 {
        per_day(self.corrected_trips, self.days_in_set)
    }
}

fn per_day(trips: usize, days: usize) -> f64 {
    if days == 0 {
        0.0
    } else {
        trips as f64 / days as f64
    }
}

impl fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DatasetKind::Training => {
                writeln!(f, "All calculations EXCLUDE the records from the validation set")?;
                writeln!(
                    f,
                    "Numbers in brackets: corrected for overnight trips and trips that ended on weekends"
                )?;
                writeln!(f, "Number of days in calculations: {}", self.days_in_set)?;
                writeln!(
                    f,
                    "total trips: {} ({})",
                    self.total_trips, self.corrected_trips
                )?;
                writeln!(
                    f,
                    "average trips per day: {} ({})",
                    self.trips_per_day(),
                    self.corrected_trips_per_day()
                )?;
            }
            DatasetKind::Validation => {
                writeln!(f, "All calculations ARE BASED on the records from the validation set")?;
                writeln!(f, "Number of days in calculations: {}", self.days_in_set)?;
                writeln!(f, "total trips: {}", self.total_trips)?;
                writeln!(f, "average trips per day: {}", self.trips_per_day())?;
            }
        }
        writeln!(f)?;
        writeln!(f, "maximum trip duration: {} m", self.max_duration)?;
        writeln!(f, "minimum trip duration: {} m", self.min_duration)?;
        writeln!(f, "average trip duration: {} m", self.mean_duration)?;
        writeln!(f, "median trip duration: {} m", self.median_duration)
    }
}

/// Trip counts of one station, a row of `station_flows.csv`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StationFlowCounts {
    pub index: usize,
    pub station_name: String,
    pub capacity: i32,
    pub departures: usize,
    pub arrivals: usize,
    pub round_trips: usize,
}

/// Counts departures, arrivals and round trips for every station, in station order.
pub fn station_flow_counts(stations: &[Station], records: &[TripRecord]) -> Vec<StationFlowCounts> {
    let mut by_name: BTreeMap<&str, StationFlowCounts> = BTreeMap::new();
    for record in records {
        by_name
            .entry(record.start_station_name.as_str())
            .or_default()
            .departures += 1;
        by_name
            .entry(record.end_station_name.as_str())
            .or_default()
            .arrivals += 1;
        if record.is_round_trip() {
            by_name
                .entry(record.start_station_name.as_str())
                .or_default()
                .round_trips += 1;
        }
    }

    stations
        .iter()
        .enumerate()
        .map(|(index, station)| {
            let counts = by_name.remove(station.name.as_str()).unwrap_or_default();
            StationFlowCounts {
                index,
                station_name: station.name.clone(),
                capacity: station.capacity,
                ..counts
            }
        })
        .collect()
}
