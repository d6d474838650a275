//! Cleaning of the raw trip and station exports.
//!
//! Produces the training records, the held-out validation records and the
//! station list the rest of the pipeline works on.

use chrono::{Datelike, Weekday};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

use crate::analyzers::utility::quantile;
use crate::config::Settings;
use crate::parser::{Station, TripRecord};

const WEEKDAYS: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

/// Rows removed by each cleaning step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleaningReport {
    pub initial_trips: usize,
    pub weekend_trips: usize,
    pub unused_station_trips: usize,
    pub duration_outliers: usize,
    pub unknown_station_trips: usize,
    pub removed_stations: usize,
    pub validation_days: Vec<u32>,
    pub training_trips: usize,
    pub validation_trips: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanedData {
    pub stations: Vec<Station>,
    pub training: Vec<TripRecord>,
    pub validation: Vec<TripRecord>,
    pub report: CleaningReport,
}

pub fn only_weekdays(records: Vec<TripRecord>) -> Vec<TripRecord> {
    records
        .into_iter()
        .filter(|r| WEEKDAYS.contains(&r.started_at.weekday()))
        .collect()
}

/// Drops every trip touching a station with fewer than `threshold` arrivals or departures.
pub fn remove_unused_stations(records: Vec<TripRecord>, threshold: usize) -> Vec<TripRecord> {
    let mut departures: HashMap<&str, usize> = HashMap::new();
    let mut arrivals: HashMap<&str, usize> = HashMap::new();
    for r in &records {
        *departures.entry(r.start_station_name.as_str()).or_default() += 1;
        *arrivals.entry(r.end_station_name.as_str()).or_default() += 1;
    }

    let unused: HashSet<String> = departures
        .iter()
        .chain(arrivals.iter())
        .filter(|(_, count)| **count < threshold)
        .map(|(name, count)| {
            debug!(station = *name, count = *count, threshold, "Station below usage threshold");
            name.to_string()
        })
        .collect();

    records
        .into_iter()
        .filter(|r| !unused.contains(&r.start_station_name) && !unused.contains(&r.end_station_name))
        .collect()
}

/// Keeps trips whose duration lies between the `low` and `high` quantiles, inclusive.
pub fn remove_duration_outliers(records: Vec<TripRecord>, low: f64, high: f64) -> Vec<TripRecord> {
    let durations: Vec<f64> = records.iter().map(|r| r.duration).collect();
    let low = quantile(&durations, low);
    let high = quantile(&durations, high);
    records
        .into_iter()
        .filter(|r| r.duration >= low && r.duration <= high)
        .collect()
}

/// Picks one day-of-month per weekday for validation.
///
/// The distinct days of each weekday are sorted and shuffled with a seeded
/// ChaCha8 generator, so the same seed always holds out the same days.
pub fn validation_days(records: &[TripRecord], seed: u64) -> Vec<u32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    WEEKDAYS
        .iter()
        .filter_map(|weekday| {
            let mut days: Vec<u32> = records
                .iter()
                .filter(|r| r.started_at.weekday() == *weekday)
                .map(|r| r.started_at.day())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            days.shuffle(&mut rng);
            days.first().copied()
        })
        .collect()
}

/// Runs every cleaning step in order and splits off the validation days.
#[tracing::instrument(skip_all, fields(trips = records.len(), stations = stations.len()))]
pub fn clean(records: Vec<TripRecord>, stations: Vec<Station>, settings: &Settings) -> CleanedData {
    let mut report = CleaningReport {
        initial_trips: records.len(),
        ..Default::default()
    };

    let mut records = records;
    if settings.weekdays_only {
        let n = records.len();
        records = only_weekdays(records);
        report.weekend_trips = n - records.len();
    }

    let n = records.len();
    records = remove_unused_stations(records, settings.station_usage_threshold);
    report.unused_station_trips = n - records.len();

    let n = records.len();
    records = remove_duration_outliers(
        records,
        settings.duration_min_quantile,
        settings.duration_max_quantile,
    );
    report.duration_outliers = n - records.len();

    let known: HashSet<&str> = stations.iter().map(|s| s.name.as_str()).collect();
    let n = records.len();
    records.retain(|r| {
        known.contains(r.start_station_name.as_str()) && known.contains(r.end_station_name.as_str())
    });
    report.unknown_station_trips = n - records.len();

    let starts: HashSet<&str> = records.iter().map(|r| r.start_station_name.as_str()).collect();
    let ends: HashSet<&str> = records.iter().map(|r| r.end_station_name.as_str()).collect();
    let n = stations.len();
    let stations: Vec<Station> = stations
        .into_iter()
        .filter(|s| starts.contains(s.name.as_str()) && ends.contains(s.name.as_str()))
        .collect();
    report.removed_stations = n - stations.len();

    report.validation_days = validation_days(&records, settings.split_seed);
    let (validation, training): (Vec<_>, Vec<_>) = records
        .into_iter()
        .partition(|r| report.validation_days.contains(&r.started_at.day()));
    report.training_trips = training.len();
    report.validation_trips = validation.len();

    info!(
        weekend = report.weekend_trips,
        unused = report.unused_station_trips,
        outliers = report.duration_outliers,
        unknown = report.unknown_station_trips,
        removed_stations = report.removed_stations,
        validation_days = ?report.validation_days,
        training = report.training_trips,
        validation = report.validation_trips,
        "Cleaning finished"
    );

    CleanedData {
        stations,
        training,
        validation,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_timestamp;

    fn trip(start: &str, duration: f64, from: &str, to: &str) -> TripRecord {
        let started_at = parse_timestamp(start).unwrap();
        TripRecord {
            started_at,
            ended_at: started_at + chrono::Duration::seconds(duration as i64),
            duration,
            start_station_name: from.to_string(),
            end_station_name: to.to_string(),
        }
    }

    /// Two weeks of August 2019 starting on Monday the 5th.
    fn fortnight() -> Vec<TripRecord> {
        let mut records = Vec::new();
        for day in 5..=18 {
            let date = format!("2019-08-{day:02} 08:00:00");
            records.push(trip(&date, 600.0, "A", "B"));
            records.push(trip(&date, 900.0, "B", "A"));
        }
        records
    }

    #[test]
    fn test_only_weekdays() {
        let records = only_weekdays(fortnight());
        assert_eq!(records.len(), 20);
        assert!(records.iter().all(|r| r.started_at.weekday().number_from_monday() <= 5));
    }

    #[test]
    fn test_remove_unused_stations() {
        let mut records = fortnight();
        records.push(trip("2019-08-05 09:00:00", 600.0, "A", "C"));
        let records = remove_unused_stations(records, 2);
        assert_eq!(records.len(), 28);
        assert!(records.iter().all(|r| r.end_station_name != "C"));
    }

    #[test]
    fn test_remove_duration_outliers() {
        let records = vec![
            trip("2019-08-05 08:00:00", 60.0, "A", "B"),
            trip("2019-08-05 08:00:00", 600.0, "A", "B"),
            trip("2019-08-05 08:00:00", 700.0, "A", "B"),
            trip("2019-08-05 08:00:00", 90000.0, "A", "B"),
        ];
        assert_eq!(remove_duration_outliers(records.clone(), 0.0, 1.0).len(), 4);
        let kept = remove_duration_outliers(records, 0.1, 0.9);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_validation_days_one_per_weekday_and_seeded() {
        let records = only_weekdays(fortnight());
        let days = validation_days(&records, 42);
        assert_eq!(days.len(), 5);
        let weekdays: HashSet<_> = days
            .iter()
            .map(|d| chrono::NaiveDate::from_ymd_opt(2019, 8, *d).unwrap().weekday())
            .collect();
        assert_eq!(weekdays.len(), 5);
        assert_eq!(days, validation_days(&records, 42));
    }

    #[test]
    fn test_clean_splits_and_filters_stations() {
        let stations = vec![
            Station::new("A", 20, 9),
            Station::new("B", 10, 5),
            Station::new("D", 10, 5),
        ];
        let settings = Settings::default();
        let cleaned = clean(fortnight(), stations, &settings);

        assert_eq!(cleaned.report.weekend_trips, 8);
        assert_eq!(cleaned.report.removed_stations, 1);
        assert_eq!(cleaned.stations.len(), 2);
        assert_eq!(cleaned.report.validation_days.len(), 5);
        // one of two weeks goes to validation
        assert_eq!(cleaned.validation.len(), 10);
        assert_eq!(cleaned.training.len(), 10);
        assert!(
            cleaned
                .validation
                .iter()
                .all(|r| cleaned.report.validation_days.contains(&r.started_at.day()))
        );
    }
}
