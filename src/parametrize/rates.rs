//! Demand parameters derived from the training records.

use chrono::Timelike;
use std::collections::HashMap;

use crate::analyzers::flow::{FlowAggregator, FlowStatistic, HOURS};
use crate::analyzers::utility::{mean, round_to};
use crate::error::StationError;
use crate::parser::{Station, TripRecord};

/// Departures per minute for every hour of the day, by station index.
///
/// Mean hourly departures divided by 60 and rounded to 4 places.
pub fn spawn_rates(
    stations: &[Station],
    aggregator: &FlowAggregator<'_>,
) -> Result<Vec<[f64; HOURS]>, StationError> {
    stations
        .iter()
        .map(|station| {
            let flows = aggregator.station_flows(&station.name, FlowStatistic::Mean)?;
            Ok(std::array::from_fn(|h| round_to(flows.departures[h] / 60.0, 4)))
        })
        .collect()
}

fn index_by_name(stations: &[Station]) -> HashMap<&str, usize> {
    stations
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.as_str(), i))
        .collect()
}

/// Destination probabilities per hour of departure.
///
/// `probabilities(h, i)` lists `(destination index, probability)` for trips
/// that started at station `i` during hour `h`, in station order.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationTable {
    hours: Vec<Vec<Vec<(usize, f64)>>>,
}

impl DestinationTable {
    pub fn from_records(stations: &[Station], records: &[TripRecord]) -> Self {
        let index = index_by_name(stations);
        let n = stations.len();
        let mut counts = vec![vec![vec![0u32; n]; n]; HOURS];

        for record in records {
            let (Some(&from), Some(&to)) = (
                index.get(record.start_station_name.as_str()),
                index.get(record.end_station_name.as_str()),
            ) else {
                continue;
            };
            counts[record.started_at.hour() as usize][from][to] += 1;
        }

        let hours = counts
            .into_iter()
            .map(|by_start| {
                by_start
                    .into_iter()
                    .map(|row| {
                        let total: u32 = row.iter().sum();
                        row.iter()
                            .enumerate()
                            .filter(|(_, c)| **c > 0)
                            .map(|(to, c)| (to, *c as f64 / total as f64))
                            .collect()
                    })
                    .collect()
            })
            .collect();

        Self { hours }
    }

    pub fn probabilities(&self, hour: usize, station: usize) -> &[(usize, f64)] {
        &self.hours[hour][station]
    }

    pub fn station_count(&self) -> usize {
        self.hours.first().map_or(0, Vec::len)
    }
}

/// Mean trip duration in minutes between every pair of stations.
#[derive(Debug, Clone, PartialEq)]
pub struct DurationTable {
    /// Observed pairs, rounded to 2 places.
    pairs: Vec<Vec<Option<f64>>>,
    /// Mean over the whole dataset, used for pairs never observed.
    pub default: f64,
}

impl DurationTable {
    pub fn from_records(stations: &[Station], records: &[TripRecord]) -> Self {
        let index = index_by_name(stations);
        let n = stations.len();
        let mut sums = vec![vec![Vec::new(); n]; n];

        for record in records {
            if let (Some(&from), Some(&to)) = (
                index.get(record.start_station_name.as_str()),
                index.get(record.end_station_name.as_str()),
            ) {
                sums[from][to].push(record.duration);
            }
        }

        let pairs = sums
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|durations| {
                        (!durations.is_empty()).then(|| round_to(mean(&durations) / 60.0, 2))
                    })
                    .collect()
            })
            .collect();

        let all: Vec<f64> = records.iter().map(|r| r.duration).collect();
        Self {
            pairs,
            default: mean(&all) / 60.0,
        }
    }

    pub fn minutes(&self, from: usize, to: usize) -> f64 {
        self.pairs[from][to].unwrap_or(self.default)
    }

    pub fn is_observed(&self, from: usize, to: usize) -> bool {
        self.pairs[from][to].is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::flow::ArrivalPolicy;
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

    fn stations() -> Vec<Station> {
        vec![
            Station::new("A", 20, 9),
            Station::new("B", 10, 5),
            Station::new("C", 15, 7),
        ]
    }

    fn records() -> Vec<TripRecord> {
        vec![
            trip("2019-08-05 08:10:00", 900.0, "A", "B"),
            trip("2019-08-05 08:40:00", 900.0, "A", "C"),
            trip("2019-08-06 08:15:00", 1200.0, "A", "B"),
            trip("2019-08-06 12:00:00", 1800.0, "C", "A"),
            trip("2019-08-06 12:30:00", 60.0, "C", "Unknown"),
        ]
    }

    #[test]
    fn test_spawn_rates() {
        let records = records();
        let aggregator = FlowAggregator::new(&records, ArrivalPolicy::ExcludeOvernight);
        let rates = spawn_rates(&stations(), &aggregator).unwrap();
        assert_eq!(rates.len(), 3);
        // 1.5 departures per hour
        assert_eq!(rates[0][8], 0.025);
        assert_eq!(rates[1], [0.0; HOURS]);
        // two departures at 12 on the second day, none on the first
        assert_eq!(rates[2][12], round_to(1.0 / 60.0, 4));
    }

    #[test]
    fn test_destination_probabilities() {
        let table = DestinationTable::from_records(&stations(), &records());
        assert_eq!(table.station_count(), 3);
        let probs = table.probabilities(8, 0);
        assert_eq!(probs.len(), 2);
        assert_eq!(probs[0].0, 1);
        assert!((probs[0].1 - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(probs[1].0, 2);
        // trips to stations outside the list are ignored
        assert_eq!(table.probabilities(12, 2), &[(0, 1.0)]);
        assert!(table.probabilities(3, 0).is_empty());
    }

    #[test]
    fn test_durations() {
        let table = DurationTable::from_records(&stations(), &records());
        assert_eq!(table.minutes(0, 1), 17.5);
        assert!(table.is_observed(2, 0));
        assert_eq!(table.minutes(2, 0), 30.0);
        assert!(!table.is_observed(1, 2));
        assert_eq!(table.minutes(1, 2), table.default);
        assert!((table.default - 4860.0 / 5.0 / 60.0).abs() < 1e-12);
    }
}
