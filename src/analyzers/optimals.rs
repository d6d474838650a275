//! Optimal fill level for every station of a dataset.

use tracing::{info, warn};

use crate::analyzers::flow::{ArrivalPolicy, FlowAggregator, FlowStatistic};
use crate::analyzers::search::{SearchOutcome, optimal_fill_level};
use crate::analyzers::types::StationOptimal;
use crate::config::SearchConfig;
use crate::error::StationError;
use crate::parser::{Station, TripRecord};

/// Runs the fill-level search for every station, in order.
///
/// A failing station never aborts the batch. Its row carries the diagnostic
/// and a best-effort value: the abandoned search's level, `0` for an invalid
/// capacity, or the current availability when there is no data to search on.
pub fn compute_optimals(
    stations: &[Station],
    records: &[TripRecord],
    policy: ArrivalPolicy,
    config: &SearchConfig,
) -> Vec<StationOptimal> {
    let aggregator = FlowAggregator::new(records, policy);

    stations
        .iter()
        .map(|station| station_optimal(station, &aggregator, config))
        .collect()
}

fn station_optimal(
    station: &Station,
    aggregator: &FlowAggregator<'_>,
    config: &SearchConfig,
) -> StationOptimal {
    let searched = aggregator
        .station_flows(&station.name, FlowStatistic::Mean)
        .and_then(|flows| optimal_fill_level(station, &flows.net(), config));

    match searched {
        Ok(result) => {
            let diagnostic = match result.converged_level(&station.name) {
                Ok(_) => {
                    info!(
                        station = %station.name,
                        optimal = result.fill_level,
                        outcome = %result.outcome,
                        iterations = result.iterations,
                        "Optimal fill level"
                    );
                    None
                }
                Err(e) => {
                    warn!(error = %e, "Using best-effort fill level");
                    Some(e.to_string())
                }
            };
            StationOptimal {
                station_name: station.name.clone(),
                capacity: station.capacity,
                optimal: result.fill_level,
                outcome: Some(result.outcome),
                percent: Some(result.percent),
                iterations: result.iterations,
                diagnostic,
            }
        }
        Err(e) => {
            let fallback = match e {
                StationError::InvalidCapacity { .. } => 0,
                _ => station.available.clamp(0, (station.capacity - 1).max(0)),
            };
            warn!(error = %e, fallback, "Fill-level search failed");
            StationOptimal {
                station_name: station.name.clone(),
                capacity: station.capacity,
                optimal: fallback,
                outcome: None,
                percent: None,
                iterations: 0,
                diagnostic: Some(e.to_string()),
            }
        }
    }
}

/// Stores the computed levels in `station_optimal`, matching rows by position.
pub fn apply_optimals(stations: &mut [Station], optimals: &[StationOptimal]) {
    for (station, optimal) in stations.iter_mut().zip(optimals) {
        debug_assert_eq!(station.name, optimal.station_name);
        station.optimal = Some(optimal.optimal);
    }
}

/// Number of stations whose search ended with the given outcome.
pub fn count_outcome(optimals: &[StationOptimal], outcome: SearchOutcome) -> usize {
    optimals
        .iter()
        .filter(|o| o.outcome == Some(outcome))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_timestamp;

    fn trip(start: &str, end: &str, from: &str, to: &str) -> TripRecord {
        TripRecord {
            started_at: parse_timestamp(start).unwrap(),
            ended_at: parse_timestamp(end).unwrap(),
            duration: 900.0,
            start_station_name: from.to_string(),
            end_station_name: to.to_string(),
        }
    }

    fn records() -> Vec<TripRecord> {
        vec![
            trip("2019-08-05 08:10:00", "2019-08-05 08:25:00", "A", "B"),
            trip("2019-08-06 17:10:00", "2019-08-06 17:25:00", "B", "A"),
        ]
    }

    #[test]
    fn test_batch_keeps_station_order() {
        let stations = vec![
            Station::new("B", 10, 5),
            Station::new("A", 20, 9),
            Station::new("Z", 30, 12),
        ];
        let optimals = compute_optimals(
            &stations,
            &records(),
            ArrivalPolicy::ExcludeOvernight,
            &SearchConfig::default(),
        );
        let names: Vec<_> = optimals.iter().map(|o| o.station_name.as_str()).collect();
        assert_eq!(names, ["B", "A", "Z"]);
        // unused station: zero flow, initial guess
        assert_eq!(optimals[2].optimal, 14);
        assert_eq!(optimals[2].outcome, Some(SearchOutcome::Converged));
        assert_eq!(count_outcome(&optimals, SearchOutcome::Converged), 3);
    }

    #[test]
    fn test_invalid_capacity_falls_back_to_zero() {
        let stations = vec![Station::new("A", 0, 0), Station::new("B", 10, 5)];
        let optimals = compute_optimals(
            &stations,
            &records(),
            ArrivalPolicy::ExcludeOvernight,
            &SearchConfig::default(),
        );
        assert_eq!(optimals[0].optimal, 0);
        assert_eq!(optimals[0].outcome, None);
        assert!(optimals[0].diagnostic.as_deref().unwrap().contains("invalid capacity"));
        assert!(optimals[1].diagnostic.is_none());
    }

    #[test]
    fn test_missing_data_falls_back_to_available() {
        let stations = vec![Station::new("A", 10, 10)];
        let optimals = compute_optimals(
            &stations,
            &[],
            ArrivalPolicy::ExcludeOvernight,
            &SearchConfig::default(),
        );
        assert_eq!(optimals[0].optimal, 9);
        assert!(optimals[0].diagnostic.is_some());
    }

    #[test]
    fn test_apply_optimals() {
        let mut stations = vec![Station::new("A", 20, 9), Station::new("B", 10, 5)];
        let optimals = compute_optimals(
            &stations,
            &records(),
            ArrivalPolicy::ExcludeOvernight,
            &SearchConfig::default(),
        );
        apply_optimals(&mut stations, &optimals);
        assert!(stations.iter().all(|s| s.optimal.is_some()));
        assert_eq!(stations[1].optimal, Some(optimals[1].optimal));
    }
}
