//! Model parametrization.
//!
//! Derives spawn rates, destination probabilities, trip durations and the
//! station graph from the training records and writes them into the marked
//! regions of the simulation model source.

pub mod experiment;
pub mod graph;
pub mod inject;
pub mod rates;

use anyhow::Result;
use tracing::{debug, warn};

use crate::analyzers::flow::{ArrivalPolicy, FlowAggregator, HOURS};
use crate::config::Settings;
use crate::error::ParametrizeError;
use crate::parser::{Station, TripRecord};

pub use experiment::render_experiment;
pub use inject::replace_region;
use inject::{
    render_adjacency, render_cooperation, render_destinations, render_durations, render_int_list,
    render_return_matrix, render_spawn_rates, render_stations, render_walk_time,
};
use rates::{DestinationTable, DurationTable, spawn_rates};

/// Every parameter injected into the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    pub spawn_rates: Vec<[f64; HOURS]>,
    pub destinations: DestinationTable,
    pub durations: DurationTable,
    /// Neighbours considered for incentives.
    pub adjacency: Vec<Vec<usize>>,
    /// Neighbours a dissatisfied user walks to.
    pub adjacency_user: Vec<Vec<usize>>,
    /// Bikes placed at every station when the simulation starts.
    pub initial_available: Vec<i32>,
    /// Target level per station, empty unless every station has one.
    pub goal: Vec<i32>,
}

impl ModelParameters {
    pub fn derive(stations: &[Station], records: &[TripRecord], settings: &Settings) -> Result<Self> {
        let aggregator =
            FlowAggregator::new(records, ArrivalPolicy::from_flag(settings.exclude_overnight_arrivals));

        let initial_available = if settings.use_optimals {
            stations
                .iter()
                .map(|s| {
                    s.optimal
                        .ok_or_else(|| ParametrizeError::MissingOptimal(s.name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?
        } else {
            stations.iter().map(|s| s.available).collect()
        };

        let goal: Vec<i32> = stations.iter().filter_map(|s| s.optimal).collect();
        let goal = if goal.len() == stations.len() {
            goal
        } else {
            if !goal.is_empty() {
                warn!(
                    with_optimal = goal.len(),
                    stations = stations.len(),
                    "Some stations lack an optimal level, leaving the goal list empty"
                );
            }
            Vec::new()
        };

        Ok(Self {
            spawn_rates: spawn_rates(stations, &aggregator)?,
            destinations: DestinationTable::from_records(stations, records),
            durations: DurationTable::from_records(stations, records),
            adjacency: graph::adjacency(stations, settings.incentives_max_distance),
            adjacency_user: graph::adjacency(stations, settings.user_satisfaction_max_distance),
            initial_available,
            goal,
        })
    }
}

/// Writes `params` into the regions of `model`.
pub fn inject(
    model: &str,
    stations: &[Station],
    params: &ModelParameters,
    settings: &Settings,
) -> Result<String, ParametrizeError> {
    let capacities: Vec<i32> = stations.iter().map(|s| s.capacity).collect();

    let mut regions = vec![
        ("WALKTIME", render_walk_time(settings.average_walk_time)),
        ("COOP", render_cooperation(settings.cooperation)),
        ("ADJACENCY", render_adjacency("zone_adjacency", &params.adjacency)),
        (
            "ADJACENCY2",
            render_adjacency("zone_adjacency_2", &params.adjacency_user),
        ),
        ("CAPACITIES", render_int_list("const capacity = ", &capacities)),
        (
            "AVAIL",
            render_int_list("attrib is_avail := ", &params.initial_available),
        ),
        ("GOAL", render_int_list("const available_goal = ", &params.goal)),
        ("RETURN", render_return_matrix(stations.len())),
        ("DUR", render_durations(stations, &params.durations)),
        (
            "STATIONS",
            render_stations(stations, &params.initial_available),
        ),
    ];
    if settings.refresh_destinations {
        regions.push(("DEST", render_destinations(stations, &params.destinations)));
    }
    regions.push(("SPAWNRATE", render_spawn_rates(stations, &params.spawn_rates)));

    let mut text = model.to_string();
    for (name, body) in regions {
        debug!(region = name, bytes = body.len(), "Injecting region");
        text = replace_region(&text, name, &body)?;
    }
    Ok(text)
}
