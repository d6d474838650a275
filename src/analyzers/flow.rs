//! Hourly departure/arrival flows per station.
//!
//! Trips are bucketed into whole hours and left-joined onto an observation
//! grid: every hour between the first and the last departure of the dataset,
//! restricted to the calendar days on which any trip started. Hours without
//! a matching trip count as zero. The grid is then reduced per hour-of-day
//! into a mean or a sample variance across days.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::analyzers::utility::{mean, sample_variance};
use crate::error::StationError;
use crate::parser::TripRecord;

pub const HOURS: usize = 24;

/// How the per-day counts of one hour-of-day are reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatistic {
    #[default]
    Mean,
    Variance,
}

/// Which arrivals are counted for a station.
///
/// `ExcludeOvernight` drops trips that end on a later day than they started.
/// Departures are never filtered this way, so the two directions are not
/// symmetric under this policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalPolicy {
    ExcludeOvernight,
    IncludeAll,
}

impl ArrivalPolicy {
    pub fn from_flag(exclude_overnight: bool) -> Self {
        if exclude_overnight {
            ArrivalPolicy::ExcludeOvernight
        } else {
            ArrivalPolicy::IncludeAll
        }
    }
}

/// Departures and arrivals per hour-of-day for a single station.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyFlowTable {
    pub departures: [f64; HOURS],
    pub arrivals: [f64; HOURS],
}

impl HourlyFlowTable {
    pub fn zero() -> Self {
        Self {
            departures: [0.0; HOURS],
            arrivals: [0.0; HOURS],
        }
    }

    /// Arrivals minus departures for every hour.
    pub fn net(&self) -> [f64; HOURS] {
        std::array::from_fn(|h| self.arrivals[h] - self.departures[h])
    }
}

/// Truncates a timestamp to the start of its hour.
pub fn floor_hour(dt: NaiveDateTime) -> NaiveDateTime {
    dt.date()
        .and_hms_opt(dt.hour(), 0, 0)
        .unwrap_or(dt)
}

/// The hourly slots a dataset was observed in.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationGrid {
    slots: Vec<NaiveDateTime>,
    days: BTreeSet<NaiveDate>,
}

impl ObservationGrid {
    pub fn from_records(records: &[TripRecord]) -> Self {
        let days: BTreeSet<NaiveDate> = records.iter().map(TripRecord::start_date).collect();

        let first = records.iter().map(|r| r.started_at).min();
        let last = records.iter().map(|r| r.started_at).max();

        let mut slots = Vec::new();
        if let (Some(first), Some(last)) = (first, last) {
            let end = floor_hour(last);
            let mut slot = floor_hour(first);
            while slot <= end {
                if days.contains(&slot.date()) {
                    slots.push(slot);
                }
                slot += Duration::hours(1);
            }
        }

        Self { slots, days }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn days(&self) -> &BTreeSet<NaiveDate> {
        &self.days
    }

    pub fn slots(&self) -> &[NaiveDateTime] {
        &self.slots
    }

    /// Left-joins `counts` onto the grid and reduces each hour-of-day.
    fn reduce(
        &self,
        counts: &HashMap<NaiveDateTime, u32>,
        statistic: FlowStatistic,
    ) -> [f64; HOURS] {
        let mut per_hour: [Vec<f64>; HOURS] = std::array::from_fn(|_| Vec::new());
        for slot in &self.slots {
            let count = counts.get(slot).copied().unwrap_or(0);
            per_hour[slot.hour() as usize].push(count as f64);
        }

        std::array::from_fn(|h| {
            let values = &per_hour[h];
            let avg = mean(values);
            match statistic {
                FlowStatistic::Mean => avg,
                FlowStatistic::Variance => sample_variance(values, avg),
            }
        })
    }
}

/// Computes hourly flow tables for stations of one dataset.
///
/// The observation grid is built once and shared by every station.
pub struct FlowAggregator<'a> {
    records: &'a [TripRecord],
    grid: ObservationGrid,
    policy: ArrivalPolicy,
}

impl<'a> FlowAggregator<'a> {
    pub fn new(records: &'a [TripRecord], policy: ArrivalPolicy) -> Self {
        Self {
            records,
            grid: ObservationGrid::from_records(records),
            policy,
        }
    }

    pub fn grid(&self) -> &ObservationGrid {
        &self.grid
    }

    /// Hourly departures and arrivals of `station`.
    ///
    /// A station without trips yields an all-zero table; a dataset without
    /// any observation day yields [`StationError::MissingStationData`].
    pub fn station_flows(
        &self,
        station: &str,
        statistic: FlowStatistic,
    ) -> Result<HourlyFlowTable, StationError> {
        if self.grid.is_empty() {
            return Err(StationError::MissingStationData {
                station: station.to_string(),
            });
        }

        let mut departures: HashMap<NaiveDateTime, u32> = HashMap::new();
        let mut arrivals: HashMap<NaiveDateTime, u32> = HashMap::new();

        for record in self.records {
            if record.start_station_name == station {
                *departures.entry(floor_hour(record.started_at)).or_default() += 1;
            }
            if record.end_station_name == station {
                if self.policy == ArrivalPolicy::ExcludeOvernight && record.is_overnight() {
                    continue;
                }
                *arrivals.entry(floor_hour(record.ended_at)).or_default() += 1;
            }
        }

        Ok(HourlyFlowTable {
            departures: self.grid.reduce(&departures, statistic),
            arrivals: self.grid.reduce(&arrivals, statistic),
        })
    }

    /// Mean departures per hour-of-day across all stations.
    pub fn total_departures(&self) -> [f64; HOURS] {
        let mut counts: HashMap<NaiveDateTime, u32> = HashMap::new();
        for record in self.records {
            *counts.entry(floor_hour(record.started_at)).or_default() += 1;
        }
        self.grid.reduce(&counts, FlowStatistic::Mean)
    }
}
