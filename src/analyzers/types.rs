//! Data types produced by the analysis stages.

use serde::{Deserialize, Serialize};

use crate::analyzers::flow::HOURS;
use crate::analyzers::search::SearchOutcome;

/// One row of `optimals.csv`: the fill level chosen for a station and how it was found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationOptimal {
    pub station_name: String,
    pub capacity: i32,
    pub optimal: i32,
    /// `None` when the search could not run at all.
    pub outcome: Option<SearchOutcome>,
    pub percent: Option<f64>,
    pub iterations: u32,
    pub diagnostic: Option<String>,
}

/// A single row of a simulator result file.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SimulatedSample {
    /// Simulation time in minutes.
    pub time: f64,
    pub value: f64,
    pub stddev: f64,
    pub stderr: f64,
}

/// Simulated, reconstructed and spread values of one hour at one station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourComparison {
    pub hour: usize,
    pub simulated: f64,
    pub confidence: f64,
    pub training: f64,
    pub training_variance: f64,
    pub validation: f64,
    pub validation_variance: f64,
}

/// Validation outcome for one station.
#[derive(Debug, Clone, PartialEq)]
pub struct StationValidation {
    pub station_name: String,
    pub result_file: String,
    pub validation_mse: f64,
    pub training_mse: f64,
    pub hours: Vec<HourComparison>,
}

/// Max, min, mean and median of a set of errors.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ErrorSummary {
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    pub median: f64,
}

/// Largest and mean 99% confidence half-width over all result files.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ConfidenceSummary {
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub stations: Vec<StationValidation>,
    pub validation: ErrorSummary,
    pub training: ErrorSummary,
    pub confidence: ConfidenceSummary,
}

pub type HourlySeries = [f64; HOURS];
