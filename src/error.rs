//! Typed failures of the pipeline's library layer.

use thiserror::Error;

/// Per-station failures of the flow aggregation and fill-level search.
///
/// The optimal batch never aborts on these; it records them as diagnostics
/// next to the best-effort value it falls back to.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StationError {
    /// The dataset has no observation day, so hourly means are undefined.
    #[error("station {station}: dataset has no observation days")]
    MissingStationData { station: String },

    #[error("station {station}: invalid capacity {capacity}")]
    InvalidCapacity { station: String, capacity: i32 },

    /// The search gave up after oscillating between starvation and overflow.
    #[error(
        "station {station}: search did not converge, best effort {fill_level} at {percent:.2} of capacity"
    )]
    NonConvergentSearch {
        station: String,
        fill_level: i32,
        percent: f64,
    },
}

/// Problems with individual rows of the input CSVs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("unparseable timestamp {0:?}")]
    Timestamp(String),

    #[error("station {station}: available {available} outside [0, {capacity}]")]
    AvailabilityOutOfRange {
        station: String,
        available: i32,
        capacity: i32,
    },
}

/// Failures while injecting parameters into the model source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParametrizeError {
    #[error("model region {0} is missing its START/END markers")]
    MissingMarker(String),

    #[error("station {0} has no optimal fill level")]
    MissingOptimal(String),
}

/// Failures of an external tool invocation.
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}
