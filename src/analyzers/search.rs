//! Optimal initial fill level of a station.
//!
//! Hill climbing over the initial fill fraction: a trajectory that drops
//! below the margin pushes the fraction up, one that exceeds
//! `capacity - margin` pushes it down. Every change of direction counts as an
//! oscillation; the search gives up after `max_oscillations` of them or as
//! soon as the fraction leaves `[0, 1]`.

use serde::Serialize;
use std::fmt;
use tracing::trace;

use crate::analyzers::flow::HOURS;
use crate::analyzers::trajectory::reconstruct;
use crate::config::SearchConfig;
use crate::error::StationError;
use crate::parser::Station;

/// How a search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOutcome {
    /// The trajectory stays inside the band.
    Converged,
    /// The fraction left `[0, 1]`; the level is `0` or `capacity - 1`.
    BoundaryClamped,
    /// The search hunted between both constraints and stopped.
    OscillationAbandoned,
}

impl fmt::Display for SearchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchOutcome::Converged => "converged",
            SearchOutcome::BoundaryClamped => "boundary_clamped",
            SearchOutcome::OscillationAbandoned => "oscillation_abandoned",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchResult {
    /// Initial bikes, always within `[0, capacity - 1]`.
    pub fill_level: i32,
    pub outcome: SearchOutcome,
    /// Fraction of capacity the search ended on.
    pub percent: f64,
    pub iterations: u32,
}

impl SearchResult {
    pub fn is_converged(&self) -> bool {
        self.outcome == SearchOutcome::Converged
    }

    /// The fill level, or [`StationError::NonConvergentSearch`] if the search
    /// was abandoned while oscillating.
    pub fn converged_level(&self, station: &str) -> Result<i32, StationError> {
        match self.outcome {
            SearchOutcome::OscillationAbandoned => Err(StationError::NonConvergentSearch {
                station: station.to_string(),
                fill_level: self.fill_level,
                percent: self.percent,
            }),
            _ => Ok(self.fill_level),
        }
    }
}

fn level_at(capacity: i32, percent: f64) -> i32 {
    ((capacity as f64 * percent).round() as i32).clamp(0, capacity - 1)
}

/// Searches the initial fill level of `station` for the given hourly net flow.
pub fn optimal_fill_level(
    station: &Station,
    net: &[f64; HOURS],
    config: &SearchConfig,
) -> Result<SearchResult, StationError> {
    let capacity = station.capacity;
    if capacity <= 0 {
        return Err(StationError::InvalidCapacity {
            station: station.name.clone(),
            capacity,
        });
    }
    debug_assert!(config.step > 0.0, "search step must be positive");

    let floor = config.margin as f64;
    let ceiling = (capacity - config.margin) as f64;

    let mut steps = 0i32;
    let mut up = false;
    let mut oscillations = 0u32;
    let mut iterations = 0u32;

    loop {
        iterations += 1;
        let last_up = up;
        let percent = config.percent_at(steps);
        let start = level_at(capacity, percent) as f64;
        let trajectory = reconstruct(start, net);
        trace!(station = %station.name, percent, start, "search step");

        if trajectory.iter().any(|&v| v < floor) {
            steps += 1;
            up = true;
            if !last_up {
                oscillations += 1;
            }
        } else if trajectory.iter().any(|&v| v > ceiling) {
            steps -= 1;
            up = false;
            if last_up {
                oscillations += 1;
            }
        } else {
            return Ok(SearchResult {
                fill_level: level_at(capacity, percent),
                outcome: SearchOutcome::Converged,
                percent,
                iterations,
            });
        }

        let percent = config.percent_at(steps);
        if percent < 0.0 {
            return Ok(SearchResult {
                fill_level: 0,
                outcome: SearchOutcome::BoundaryClamped,
                percent,
                iterations,
            });
        }
        if percent > 1.0 {
            return Ok(SearchResult {
                fill_level: capacity - 1,
                outcome: SearchOutcome::BoundaryClamped,
                percent,
                iterations,
            });
        }
        if oscillations >= config.max_oscillations {
            return Ok(SearchResult {
                fill_level: level_at(capacity, percent),
                outcome: SearchOutcome::OscillationAbandoned,
                percent,
                iterations,
            });
        }
    }
}
