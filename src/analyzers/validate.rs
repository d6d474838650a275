//! Comparison of simulated availability against reconstructed trajectories.
//!
//! The simulator writes one `Available...sid=<i>...csv` file per station into
//! a timestamped subdirectory of the results folder. The newest of those is
//! sampled once per hour and compared with the trajectories reconstructed
//! from the training and the held-out validation records.

use anyhow::{Context, Result, anyhow, bail};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::analyzers::flow::{ArrivalPolicy, FlowAggregator, FlowStatistic, HOURS};
use crate::analyzers::trajectory::reconstruct;
use crate::analyzers::types::{
    ConfidenceSummary, ErrorSummary, HourComparison, HourlySeries, SimulatedSample,
    StationValidation, ValidationReport,
};
use crate::analyzers::utility::{mean, median};
use crate::parser::{Station, TripRecord};

/// z value of a two-sided 99% confidence interval.
pub const Z_99: f64 = 2.576;

/// Lexicographically greatest subdirectory of `results_dir`.
pub fn latest_results_dir(results_dir: &Path) -> Result<PathBuf> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(results_dir)
        .with_context(|| format!("listing {}", results_dir.display()))?
    {
        let entry = entry?;
        if entry.path().is_dir() {
            dirs.push(entry.file_name());
        }
    }
    dirs.sort();
    let newest = dirs
        .pop()
        .ok_or_else(|| anyhow!("no results in {}", results_dir.display()))?;
    Ok(results_dir.join(newest))
}

/// Names of the per-station availability files in `dir`, sorted.
pub fn availability_files(dir: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.starts_with("Available") && name.ends_with(".csv") {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

/// File holding the availability of station `index`.
///
/// `sid=1` must not match `sid=12`, so the id has to be followed by a non-digit.
pub fn find_station_file(files: &[String], index: usize) -> Option<&str> {
    let needle = format!("sid={index}");
    files
        .iter()
        .find(|name| {
            name.match_indices(&needle).any(|(pos, _)| {
                !name[pos + needle.len()..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_digit())
            })
        })
        .map(String::as_str)
}

/// Reads a `;`-separated simulator result file without header.
///
/// Only the first four columns are used; anything after them is ignored.
pub fn load_simulated(path: &Path) -> Result<Vec<SimulatedSample>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut samples = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("reading {}", path.display()))?;
        let field = |i: usize| -> Result<f64> {
            let raw = record
                .get(i)
                .ok_or_else(|| anyhow!("{}:{}: missing column {i}", path.display(), line + 1))?;
            raw.trim()
                .parse::<f64>()
                .with_context(|| format!("{}:{}: bad number {raw:?}", path.display(), line + 1))
        };
        samples.push(SimulatedSample {
            time: field(0)?,
            value: field(1)?,
            stddev: field(2)?,
            stderr: field(3)?,
        });
    }
    Ok(samples)
}

/// Picks one sample per hour from a series with `samples + 1` rows.
///
/// Hour `h` takes row `h * step` after sorting by time, clamped to the last row.
pub fn hourly_samples(series: &[SimulatedSample], samples: u32) -> Result<[SimulatedSample; HOURS]> {
    if series.is_empty() {
        bail!("simulated series is empty");
    }
    let mut sorted = series.to_vec();
    sorted.sort_by(|a, b| a.time.total_cmp(&b.time));

    let step = ((samples as usize + 1) / HOURS).max(1);
    let last = sorted.len() - 1;
    Ok(std::array::from_fn(|h| sorted[(h * step).min(last)]))
}

/// Mean squared difference over the hours of a day.
pub fn mse(reference: &HourlySeries, simulated: &HourlySeries) -> f64 {
    reference
        .iter()
        .zip(simulated)
        .map(|(r, s)| (r - s).powi(2))
        .sum::<f64>()
        / HOURS as f64
}

pub fn summarize(errors: &[f64]) -> ErrorSummary {
    if errors.is_empty() {
        return ErrorSummary::default();
    }
    ErrorSummary {
        max: errors.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        min: errors.iter().copied().fold(f64::INFINITY, f64::min),
        mean: mean(errors),
        median: median(errors),
    }
}

/// 99% confidence half-widths of every row.
pub fn confidence_intervals(series: &[SimulatedSample]) -> Vec<f64> {
    series.iter().map(|s| Z_99 * s.stderr).collect()
}

/// Largest per-file maximum and mean of per-file means.
pub fn summarize_confidence(all: &[Vec<SimulatedSample>]) -> ConfidenceSummary {
    let mut maxima = Vec::new();
    let mut means = Vec::new();
    for series in all.iter().filter(|s| !s.is_empty()) {
        let intervals = confidence_intervals(series);
        maxima.push(intervals.iter().copied().fold(f64::NEG_INFINITY, f64::max));
        means.push(mean(&intervals));
    }
    if maxima.is_empty() {
        return ConfidenceSummary::default();
    }
    ConfidenceSummary {
        max: maxima.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean: mean(&means),
    }
}

/// Availability trajectory and its per-hour spread for one dataset.
struct Reference<'a> {
    aggregator: FlowAggregator<'a>,
}

impl<'a> Reference<'a> {
    fn new(records: &'a [TripRecord], policy: ArrivalPolicy) -> Self {
        Self {
            aggregator: FlowAggregator::new(records, policy),
        }
    }

    fn trajectory(&self, station: &Station) -> Result<(HourlySeries, HourlySeries)> {
        let flows = self
            .aggregator
            .station_flows(&station.name, FlowStatistic::Mean)?;
        let spread = self
            .aggregator
            .station_flows(&station.name, FlowStatistic::Variance)?;
        let trajectory = reconstruct(station.available as f64, &flows.net());
        // spread is the sum of both variances, not their difference
        let variance = std::array::from_fn(|h| spread.departures[h] + spread.arrivals[h]);
        Ok((trajectory, variance))
    }
}

/// Validates every station against the newest simulation results.
pub fn validate(
    stations: &[Station],
    training: &[TripRecord],
    validation: &[TripRecord],
    results_dir: &Path,
    samples: u32,
    policy: ArrivalPolicy,
) -> Result<ValidationReport> {
    let newest = latest_results_dir(results_dir)?;
    let files = availability_files(&newest)?;
    info!(dir = %newest.display(), files = files.len(), "Validating simulation results");

    let training_ref = Reference::new(training, policy);
    let validation_ref = Reference::new(validation, policy);

    let mut rows = Vec::with_capacity(stations.len());
    for (index, station) in stations.iter().enumerate() {
        let Some(file) = find_station_file(&files, index) else {
            warn!(station = %station.name, index, "No simulation result for station");
            continue;
        };
        let series = load_simulated(&newest.join(file))?;
        let hourly = hourly_samples(&series, samples)
            .with_context(|| format!("sampling {file}"))?;
        let simulated: HourlySeries = std::array::from_fn(|h| hourly[h].value);

        let (train, train_var) = training_ref.trajectory(station)?;
        let (valid, valid_var) = validation_ref.trajectory(station)?;

        let row = StationValidation {
            station_name: station.name.clone(),
            result_file: file.to_string(),
            validation_mse: mse(&valid, &simulated),
            training_mse: mse(&train, &simulated),
            hours: (0..HOURS)
                .map(|h| HourComparison {
                    hour: h,
                    simulated: simulated[h],
                    confidence: Z_99 * hourly[h].stderr,
                    training: train[h],
                    training_variance: train_var[h],
                    validation: valid[h],
                    validation_variance: valid_var[h],
                })
                .collect(),
        };
        debug!(
            station = %row.station_name,
            validation_mse = row.validation_mse,
            training_mse = row.training_mse,
            "Station validated"
        );
        rows.push(row);
    }

    let mut all_series = Vec::with_capacity(files.len());
    for file in &files {
        all_series.push(load_simulated(&newest.join(file))?);
    }

    let validation_errors: Vec<f64> = rows.iter().map(|r| r.validation_mse).collect();
    let training_errors: Vec<f64> = rows.iter().map(|r| r.training_mse).collect();

    Ok(ValidationReport {
        validation: summarize(&validation_errors),
        training: summarize(&training_errors),
        confidence: summarize_confidence(&all_series),
        stations: rows,
    })
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(15);
        let sections: [(&str, fn(&StationValidation) -> f64, &ErrorSummary); 2] = [
            ("Validation", |r| r.validation_mse, &self.validation),
            ("Training", |r| r.training_mse, &self.training),
        ];
        for (title, error, summary) in sections {
            writeln!(f, "{rule}")?;
            writeln!(f, "Mean Squared Error: {title}")?;
            writeln!(f, "{rule}")?;
            for row in &self.stations {
                writeln!(f, "{}: {}", row.station_name, error(row))?;
            }
            writeln!(f)?;
            writeln!(f, "max mse: {}", summary.max)?;
            writeln!(f, "min mse: {}", summary.min)?;
            writeln!(f, "avg mse: {}", summary.mean)?;
            writeln!(f, "median mse: {}", summary.median)?;
        }
        writeln!(f, "{rule}")?;
        writeln!(f, "99% confidence")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "max: {}", self.confidence.max)?;
        writeln!(f, "mean: {}", self.confidence.mean)
    }
}
