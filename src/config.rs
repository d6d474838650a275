//! Pipeline settings loaded from `settings.json`.
//!
//! Every field has a default, so a partial settings file (or none at all)
//! still yields a usable [`Settings`]. Field names match the keys the study's
//! experiment plans already use.

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Parameters of the optimal fill-level search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Bikes kept free of both the empty and the full boundary.
    pub margin: i32,
    /// Fraction of capacity the search starts from.
    pub initial_fraction: f64,
    /// Change of the fraction per search step.
    pub step: f64,
    /// Direction changes tolerated before the search gives up.
    pub max_oscillations: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            margin: 4,
            initial_fraction: 0.45,
            step: 0.05,
            max_oscillations: 4,
        }
    }
}

impl SearchConfig {
    /// Fraction of capacity after `steps` net steps from the initial fraction.
    pub fn percent_at(&self, steps: i32) -> f64 {
        self.initial_fraction + steps as f64 * self.step
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.margin >= 0, "search margin must be non-negative");
        ensure!(self.step > 0.0, "search step must be positive");
        ensure!(
            (0.0..=1.0).contains(&self.initial_fraction),
            "initial fraction must lie in [0, 1]"
        );
        ensure!(self.max_oscillations > 0, "max_oscillations must be at least 1");
        Ok(())
    }
}

/// An external program plus its argument template.
///
/// Arguments may contain the placeholders `{nthreads}`, `{seed}`,
/// `{replications}` and `{experiment}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTool {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name of the experiment; only meaningful inside a plan.
    pub name: Option<String>,
    pub verbose: bool,
    pub output_dir: PathBuf,

    // inputs of the cleaning stage
    pub historic_data_location: PathBuf,
    pub stations_data_location: PathBuf,

    // working files shared between stages
    pub stations_file: PathBuf,
    pub records_file: PathBuf,
    pub validation_records_file: PathBuf,
    pub model_file: PathBuf,
    pub experiment_file: PathBuf,
    pub results_dir: PathBuf,

    // cleaning
    pub needs_cleaning: bool,
    pub weekdays_only: bool,
    pub duration_min_quantile: f64,
    pub duration_max_quantile: f64,
    pub station_usage_threshold: usize,
    pub split_seed: u64,

    // flows and optimal search
    pub exclude_overnight_arrivals: bool,
    pub search: SearchConfig,

    // parametrization
    pub use_optimals: bool,
    pub average_walk_time: f64,
    pub cooperation: f64,
    pub incentives_max_distance: f64,
    pub user_satisfaction_max_distance: f64,
    pub refresh_destinations: bool,

    // simulation
    pub replications: u32,
    pub simulation_end_time: f64,
    pub samples: u32,
    pub nthreads: u32,
    pub simulation_seed: u64,
    pub simulator: ExternalTool,
    pub formula_evaluator: ExternalTool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: None,
            verbose: false,
            output_dir: PathBuf::from("results_graphs"),
            historic_data_location: PathBuf::from("data/records_aug.csv"),
            stations_data_location: PathBuf::from("data/stations_aug.csv"),
            stations_file: PathBuf::from("stations.csv"),
            records_file: PathBuf::from("records.csv"),
            validation_records_file: PathBuf::from("records_validation.csv"),
            model_file: PathBuf::from("model.carma"),
            experiment_file: PathBuf::from("experiment.exp"),
            results_dir: PathBuf::from("results"),
            needs_cleaning: true,
            weekdays_only: true,
            duration_min_quantile: 0.0,
            duration_max_quantile: 1.0,
            station_usage_threshold: 0,
            split_seed: 0,
            exclude_overnight_arrivals: true,
            search: SearchConfig::default(),
            use_optimals: false,
            average_walk_time: 5.0,
            cooperation: 0.0,
            incentives_max_distance: 500.0,
            user_satisfaction_max_distance: 500.0,
            refresh_destinations: true,
            replications: 10,
            simulation_end_time: 1440.0,
            samples: 1439,
            nthreads: 4,
            simulation_seed: 0,
            simulator: ExternalTool {
                program: "java".to_string(),
                args: [
                    "-jar",
                    "CARMA-CL.jar",
                    "{experiment}",
                    "-m",
                    "{nthreads}",
                    "-q",
                    "-seed",
                    "{seed}",
                ]
                .map(String::from)
                .to_vec(),
            },
            formula_evaluator: ExternalTool {
                program: "java".to_string(),
                args: [
                    "-Duser.country=UK",
                    "-Duser.language=en",
                    "-jar",
                    "jSSTLEvalMulti.jar",
                    "{replications}",
                ]
                .map(String::from)
                .to_vec(),
            },
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let settings = Self::from_json(&content)
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        info!(path = %path.display(), name = ?settings.name, "Settings loaded");
        Ok(settings)
    }

    /// Loads settings from `path`, or falls back to the defaults if the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No settings file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        ensure!(
            0.0 <= self.duration_min_quantile
                && self.duration_min_quantile <= self.duration_max_quantile
                && self.duration_max_quantile <= 1.0,
            "duration quantiles must satisfy 0 <= min <= max <= 1"
        );
        ensure!(
            (0.0..=1.0).contains(&self.cooperation),
            "cooperation must lie in [0, 1]"
        );
        ensure!(self.average_walk_time > 0.0, "average_walk_time must be positive");
        Ok(())
    }

    /// Writes the settings as pretty JSON, e.g. into a planned experiment folder.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing settings to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_search_config() {
        let config = SearchConfig::default();
        assert_eq!(config.margin, 4);
        assert_eq!(config.initial_fraction, 0.45);
        assert_eq!(config.step, 0.05);
        assert_eq!(config.max_oscillations, 4);
    }

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings = Settings::from_json(r#"{"use_optimals": true, "search": {"margin": 3}}"#).unwrap();
        assert!(settings.use_optimals);
        assert_eq!(settings.search.margin, 3);
        assert_eq!(settings.search.initial_fraction, 0.45);
        assert_eq!(settings.stations_file, PathBuf::from("stations.csv"));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let settings = Settings::from_json(r#"{"use_truck": false, "incentives": "none"}"#).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_invalid_step_rejected() {
        assert!(Settings::from_json(r#"{"search": {"step": 0.0}}"#).is_err());
    }

    #[test]
    fn test_invalid_quantiles_rejected() {
        let json = r#"{"duration_min_quantile": 0.9, "duration_max_quantile": 0.1}"#;
        assert!(Settings::from_json(json).is_err());
    }

    #[test]
    fn test_percent_at() {
        let config = SearchConfig::default();
        assert_eq!(config.percent_at(0), 0.45);
        assert!((config.percent_at(2) - 0.55).abs() < 1e-12);
        assert!((config.percent_at(-9) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            name: Some("baseline".to_string()),
            split_seed: 7,
            ..Settings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let settings = Settings::load_or_default("/nonexistent/settings.json").unwrap();
        assert_eq!(settings, Settings::default());
    }
}
