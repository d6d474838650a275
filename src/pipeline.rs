//! Pipeline stages and their orchestration.
//!
//! Every stage reads its inputs from and writes its artifacts to files, so
//! stages can be run one at a time from the CLI or all in order.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::analyzers::flow::ArrivalPolicy;
use crate::analyzers::optimals::{apply_optimals, compute_optimals, count_outcome};
use crate::analyzers::search::SearchOutcome;
use crate::analyzers::types::{StationOptimal, ValidationReport};
use crate::analyzers::validate::validate;
use crate::cleaning::{CleaningReport, clean};
use crate::config::Settings;
use crate::output::{write_records, write_rows, write_stations, write_text};
use crate::parametrize::{ModelParameters, inject, render_experiment};
use crate::parser::{load_records, load_stations};
use crate::simulate::{self, ToolRunner};
use crate::stats::{DatasetKind, DatasetStats, station_flow_counts};

pub const PLAN_DIR: &str = "Planned_Experiments";

/// Settings plus the directory their relative paths are resolved against.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub settings: Settings,
    pub root: PathBuf,
}

impl Pipeline {
    pub fn new(settings: Settings, root: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            root: root.into(),
        }
    }

    /// Resolves a settings path; absolute paths are kept as they are.
    pub fn path(&self, p: impl AsRef<Path>) -> PathBuf {
        self.root.join(p)
    }

    pub fn output_path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path(&self.settings.output_dir).join(name)
    }

    fn policy(&self) -> ArrivalPolicy {
        ArrivalPolicy::from_flag(self.settings.exclude_overnight_arrivals)
    }

    #[tracing::instrument(skip_all)]
    pub fn clean(&self) -> Result<CleaningReport> {
        let s = &self.settings;
        let records = load_records(self.path(&s.historic_data_location))?;
        let stations = load_stations(self.path(&s.stations_data_location))?;

        let cleaned = clean(records, stations, s);

        write_stations(self.path(&s.stations_file), &cleaned.stations)?;
        write_records(self.path(&s.records_file), &cleaned.training)?;
        write_records(self.path(&s.validation_records_file), &cleaned.validation)?;
        Ok(cleaned.report)
    }

    #[tracing::instrument(skip_all)]
    pub fn analyse(&self) -> Result<(DatasetStats, DatasetStats)> {
        let s = &self.settings;
        let stations = load_stations(self.path(&s.stations_file))?;
        let training = load_records(self.path(&s.records_file))?;
        let validation = load_records(self.path(&s.validation_records_file))?;

        let training_stats = DatasetStats::from_records(&training, DatasetKind::Training);
        let validation_stats = DatasetStats::from_records(&validation, DatasetKind::Validation);
        info!(
            days = training_stats.days_in_set,
            trips = training_stats.total_trips,
            validation_days = validation_stats.days_in_set,
            validation_trips = validation_stats.total_trips,
            "Datasets analysed"
        );

        write_text(self.output_path("stats.txt"), &training_stats.to_string())?;
        write_text(
            self.output_path("validation_stats.txt"),
            &validation_stats.to_string(),
        )?;
        write_rows(
            self.output_path("station_flows.csv"),
            &station_flow_counts(&stations, &training),
        )?;
        Ok((training_stats, validation_stats))
    }

    /// Searches every station's optimal fill level and stores it in the stations file.
    #[tracing::instrument(skip_all)]
    pub fn optimals(&self) -> Result<Vec<StationOptimal>> {
        let s = &self.settings;
        let stations_path = self.path(&s.stations_file);
        let mut stations = load_stations(&stations_path)?;
        let records = load_records(self.path(&s.records_file))?;

        let optimals = compute_optimals(&stations, &records, self.policy(), &s.search);
        apply_optimals(&mut stations, &optimals);

        let failed = optimals.iter().filter(|o| o.diagnostic.is_some()).count();
        info!(
            stations = optimals.len(),
            converged = count_outcome(&optimals, SearchOutcome::Converged),
            clamped = count_outcome(&optimals, SearchOutcome::BoundaryClamped),
            abandoned = count_outcome(&optimals, SearchOutcome::OscillationAbandoned),
            failed,
            "Optimal fill levels computed"
        );

        write_stations(&stations_path, &stations)?;
        write_rows(self.output_path("optimals.csv"), &optimals)?;
        Ok(optimals)
    }

    /// Injects the derived parameters into the model and writes the experiment file.
    #[tracing::instrument(skip_all)]
    pub fn parametrize(&self) -> Result<ModelParameters> {
        let s = &self.settings;
        let stations = load_stations(self.path(&s.stations_file))?;
        let records = load_records(self.path(&s.records_file))?;
        let params = ModelParameters::derive(&stations, &records, s)?;

        let model_path = self.path(&s.model_file);
        let model = std::fs::read_to_string(&model_path)
            .with_context(|| format!("reading model {}", model_path.display()))?;
        let model = inject(&model, &stations, &params, s)
            .with_context(|| format!("parametrizing {}", model_path.display()))?;
        write_text(&model_path, &model)?;
        write_text(
            self.path(&s.experiment_file),
            &render_experiment(s, stations.len()),
        )?;

        info!(stations = stations.len(), model = %model_path.display(), "Model parametrized");
        Ok(params)
    }

    #[tracing::instrument(skip_all)]
    pub async fn simulate<R: ToolRunner>(&self, runner: &R) -> Result<()> {
        simulate::simulate(runner, &self.settings, Some(&self.root)).await?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub async fn evaluate<R: ToolRunner>(&self, runner: &R) -> Result<()> {
        simulate::evaluate(runner, &self.settings, Some(&self.root)).await?;
        Ok(())
    }

    /// Compares the newest simulation results with both datasets.
    #[tracing::instrument(skip_all)]
    pub fn validate(&self) -> Result<ValidationReport> {
        let s = &self.settings;
        let stations = load_stations(self.path(&s.stations_file))?;
        let training = load_records(self.path(&s.records_file))?;
        let validation = load_records(self.path(&s.validation_records_file))?;

        let report = validate(
            &stations,
            &training,
            &validation,
            &self.path(&s.results_dir),
            s.samples,
            self.policy(),
        )?;

        let dir = self.output_path("validation");
        write_text(dir.join("error.txt"), &report.to_string())?;
        for (index, station) in stations.iter().enumerate() {
            if let Some(row) = report.stations.iter().find(|r| r.station_name == station.name) {
                write_rows(dir.join(format!("{index}_available.csv")), &row.hours)?;
            }
        }

        info!(
            stations = report.stations.len(),
            validation_mean = report.validation.mean,
            training_mean = report.training.mean,
            confidence_max = report.confidence.max,
            "Validation finished"
        );
        Ok(report)
    }

    /// Runs every stage in order; cleaning is skipped unless `needs_cleaning` is set.
    #[tracing::instrument(skip_all, fields(name = ?self.settings.name))]
    pub async fn run_all<R: ToolRunner>(&self, runner: &R) -> Result<()> {
        std::fs::create_dir_all(self.output_path("validation"))?;

        if self.settings.needs_cleaning {
            self.clean()?;
        } else {
            info!("Omitting cleaning");
        }
        self.analyse()?;
        self.optimals()?;
        self.parametrize()?;
        self.simulate(runner).await?;
        self.validate()?;
        self.evaluate(runner).await?;
        Ok(())
    }
}

/// Reads a plan: a JSON array of named settings objects.
pub fn load_plan(path: impl AsRef<Path>) -> Result<Vec<Settings>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading plan {}", path.display()))?;
    let plan: Vec<Settings> = serde_json::from_str(&content)
        .with_context(|| format!("parsing plan {}", path.display()))?;

    for (i, settings) in plan.iter().enumerate() {
        if settings.name.is_none() {
            bail!("experiment {i} in {} has no name", path.display());
        }
        settings
            .validate()
            .with_context(|| format!("experiment {i} in {}", path.display()))?;
    }
    Ok(plan)
}

/// Runs every planned experiment with its own output folder under [`PLAN_DIR`].
///
/// A failing experiment is logged and the plan continues with the next one.
/// Returns the names of the experiments that failed.
#[tracing::instrument(skip(runner))]
pub async fn run_plan<R: ToolRunner>(root: &Path, plan_file: &Path, runner: &R) -> Result<Vec<String>> {
    let plan = load_plan(root.join(plan_file))?;
    let mut failed = Vec::new();

    for mut settings in plan {
        let name = settings.name.clone().unwrap_or_default();
        let folder = Path::new(PLAN_DIR).join(&name);
        std::fs::create_dir_all(root.join(&folder).join("validation"))
            .with_context(|| format!("creating {}", folder.display()))?;
        settings.save(root.join(&folder).join("settings.json"))?;

        settings.output_dir = folder.clone();
        info!(experiment = %name, output = %folder.display(), "Starting experiment");
        let pipeline = Pipeline::new(settings, root);
        match pipeline.run_all(runner).await {
            Ok(()) => info!(experiment = %name, "Experiment finished"),
            Err(e) => {
                warn!(experiment = %name, error = ?e, "Experiment failed");
                failed.push(name);
            }
        }
    }
    Ok(failed)
}
