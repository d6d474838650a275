//! CLI entry point for the bike-sharing study pipeline.
//!
//! Provides one subcommand per pipeline stage, `run` for all stages in
//! order and `plan` for a series of experiments.

use anyhow::Result;
use bss_pipeline::config::Settings;
use bss_pipeline::pipeline::{Pipeline, run_plan};
use bss_pipeline::simulate::ProcessRunner;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bss_pipeline")]
#[command(about = "Data pipeline for the bike-sharing simulation study", long_about = None)]
struct Cli {
    /// Settings file; missing keys take their defaults
    #[arg(short, long, global = true, default_value = "settings.json")]
    settings: PathBuf,

    /// Directory all relative paths are resolved against
    #[arg(short = 'C', long, global = true, default_value = ".")]
    workdir: PathBuf,

    /// Log debug output to stderr
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean the raw exports into stations, training and validation records
    Clean,
    /// Write dataset statistics and per-station trip counts
    Analyse,
    /// Compute the optimal fill level of every station
    Optimals,
    /// Inject the derived parameters into the model and write the experiment
    Parametrize,
    /// Run the external simulator
    Simulate,
    /// Compare the newest simulation results with the records
    Validate,
    /// Run the external formula evaluator
    Evaluate,
    /// Run all stages in order
    Run,
    /// Run every experiment of a plan
    Plan {
        /// JSON array of named settings
        #[arg(value_name = "PLAN", default_value = "plan.json")]
        plan: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::load_or_default(cli.workdir.join(&cli.settings))?;
    let verbose = cli.verbose || settings.verbose;

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/bss_pipeline.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bss_pipeline.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_level = if verbose { "debug" } else { "info" };
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive(stderr_level.parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    info!(settings = %cli.settings.display(), name = ?settings.name, "Settings ready");

    let runner = ProcessRunner::new();
    let pipeline = Pipeline::new(settings, &cli.workdir);

    match cli.command {
        Commands::Clean => {
            let report = pipeline.clean()?;
            info!(
                training = report.training_trips,
                validation = report.validation_trips,
                "Cleaned datasets written"
            );
        }
        Commands::Analyse => {
            pipeline.analyse()?;
        }
        Commands::Optimals => {
            pipeline.optimals()?;
        }
        Commands::Parametrize => {
            pipeline.parametrize()?;
        }
        Commands::Simulate => {
            pipeline.simulate(&runner).await?;
        }
        Commands::Validate => {
            pipeline.validate()?;
        }
        Commands::Evaluate => {
            pipeline.evaluate(&runner).await?;
        }
        Commands::Run => {
            pipeline.run_all(&runner).await?;
        }
        Commands::Plan { plan } => {
            let failed = run_plan(&cli.workdir, &plan, &runner).await?;
            if failed.is_empty() {
                info!("All planned experiments finished");
            } else {
                warn!(failed = ?failed, "Some planned experiments failed");
            }
        }
    }

    Ok(())
}
