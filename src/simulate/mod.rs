//! Invocation of the external simulator and formula evaluator.

mod process;
mod runner;

pub use process::ProcessRunner;
pub use runner::{ToolOutput, ToolRunner};

use anyhow::Result;
use std::path::Path;
use tracing::{debug, info};

use crate::config::{ExternalTool, Settings};

/// Values substituted into the `{name}` placeholders of a tool's arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolVars {
    pub experiment: String,
    pub nthreads: u32,
    pub seed: u64,
    pub replications: u32,
}

impl ToolVars {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            experiment: settings.experiment_file.display().to_string(),
            nthreads: settings.nthreads,
            seed: settings.simulation_seed,
            replications: settings.replications,
        }
    }
}

pub fn expand_args(args: &[String], vars: &ToolVars) -> Vec<String> {
    args.iter()
        .map(|arg| {
            arg.replace("{experiment}", &vars.experiment)
                .replace("{nthreads}", &vars.nthreads.to_string())
                .replace("{seed}", &vars.seed.to_string())
                .replace("{replications}", &vars.replications.to_string())
        })
        .collect()
}

/// Runs `tool` with expanded arguments and logs what it printed.
#[tracing::instrument(skip(runner, vars), fields(program = %tool.program))]
pub async fn run_tool<R: ToolRunner>(
    runner: &R,
    tool: &ExternalTool,
    vars: &ToolVars,
    cwd: Option<&Path>,
) -> Result<ToolOutput> {
    let args = expand_args(&tool.args, vars);
    info!(args = ?args, "Starting external tool");

    let start = std::time::Instant::now();
    let output = runner.run(&tool.program, &args, cwd).await?;

    debug!(stdout = %output.stdout, stderr = %output.stderr, "Tool output");
    info!(elapsed_secs = start.elapsed().as_secs(), "External tool finished");
    Ok(output)
}

/// Runs the simulator on the experiment file.
pub async fn simulate<R: ToolRunner>(runner: &R, settings: &Settings, cwd: Option<&Path>) -> Result<ToolOutput> {
    run_tool(runner, &settings.simulator, &ToolVars::from_settings(settings), cwd).await
}

/// Runs the formula evaluator on the simulation traces.
pub async fn evaluate<R: ToolRunner>(runner: &R, settings: &Settings, cwd: Option<&Path>) -> Result<ToolOutput> {
    run_tool(
        runner,
        &settings.formula_evaluator,
        &ToolVars::from_settings(settings),
        cwd,
    )
    .await
}
