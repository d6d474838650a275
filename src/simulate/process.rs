use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

use super::runner::{ToolOutput, ToolRunner};
use crate::error::SimulatorError;

/// Spawns tools as child processes of the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<ToolOutput, SimulatorError> {
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|source| SimulatorError::Spawn {
            program: program.to_string(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(SimulatorError::Failed {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr,
            });
        }
        Ok(ToolOutput { stdout, stderr })
    }
}
