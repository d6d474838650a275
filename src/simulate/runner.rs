use async_trait::async_trait;
use std::path::Path;

use crate::error::SimulatorError;

/// Captured result of a finished tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external program to completion.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<ToolOutput, SimulatorError>;
}
