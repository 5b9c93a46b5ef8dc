use crate::executor::runner::RawRun;
use crate::registry::Transport;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Uniform record of one external invocation, JSON-ready for embedding in a
/// dispatch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutput {
    pub transport: Transport,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

impl ExecutionOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Best-effort structured view of stdout; anything that is not a single JSON
/// document stays raw.
pub fn parse_stdout_json(stdout: &str) -> Option<Value> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

pub fn build_output(transport: Transport, run: RawRun, workspace: Option<&Path>) -> ExecutionOutput {
    let parsed_output = parse_stdout_json(&run.stdout);
    ExecutionOutput {
        transport,
        exit_code: run.exit_code,
        stdout: run.stdout,
        stderr: run.stderr,
        parsed_output,
        workspace: workspace.map(|path| path.display().to_string()),
    }
}
