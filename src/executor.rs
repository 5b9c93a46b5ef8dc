use std::path::Path;

pub mod output;
pub mod runner;
pub mod transport;
pub mod workspace;

pub use output::{parse_stdout_json, ExecutionOutput};
pub use runner::{run_executable, RawRun, RunRequest};
pub use transport::{execute, ExecutionReport};
pub use workspace::{create_workspace, message_document, write_input, MessageDocument};

/// Deadline applied when neither the caller nor the destination sets one.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("destination `{destination}` declares no external executable")]
    MissingExecutable { destination: String },
    #[error("executable `{path}` is not available")]
    ExecutableUnavailable { path: String },
    #[error("destination `{destination}` declares no http endpoint")]
    MissingEndpoint { destination: String },
    #[error("subprocess timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode input for {path}: {source}")]
    EncodeYaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to encode envelope payload: {source}")]
    EncodeJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("http post to {endpoint} failed: {detail}")]
    Http { endpoint: String, detail: String },
}

pub(crate) fn io_error(path: &Path, source: std::io::Error) -> ExecutorError {
    ExecutorError::Io {
        path: path.display().to_string(),
        source,
    }
}
