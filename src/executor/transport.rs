use crate::dispatch::{AttemptOutcome, InvocationAttempt};
use crate::envelope::Envelope;
use crate::executor::output::{build_output, parse_stdout_json, ExecutionOutput};
use crate::executor::runner::{run_executable, RunRequest};
use crate::executor::workspace::{create_workspace, write_input};
use crate::executor::{io_error, ExecutorError};
use crate::registry::{default_flag_variants, DestinationConfig, Transport};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const EXTERNAL_STRATEGY: &str = "external";
pub const OUTPUT_DIR_NAME: &str = "out";

/// What happened across the declared transports: the first zero-exit output,
/// or the trail of failures when nothing went through.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub success: Option<ExecutionOutput>,
    pub last_output: Option<ExecutionOutput>,
    pub attempts: Vec<InvocationAttempt>,
    pub last_error: Option<ExecutorError>,
}

/// Walks the destination's transports in declared order, stopping at the
/// first invocation that exits zero (or posts 2xx).
pub fn execute(
    destination: &str,
    config: &DestinationConfig,
    envelope: &Envelope,
    timeout: Duration,
    endpoint_override: Option<&str>,
) -> ExecutionReport {
    ExecutionContext {
        destination,
        config,
        envelope,
        timeout,
        endpoint_override,
        workspace: None,
        input_file: None,
        report: ExecutionReport::default(),
    }
    .run()
}

struct ExecutionContext<'a> {
    destination: &'a str,
    config: &'a DestinationConfig,
    envelope: &'a Envelope,
    timeout: Duration,
    endpoint_override: Option<&'a str>,
    workspace: Option<PathBuf>,
    input_file: Option<PathBuf>,
    report: ExecutionReport,
}

impl ExecutionContext<'_> {
    fn run(mut self) -> ExecutionReport {
        let transports = self.config.transports.clone();
        for transport in transports {
            let outcome = match transport {
                Transport::StdinJson => self.attempt_stdin_json(),
                Transport::FileFlags => self.attempt_file_flags(),
                Transport::PositionalPath => self.attempt_positional_path(),
                Transport::HttpPost => self.attempt_http_post(),
            };
            match outcome {
                Ok(Some(output)) => {
                    self.report.success = Some(output);
                    break;
                }
                Ok(None) => {}
                Err(err) => {
                    self.record_failure(transport.as_str().to_string(), err.to_string());
                    self.report.last_error = Some(err);
                }
            }
        }
        self.report
    }

    fn require_executable(&self) -> Result<PathBuf, ExecutorError> {
        self.config
            .executable
            .clone()
            .ok_or_else(|| ExecutorError::MissingExecutable {
                destination: self.destination.to_string(),
            })
    }

    fn ensure_workspace(&mut self) -> Result<PathBuf, ExecutorError> {
        if let Some(workspace) = &self.workspace {
            return Ok(workspace.clone());
        }
        let workspace = create_workspace(self.destination)?;
        self.workspace = Some(workspace.clone());
        Ok(workspace)
    }

    fn ensure_input(&mut self) -> Result<PathBuf, ExecutorError> {
        if let Some(input) = &self.input_file {
            return Ok(input.clone());
        }
        let workspace = self.ensure_workspace()?;
        let input = write_input(&workspace, self.envelope, self.config.projection)?;
        self.input_file = Some(input.clone());
        Ok(input)
    }

    fn record_failure(&mut self, arguments_shape: String, detail: String) {
        self.report.attempts.push(InvocationAttempt {
            strategy: EXTERNAL_STRATEGY.to_string(),
            arguments_shape,
            outcome: AttemptOutcome::RaisedError,
            error_detail: Some(detail),
        });
    }

    /// One subprocess invocation. Zero exit wins; non-zero and per-run faults
    /// are recorded and skipped past; a missing binary aborts the transport.
    fn run_attempt(
        &mut self,
        transport: Transport,
        shape: String,
        executable: &Path,
        args: Vec<String>,
        stdin_payload: Option<Vec<u8>>,
        workspace: &Path,
    ) -> Result<Option<ExecutionOutput>, ExecutorError> {
        let request = RunRequest {
            executable,
            args,
            stdin_payload,
            cwd: workspace,
            timeout: self.timeout,
        };
        match run_executable(&request) {
            Ok(run) if run.exit_code == 0 => {
                Ok(Some(build_output(transport, run, Some(workspace))))
            }
            Ok(run) => {
                let output = build_output(transport, run, Some(workspace));
                self.record_failure(shape, format!("exit code {}", output.exit_code));
                self.report.last_output = Some(output);
                Ok(None)
            }
            Err(err @ ExecutorError::ExecutableUnavailable { .. }) => Err(err),
            Err(err) => {
                self.record_failure(shape, err.to_string());
                self.report.last_error = Some(err);
                Ok(None)
            }
        }
    }

    fn attempt_stdin_json(&mut self) -> Result<Option<ExecutionOutput>, ExecutorError> {
        let executable = self.require_executable()?;
        let workspace = self.ensure_workspace()?;
        let payload =
            serde_json::to_vec(self.envelope).map_err(|source| ExecutorError::EncodeJson {
                source,
            })?;
        self.run_attempt(
            Transport::StdinJson,
            Transport::StdinJson.as_str().to_string(),
            &executable,
            Vec::new(),
            Some(payload),
            &workspace,
        )
    }

    fn attempt_file_flags(&mut self) -> Result<Option<ExecutionOutput>, ExecutorError> {
        let executable = self.require_executable()?;
        let workspace = self.ensure_workspace()?;
        let input = self.ensure_input()?;
        let variants = if self.config.file_flags.is_empty() {
            default_flag_variants()
        } else {
            self.config.file_flags.clone()
        };
        for variant in variants {
            let mut args = vec![variant.input_flag.clone(), input.display().to_string()];
            if let Some(output_flag) = &variant.output_flag {
                let out_dir = workspace.join(OUTPUT_DIR_NAME);
                fs::create_dir_all(&out_dir).map_err(|err| io_error(&out_dir, err))?;
                args.push(output_flag.clone());
                args.push(out_dir.display().to_string());
            }
            args.extend(variant.extra_args.iter().cloned());
            let shape = format!("file_flags {}", variant.input_flag);
            if let Some(output) = self.run_attempt(
                Transport::FileFlags,
                shape,
                &executable,
                args,
                None,
                &workspace,
            )? {
                return Ok(Some(output));
            }
        }
        Ok(None)
    }

    fn attempt_positional_path(&mut self) -> Result<Option<ExecutionOutput>, ExecutorError> {
        let executable = self.require_executable()?;
        let workspace = self.ensure_workspace()?;
        let input = self.ensure_input()?;
        self.run_attempt(
            Transport::PositionalPath,
            Transport::PositionalPath.as_str().to_string(),
            &executable,
            vec![input.display().to_string()],
            None,
            &workspace,
        )
    }

    fn attempt_http_post(&mut self) -> Result<Option<ExecutionOutput>, ExecutorError> {
        let endpoint = self
            .endpoint_override
            .map(str::to_string)
            .or_else(|| self.config.endpoint.clone())
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ExecutorError::MissingEndpoint {
                destination: self.destination.to_string(),
            })?;
        let request = ureq::post(&endpoint).timeout(self.timeout);
        match request.send_json(self.envelope) {
            Ok(response) => {
                let body = response.into_string().unwrap_or_default();
                Ok(Some(http_output(0, body)))
            }
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                self.record_failure(
                    Transport::HttpPost.as_str().to_string(),
                    format!("http status {code}"),
                );
                self.report.last_output = Some(http_output(i32::from(code), body));
                Ok(None)
            }
            Err(err) => Err(ExecutorError::Http {
                endpoint,
                detail: err.to_string(),
            }),
        }
    }
}

fn http_output(exit_code: i32, body: String) -> ExecutionOutput {
    ExecutionOutput {
        transport: Transport::HttpPost,
        exit_code,
        parsed_output: parse_stdout_json(&body),
        stdout: body,
        stderr: String::new(),
        workspace: None,
    }
}
