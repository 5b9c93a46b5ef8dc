use crate::dispatch::{DispatchResult, DispatchStatus, InvocationAttempt, DRY_RUN_NOTE};
use crate::envelope::Envelope;
use crate::executor::transport::ExecutionReport;
use crate::executor::ExecutionOutput;
use crate::registry::Transport;
use crate::resolver::{CallShape, ResolvedCallable};
use serde_json::Value;

pub fn destination_not_found(destination: &str) -> DispatchResult {
    DispatchResult {
        status: DispatchStatus::Error,
        note: format!("destination not found: `{destination}`"),
        result: None,
        attempts: Vec::new(),
        preview: None,
    }
}

pub fn dry_run(envelope: &Envelope) -> DispatchResult {
    DispatchResult {
        status: DispatchStatus::Ok,
        note: DRY_RUN_NOTE.to_string(),
        result: None,
        attempts: Vec::new(),
        preview: Some(envelope.content.clone()),
    }
}

pub fn in_process_success(
    callable: &ResolvedCallable,
    shape: CallShape,
    value: Value,
) -> DispatchResult {
    DispatchResult {
        status: DispatchStatus::Ok,
        note: format!(
            "called `{}::{}` ({})",
            callable.module, callable.symbol, shape
        ),
        result: Some(value),
        attempts: Vec::new(),
        preview: None,
    }
}

pub fn internal_fault(detail: &str) -> DispatchResult {
    DispatchResult {
        status: DispatchStatus::Error,
        note: format!("internal dispatch fault: {detail}"),
        result: None,
        attempts: Vec::new(),
        preview: None,
    }
}

/// Execution output must always embed; a value that will not serialize is
/// demoted to its string rendering instead of failing the dispatch.
fn output_value(output: &ExecutionOutput) -> Value {
    serde_json::to_value(output)
        .unwrap_or_else(|err| Value::String(format!("unserializable execution output: {err}")))
}

/// Folds the executor report into the terminal result. `attempts` carries the
/// in-process convention failures recorded before falling back.
pub fn from_execution(
    destination: &str,
    report: ExecutionReport,
    mut attempts: Vec<InvocationAttempt>,
    resolution_failure: Option<String>,
) -> DispatchResult {
    let ExecutionReport {
        success,
        last_output,
        attempts: transport_attempts,
        last_error,
    } = report;
    attempts.extend(transport_attempts);

    if let Some(output) = success {
        return DispatchResult {
            status: DispatchStatus::Ok,
            note: format!("executed `{destination}` via {} transport", output.transport),
            result: Some(output_value(&output)),
            attempts: Vec::new(),
            preview: None,
        };
    }

    if let Some(output) = last_output {
        let note = if output.transport == Transport::HttpPost {
            format!(
                "`{destination}` http_post returned status {}",
                output.exit_code
            )
        } else {
            format!(
                "`{destination}` {} transport exited with code {}",
                output.transport, output.exit_code
            )
        };
        return DispatchResult {
            status: DispatchStatus::Error,
            note,
            result: Some(output_value(&output)),
            attempts,
            preview: None,
        };
    }

    let mut reasons = Vec::new();
    if let Some(failure) = resolution_failure {
        reasons.push(failure);
    }
    if let Some(err) = last_error {
        reasons.push(err.to_string());
    }
    if reasons.is_empty() {
        reasons.push("no delivery path configured".to_string());
    }
    DispatchResult {
        status: DispatchStatus::Error,
        note: format!("dispatch failed for `{destination}`: {}", reasons.join("; ")),
        result: None,
        attempts,
        preview: None,
    }
}
