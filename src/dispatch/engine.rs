use crate::dispatch::{normalize, AttemptOutcome, DispatchResult, InvocationAttempt};
use crate::envelope::{DispatchOptions, Envelope};
use crate::executor::{self, DEFAULT_TIMEOUT_SECONDS};
use crate::modules;
use crate::registry::Registry;
use crate::resolver::{
    self, panic_detail, CallArgs, CallFault, CallShape, ModuleCatalog, ResolvedCallable,
};
use crate::shared::logging::append_dispatch_log_line;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Duration;

pub const IN_PROCESS_STRATEGY: &str = "in_process";

/// Calling conventions probed against a resolved callable, most specific
/// first.
pub const CONVENTION_ORDER: [CallShape; 4] = [
    CallShape::AliasPayload,
    CallShape::AliasEnvelope,
    CallShape::EnvelopeOnly,
    CallShape::ContentOnly,
];

pub fn effective_timeout(option_seconds: Option<u64>, config_seconds: Option<u64>) -> Duration {
    Duration::from_secs(
        option_seconds
            .or(config_seconds)
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS),
    )
}

/// Routes envelopes to destinations. In-process delivery is tried first,
/// then the destination's external transports; the caller always gets a
/// `DispatchResult` back, never a panic.
pub struct Dispatcher {
    registry: Registry,
    modules: ModuleCatalog,
    log_root: Option<PathBuf>,
}

impl Dispatcher {
    pub fn new(registry: Registry, modules: ModuleCatalog) -> Self {
        Self {
            registry,
            modules,
            log_root: None,
        }
    }

    /// Dispatcher over the built-in registry and handler catalog.
    pub fn with_builtin() -> Self {
        Self::new(Registry::builtin(), modules::builtin_catalog())
    }

    pub fn with_log_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.log_root = Some(root.into());
        self
    }

    pub fn dispatch(
        &self,
        destination: &str,
        envelope: &Envelope,
        options: &DispatchOptions,
    ) -> DispatchResult {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.dispatch_inner(destination, envelope, options)
        }));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => normalize::internal_fault(&panic_detail(payload)),
        };
        self.log_line(&format!(
            "dispatch destination=`{destination}` status={} note={}",
            result.status, result.note
        ));
        result
    }

    fn dispatch_inner(
        &self,
        destination: &str,
        envelope: &Envelope,
        options: &DispatchOptions,
    ) -> DispatchResult {
        let Some(config) = self.registry.lookup(destination) else {
            return normalize::destination_not_found(destination);
        };
        if options.dry_run {
            return normalize::dry_run(envelope);
        }
        let timeout = effective_timeout(options.timeout_seconds, config.timeout_seconds);

        let mut attempts = Vec::new();
        let mut resolution_failure = None;
        match resolver::resolve(&self.modules, destination, config) {
            Ok(callable) => {
                if let Some((shape, value)) = probe_conventions(&callable, envelope, &mut attempts)
                {
                    return normalize::in_process_success(&callable, shape, value);
                }
                self.log_line(&format!(
                    "fallback destination=`{destination}` reason=conventions_exhausted"
                ));
            }
            Err(err) => {
                self.log_line(&format!("fallback destination=`{destination}` reason={err}"));
                resolution_failure = Some(err.to_string());
            }
        }

        let report = executor::execute(
            destination,
            config,
            envelope,
            timeout,
            options.endpoint.as_deref(),
        );
        normalize::from_execution(destination, report, attempts, resolution_failure)
    }

    fn log_line(&self, line: &str) {
        if let Some(root) = &self.log_root {
            let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
            let _ = append_dispatch_log_line(root, &format!("{stamp} {line}"));
        }
    }
}

/// Offers each calling convention to the callable in order. A panic inside
/// the handler is contained as a raised-error attempt for that shape only.
fn probe_conventions(
    callable: &ResolvedCallable,
    envelope: &Envelope,
    attempts: &mut Vec<InvocationAttempt>,
) -> Option<(CallShape, Value)> {
    let alias = envelope.alias();
    for shape in CONVENTION_ORDER {
        let args = match shape {
            CallShape::AliasPayload => CallArgs::AliasPayload {
                alias,
                payload: &envelope.content,
            },
            CallShape::AliasEnvelope => CallArgs::AliasEnvelope { alias, envelope },
            CallShape::EnvelopeOnly => CallArgs::EnvelopeOnly(envelope),
            CallShape::ContentOnly => CallArgs::ContentOnly(&envelope.content),
        };
        match catch_unwind(AssertUnwindSafe(|| (callable.handler)(args))) {
            Ok(Ok(value)) => return Some((shape, value)),
            Ok(Err(fault)) => {
                let outcome = match &fault {
                    CallFault::SignatureMismatch(_) => AttemptOutcome::SignatureMismatch,
                    CallFault::Raised(_) => AttemptOutcome::RaisedError,
                };
                attempts.push(InvocationAttempt {
                    strategy: IN_PROCESS_STRATEGY.to_string(),
                    arguments_shape: shape.as_str().to_string(),
                    outcome,
                    error_detail: Some(fault.to_string()),
                });
            }
            Err(payload) => {
                attempts.push(InvocationAttempt {
                    strategy: IN_PROCESS_STRATEGY.to_string(),
                    arguments_shape: shape.as_str().to_string(),
                    outcome: AttemptOutcome::RaisedError,
                    error_detail: Some(format!("handler panicked: {}", panic_detail(payload))),
                });
            }
        }
    }
    None
}
