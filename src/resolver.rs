use crate::envelope::Envelope;
use crate::registry::DestinationConfig;
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Export names probed, in order, when a destination does not pin its own
/// candidate list.
pub const DEFAULT_CANDIDATE_SYMBOLS: [&str; 10] = [
    "send_message",
    "dispatch",
    "dispatch_message",
    "integrate",
    "process",
    "run",
    "main",
    "handle",
    "validate",
    "build",
];

static AMBIENT_ARGS: Mutex<Vec<String>> = Mutex::new(Vec::new());

/// Snapshot of the process-global argument vector legacy handler modules
/// consult during init.
pub fn ambient_args() -> Vec<String> {
    AMBIENT_ARGS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

pub fn set_ambient_args(args: Vec<String>) {
    *AMBIENT_ARGS
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = args;
}

/// Holds the ambient-args lock for the duration of a module load. The
/// previous vector is restored on drop, so concurrent callers never observe
/// the swapped-in module view; loads serialize on this lock.
struct AmbientScope {
    guard: MutexGuard<'static, Vec<String>>,
    saved: Vec<String>,
}

impl AmbientScope {
    fn enter(module_name: &str) -> Self {
        let mut guard = AMBIENT_ARGS
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let saved = std::mem::replace(&mut *guard, vec![module_name.to_string()]);
        Self { guard, saved }
    }

    fn args_mut(&mut self) -> &mut Vec<String> {
        &mut self.guard
    }
}

impl Drop for AmbientScope {
    fn drop(&mut self) {
        *self.guard = std::mem::take(&mut self.saved);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    AliasPayload,
    AliasEnvelope,
    EnvelopeOnly,
    ContentOnly,
}

impl CallShape {
    pub fn as_str(self) -> &'static str {
        match self {
            CallShape::AliasPayload => "alias_payload",
            CallShape::AliasEnvelope => "alias_envelope",
            CallShape::EnvelopeOnly => "envelope",
            CallShape::ContentOnly => "content",
        }
    }
}

impl std::fmt::Display for CallShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Argument bundle offered to a handler. Handlers accept the shapes they
/// understand and refuse the rest with `CallFault::SignatureMismatch`.
pub enum CallArgs<'a> {
    AliasPayload { alias: &'a str, payload: &'a Value },
    AliasEnvelope { alias: &'a str, envelope: &'a Envelope },
    EnvelopeOnly(&'a Envelope),
    ContentOnly(&'a Value),
}

impl CallArgs<'_> {
    pub fn shape(&self) -> CallShape {
        match self {
            CallArgs::AliasPayload { .. } => CallShape::AliasPayload,
            CallArgs::AliasEnvelope { .. } => CallShape::AliasEnvelope,
            CallArgs::EnvelopeOnly(_) => CallShape::EnvelopeOnly,
            CallArgs::ContentOnly(_) => CallShape::ContentOnly,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CallFault {
    #[error("callable does not accept {0} arguments")]
    SignatureMismatch(CallShape),
    #[error("{0}")]
    Raised(String),
}

pub type HandlerFn = dyn Fn(CallArgs<'_>) -> Result<Value, CallFault> + Send + Sync;
pub type InitFn = dyn Fn(&mut Vec<String>) -> Result<(), String> + Send + Sync;

/// A registered handler module: ordered named exports plus an optional init
/// hook that runs once per resolution under the swapped ambient args.
pub struct HandlerModule {
    exports: Vec<(String, Arc<HandlerFn>)>,
    init: Option<Box<InitFn>>,
}

impl HandlerModule {
    pub fn new() -> Self {
        Self {
            exports: Vec::new(),
            init: None,
        }
    }

    pub fn with_init<F>(init: F) -> Self
    where
        F: Fn(&mut Vec<String>) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            exports: Vec::new(),
            init: Some(Box::new(init)),
        }
    }

    pub fn export<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(CallArgs<'_>) -> Result<Value, CallFault> + Send + Sync + 'static,
    {
        let handler: Arc<HandlerFn> = Arc::new(handler);
        self.exports.push((name.to_string(), handler));
        self
    }

    fn lookup_export(&self, name: &str) -> Option<Arc<HandlerFn>> {
        self.exports
            .iter()
            .find(|(export, _)| export == name)
            .map(|(_, handler)| Arc::clone(handler))
    }

    fn first_export(&self) -> Option<(String, Arc<HandlerFn>)> {
        self.exports
            .first()
            .map(|(name, handler)| (name.clone(), Arc::clone(handler)))
    }

    fn load(&self, module_name: &str) -> Result<(), ResolveError> {
        let Some(init) = &self.init else {
            return Ok(());
        };
        let mut scope = AmbientScope::enter(module_name);
        let outcome = catch_unwind(AssertUnwindSafe(|| init(scope.args_mut())));
        drop(scope);
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(detail)) => Err(ResolveError::ModuleLoadFailure {
                module: module_name.to_string(),
                detail,
            }),
            Err(payload) => Err(ResolveError::ModuleLoadFailure {
                module: module_name.to_string(),
                detail: format!("module init panicked: {}", panic_detail(payload)),
            }),
        }
    }
}

impl Default for HandlerModule {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, HandlerModule>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, module: HandlerModule) {
        self.modules.insert(name.to_string(), module);
    }

    pub fn get(&self, name: &str) -> Option<&HandlerModule> {
        self.modules.get(name)
    }
}

#[derive(Clone)]
pub struct ResolvedCallable {
    pub module: String,
    pub symbol: String,
    pub handler: Arc<HandlerFn>,
}

impl std::fmt::Debug for ResolvedCallable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCallable")
            .field("module", &self.module)
            .field("symbol", &self.symbol)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("destination `{destination}` declares no in-process module")]
    NoInProcessModule { destination: String },
    #[error("module `{module}` failed to load: {detail}")]
    ModuleLoadFailure { module: String, detail: String },
    #[error("no callable resolved in module `{module}` (searched {searched:?})")]
    NoCallableResolved {
        module: String,
        searched: Vec<String>,
    },
}

pub(crate) fn panic_detail(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Locate the callable for a destination: load the configured module (init
/// runs under the swapped ambient args), then walk the candidate symbols in
/// order, falling back to the module's first export.
pub fn resolve(
    catalog: &ModuleCatalog,
    destination: &str,
    config: &DestinationConfig,
) -> Result<ResolvedCallable, ResolveError> {
    let module_name = match config.in_process_module.as_deref() {
        Some(value) if !value.trim().is_empty() => value,
        _ => {
            return Err(ResolveError::NoInProcessModule {
                destination: destination.to_string(),
            })
        }
    };
    let module = catalog
        .get(module_name)
        .ok_or_else(|| ResolveError::ModuleLoadFailure {
            module: module_name.to_string(),
            detail: "module is not registered".to_string(),
        })?;
    module.load(module_name)?;

    let candidates: Vec<String> = if config.candidate_symbols.is_empty() {
        DEFAULT_CANDIDATE_SYMBOLS
            .iter()
            .map(|name| name.to_string())
            .collect()
    } else {
        config.candidate_symbols.clone()
    };
    for name in &candidates {
        if let Some(handler) = module.lookup_export(name) {
            return Ok(ResolvedCallable {
                module: module_name.to_string(),
                symbol: name.clone(),
                handler,
            });
        }
    }
    if let Some((symbol, handler)) = module.first_export() {
        return Ok(ResolvedCallable {
            module: module_name.to_string(),
            symbol,
            handler,
        });
    }
    Err(ResolveError::NoCallableResolved {
        module: module_name.to_string(),
        searched: candidates,
    })
}
