use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod engine;
pub mod normalize;

pub use engine::Dispatcher;

/// Note string marking a dispatch that was previewed but not delivered.
pub const DRY_RUN_NOTE: &str = "dry_run";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Ok,
    Error,
}

impl DispatchStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, DispatchStatus::Ok)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DispatchStatus::Ok => "ok",
            DispatchStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttemptOutcome {
    Success,
    SignatureMismatch,
    RaisedError,
}

/// One probed delivery path that did not go through, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationAttempt {
    pub strategy: String,
    pub arguments_shape: String,
    pub outcome: AttemptOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

/// Terminal outcome of a dispatch. Always JSON-serializable; `attempts` is
/// populated only when every delivery path failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub status: DispatchStatus,
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<InvocationAttempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<Value>,
}

impl DispatchResult {
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}
