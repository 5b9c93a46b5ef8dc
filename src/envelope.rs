use crate::shared::ids::generate_message_id;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_ORIGIN_ENTITY: &str = "UNKNOWN";
pub const DEFAULT_SESSION_ID: &str = "sala-01";
pub const PROTOCOL_ID: &str = "estafeta.msg.v0";
/// Alias of last resort when neither `destination` nor `originEntity` is usable.
pub const FALLBACK_ALIAS: &str = "TRON";

fn default_origin_entity() -> String {
    DEFAULT_ORIGIN_ENTITY.to_string()
}

fn default_session_id() -> String {
    DEFAULT_SESSION_ID.to_string()
}

fn default_protocol_id() -> String {
    PROTOCOL_ID.to_string()
}

fn default_content() -> Value {
    Value::String(String::new())
}

fn default_fragment_part() -> u32 {
    1
}

pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(default = "default_fragment_part")]
    pub index: u32,
    #[serde(default = "default_fragment_part")]
    pub total: u32,
}

impl Default for Fragment {
    fn default() -> Self {
        Self { index: 1, total: 1 }
    }
}

/// One message travelling through dispatch. Missing fields are filled with
/// protocol defaults so partially-formed input still routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default = "default_content")]
    pub content: Value,
    #[serde(default = "default_origin_entity")]
    pub origin_entity: String,
    #[serde(default = "default_session_id")]
    pub session_id: String,
    #[serde(default = "default_protocol_id")]
    pub protocol_id: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub fragment: Fragment,
    #[serde(default)]
    pub destination: Option<String>,
}

impl Envelope {
    pub fn new(content: Value) -> Self {
        let now = Utc::now();
        Self {
            content,
            origin_entity: default_origin_entity(),
            session_id: default_session_id(),
            protocol_id: default_protocol_id(),
            message_id: generate_message_id(now),
            created_at: format_timestamp(now),
            fragment: Fragment::default(),
            destination: None,
        }
    }

    /// Accepts a partial envelope object and fills the gaps. Unknown extra
    /// keys are dropped rather than rejected.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        let mut envelope: Envelope = serde_json::from_value(value)?;
        envelope.fill_defaults();
        Ok(envelope)
    }

    fn fill_defaults(&mut self) {
        let now = Utc::now();
        if self.message_id.trim().is_empty() {
            self.message_id = generate_message_id(now);
        }
        if self.created_at.trim().is_empty() {
            self.created_at = format_timestamp(now);
        }
    }

    /// Routing alias handed to in-process callables: the `destination` field
    /// when set, else the origin entity, else the fixed fallback.
    pub fn alias(&self) -> &str {
        if let Some(destination) = &self.destination {
            if !destination.trim().is_empty() {
                return destination;
            }
        }
        if !self.origin_entity.trim().is_empty() {
            return &self.origin_entity;
        }
        FALLBACK_ALIAS
    }
}

/// Per-call dispatch switches, separate from the envelope itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOptions {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}
