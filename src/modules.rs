use crate::envelope::Envelope;
use crate::resolver::{CallArgs, CallFault, HandlerModule, ModuleCatalog};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

pub const MOCK_DISPATCHER: &str = "mock_dispatcher";

/// Handler modules available without any configuration.
pub fn builtin_catalog() -> ModuleCatalog {
    let mut catalog = ModuleCatalog::new();
    catalog.register(MOCK_DISPATCHER, mock_dispatcher_module());
    catalog
}

/// Stand-in destination that acknowledges receipt instead of delivering.
/// Takes the whole envelope, so the alias-first conventions bounce off it.
pub fn mock_dispatcher_module() -> HandlerModule {
    HandlerModule::new().export("send_message", |args| match args {
        CallArgs::EnvelopeOnly(envelope) => Ok(mock_receipt(envelope)),
        other => Err(CallFault::SignatureMismatch(other.shape())),
    })
}

fn mock_receipt(envelope: &Envelope) -> Value {
    json!({
        "status": "ok",
        "sentTo": envelope.alias(),
        "messageId": envelope.message_id,
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "note": "mock dispatched",
    })
}
