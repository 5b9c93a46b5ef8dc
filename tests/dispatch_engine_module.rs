use estafeta::dispatch::{AttemptOutcome, DispatchResult, DispatchStatus, Dispatcher};
use estafeta::envelope::{DispatchOptions, Envelope};
use estafeta::registry::{DestinationConfig, Registry};
use estafeta::resolver::{CallArgs, CallFault, CallShape, HandlerModule, ModuleCatalog};
use serde_json::{json, Value};
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

fn spy_module(
    accept: Option<CallShape>,
    offered: Arc<Mutex<Vec<String>>>,
) -> HandlerModule {
    HandlerModule::new().export("send_message", move |args| {
        let shape = args.shape();
        offered
            .lock()
            .expect("lock offered shapes")
            .push(shape.as_str().to_string());
        match accept {
            Some(accepted) if shape == accepted => Ok(json!({"delivered": shape.as_str()})),
            _ => Err(CallFault::SignatureMismatch(shape)),
        }
    })
}

fn dispatcher_with(module: HandlerModule) -> Dispatcher {
    let mut catalog = ModuleCatalog::new();
    catalog.register("probe_mod", module);
    let mut registry = Registry::default();
    registry.destinations.insert(
        "probe".to_string(),
        DestinationConfig::in_process("probe_mod"),
    );
    Dispatcher::new(registry, catalog)
}

#[test]
fn conventions_are_probed_in_order_until_content_succeeds() {
    let offered = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = dispatcher_with(spy_module(
        Some(CallShape::ContentOnly),
        Arc::clone(&offered),
    ));
    let envelope = Envelope::new(json!("hola"));

    let result = dispatcher.dispatch("probe", &envelope, &DispatchOptions::default());

    assert_eq!(result.status, DispatchStatus::Ok);
    assert!(result.note.contains("(content)"));
    assert_eq!(result.result, Some(json!({"delivered": "content"})));
    assert!(result.attempts.is_empty());
    assert_eq!(
        offered.lock().expect("lock offered shapes").clone(),
        vec![
            "alias_payload".to_string(),
            "alias_envelope".to_string(),
            "envelope".to_string(),
            "content".to_string(),
        ]
    );
}

#[test]
fn first_accepting_convention_stops_the_probe() {
    let offered = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = dispatcher_with(spy_module(
        Some(CallShape::AliasPayload),
        Arc::clone(&offered),
    ));
    let mut envelope = Envelope::new(json!("hola"));
    envelope.origin_entity = "sala".to_string();

    let result = dispatcher.dispatch("probe", &envelope, &DispatchOptions::default());

    assert!(result.is_ok());
    assert!(result.note.contains("alias_payload"));
    assert_eq!(
        offered.lock().expect("lock offered shapes").clone(),
        vec!["alias_payload".to_string()]
    );
}

#[test]
fn raised_error_moves_on_to_the_next_convention() {
    let offered = Arc::new(Mutex::new(Vec::new()));
    let offered_in_handler = Arc::clone(&offered);
    let module = HandlerModule::new().export("send_message", move |args| {
        let shape = args.shape();
        offered_in_handler
            .lock()
            .expect("lock offered shapes")
            .push(shape.as_str().to_string());
        match shape {
            CallShape::AliasPayload => Err(CallFault::Raised("transient boom".to_string())),
            CallShape::AliasEnvelope => Ok(json!({"delivered": "alias_envelope"})),
            other => Err(CallFault::SignatureMismatch(other)),
        }
    });
    let dispatcher = dispatcher_with(module);
    let envelope = Envelope::new(json!("hola"));

    let result = dispatcher.dispatch("probe", &envelope, &DispatchOptions::default());

    assert!(result.is_ok());
    assert!(result.note.contains("alias_envelope"));
    assert_eq!(
        offered.lock().expect("lock offered shapes").clone(),
        vec!["alias_payload".to_string(), "alias_envelope".to_string()]
    );
}

#[test]
fn handler_raising_until_content_still_succeeds_without_subprocess() {
    let offered = Arc::new(Mutex::new(Vec::new()));
    let offered_in_handler = Arc::clone(&offered);
    let module = HandlerModule::new().export("send_message", move |args| {
        let shape = args.shape();
        offered_in_handler
            .lock()
            .expect("lock offered shapes")
            .push(shape.as_str().to_string());
        match shape {
            CallShape::ContentOnly => Ok(json!({"echo": "content path"})),
            _ => Err(CallFault::Raised(format!("cannot take {shape}"))),
        }
    });
    // No executable configured: a subprocess fallback would turn this into
    // an error result, so `ok` proves the content-only return was accepted.
    let dispatcher = dispatcher_with(module);
    let envelope = Envelope::new(json!("hola"));

    let result = dispatcher.dispatch("probe", &envelope, &DispatchOptions::default());

    assert_eq!(result.status, DispatchStatus::Ok);
    assert_eq!(result.result, Some(json!({"echo": "content path"})));
    assert_eq!(
        offered.lock().expect("lock offered shapes").clone(),
        vec![
            "alias_payload".to_string(),
            "alias_envelope".to_string(),
            "envelope".to_string(),
            "content".to_string(),
        ]
    );
}

#[test]
fn panicking_handler_is_contained_per_shape_and_dispatch_returns_error() {
    let module = HandlerModule::new().export(
        "send_message",
        |_args: CallArgs<'_>| -> Result<Value, CallFault> { panic!("handler exploded") },
    );
    let dispatcher = dispatcher_with(module);
    let envelope = Envelope::new(json!("hola"));

    let result = dispatcher.dispatch("probe", &envelope, &DispatchOptions::default());

    assert_eq!(result.status, DispatchStatus::Error);
    assert!(result.note.contains("dispatch failed for `probe`"));
    // Four contained panics, then the external fallback with no executable.
    assert_eq!(result.attempts.len(), 5);
    for attempt in &result.attempts[..4] {
        assert_eq!(attempt.strategy, "in_process");
        assert_eq!(attempt.outcome, AttemptOutcome::RaisedError);
        assert!(attempt
            .error_detail
            .as_deref()
            .is_some_and(|detail| detail.contains("handler exploded")));
    }
    assert_eq!(result.attempts[4].strategy, "external");
}

#[test]
fn dry_run_previews_the_content_without_calling_handlers() {
    let offered = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = dispatcher_with(spy_module(
        Some(CallShape::AliasPayload),
        Arc::clone(&offered),
    ));
    let envelope = Envelope::new(json!({"text": "preview me"}));
    let options = DispatchOptions {
        dry_run: true,
        ..DispatchOptions::default()
    };

    let result = dispatcher.dispatch("probe", &envelope, &options);

    assert!(result.is_ok());
    assert_eq!(result.note, "dry_run");
    assert!(result.result.is_none());
    assert_eq!(result.preview, Some(json!({"text": "preview me"})));
    assert!(offered.lock().expect("lock offered shapes").is_empty());
}

#[test]
fn unknown_destination_reports_not_found_with_zero_attempts() {
    let offered = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = dispatcher_with(spy_module(
        Some(CallShape::AliasPayload),
        Arc::clone(&offered),
    ));
    let envelope = Envelope::new(json!("hola"));

    let result = dispatcher.dispatch("ghost", &envelope, &DispatchOptions::default());

    assert_eq!(result.status, DispatchStatus::Error);
    assert!(result.note.contains("destination not found"));
    assert!(result.note.contains("ghost"));
    assert!(result.attempts.is_empty());
    assert!(offered.lock().expect("lock offered shapes").is_empty());
}

#[test]
fn routeless_destination_loads_from_file_and_fails_per_dispatch() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("registry.yaml");
    fs::write(&path, "destinations:\n  lame_duck:\n    timeout_seconds: 5\n")
        .expect("write registry yaml");
    let registry = Registry::from_path(&path).expect("routeless entry still loads");
    let dispatcher = Dispatcher::new(registry, ModuleCatalog::new());
    let envelope = Envelope::new(json!("hola"));

    let result = dispatcher.dispatch("lame_duck", &envelope, &DispatchOptions::default());

    assert_eq!(result.status, DispatchStatus::Error);
    assert!(result.note.contains("dispatch failed for `lame_duck`"));
    assert!(result.note.contains("declares no in-process module"));
    assert!(result.note.contains("declares no external executable"));
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.attempts[0].strategy, "external");
    assert_eq!(result.attempts[0].arguments_shape, "stdin_json");
}

/// Serialized result with the per-dispatch generated fields cleared so two
/// runs compare field for field.
fn scrubbed(result: &DispatchResult) -> Value {
    let mut raw = serde_json::to_value(result).expect("serialize result");
    if let Some(receipt) = raw.get_mut("result").and_then(Value::as_object_mut) {
        receipt.remove("messageId");
        receipt.remove("timestamp");
    }
    raw
}

#[test]
fn repeat_dispatch_of_the_same_envelope_is_stable_and_leaves_it_unchanged() {
    let dispatcher = Dispatcher::with_builtin();
    let mut envelope = Envelope::new(json!("hola"));
    envelope.destination = Some("mock_dispatcher".to_string());
    let before = envelope.clone();

    let first = dispatcher.dispatch("mock_dispatcher", &envelope, &DispatchOptions::default());
    let second = dispatcher.dispatch("mock_dispatcher", &envelope, &DispatchOptions::default());

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(scrubbed(&first), scrubbed(&second));
    assert_eq!(envelope, before);
}

#[test]
fn serialized_success_result_has_no_attempts_key() {
    let dispatcher = Dispatcher::with_builtin();
    let envelope = Envelope::new(json!("hola"));
    let result = dispatcher.dispatch("mock_dispatcher", &envelope, &DispatchOptions::default());
    assert!(result.is_ok());
    let raw = serde_json::to_value(&result).expect("serialize result");
    let object = raw.as_object().expect("object");
    assert!(!object.contains_key("attempts"));
    assert!(!object.contains_key("preview"));
    assert_eq!(object.get("status"), Some(&json!("ok")));
}
