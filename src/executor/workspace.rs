use crate::envelope::{Envelope, Fragment};
use crate::executor::{io_error, ExecutorError};
use crate::registry::InputProjection;
use crate::shared::ids::random_base36;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const MESSAGE_DOC_VERSION: &str = "0.1";
pub const YAML_INPUT_FILE_NAME: &str = "message.yaml";
pub const TEXT_INPUT_FILE_NAME: &str = "content.txt";
pub const LINES_INPUT_FILE_NAME: &str = "lines.txt";

/// Fresh per-invocation scratch directory under the system temp dir. The
/// directory is retained after dispatch so artifacts stay inspectable.
pub fn create_workspace(destination: &str) -> Result<PathBuf, ExecutorError> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let dir = std::env::temp_dir().join(format!(
        "estafeta-{}-{}-{}-{}",
        destination,
        std::process::id(),
        nanos,
        random_base36(4)
    ));
    fs::create_dir_all(&dir).map_err(|err| io_error(&dir, err))?;
    Ok(dir)
}

/// Self-describing document written for executables that consume the full
/// message rather than bare content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDocument {
    pub protocol_id: String,
    pub version: String,
    pub message_id: String,
    pub session_id: String,
    pub created_at: String,
    pub origin: String,
    pub fragment: Fragment,
    pub content: Value,
    pub message_hash: String,
}

pub fn message_document(envelope: &Envelope) -> MessageDocument {
    let text = content_text(&envelope.content);
    MessageDocument {
        protocol_id: envelope.protocol_id.clone(),
        version: MESSAGE_DOC_VERSION.to_string(),
        message_id: envelope.message_id.clone(),
        session_id: envelope.session_id.clone(),
        created_at: envelope.created_at.clone(),
        origin: envelope.origin_entity.clone(),
        fragment: envelope.fragment,
        content: envelope.content.clone(),
        message_hash: short_hash(&text, &envelope.origin_entity, &envelope.created_at),
    }
}

fn short_hash(text: &str, origin: &str, created_at: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(origin.as_bytes());
    hasher.update(created_at.as_bytes());
    let digest = hasher.finalize();
    digest[..6]
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>()
}

/// Plain-text rendering of envelope content: strings pass through, other
/// values serialize as compact JSON, null maps to the empty string.
pub fn content_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Line-oriented rendering: array items become one line each, everything
/// else splits on newlines with blank lines dropped.
pub fn content_lines(content: &Value) -> Vec<String> {
    if let Value::Array(items) = content {
        return items.iter().map(content_text).collect();
    }
    let text = content_text(content);
    let lines: Vec<String> = text
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() && !text.is_empty() {
        return vec![text];
    }
    lines
}

/// Materializes the input artifact for file-based transports and returns its
/// path inside the workspace.
pub fn write_input(
    workspace: &Path,
    envelope: &Envelope,
    projection: InputProjection,
) -> Result<PathBuf, ExecutorError> {
    let (name, body) = match projection {
        InputProjection::YamlMessage => {
            let document = message_document(envelope);
            let body =
                serde_yaml::to_string(&document).map_err(|source| ExecutorError::EncodeYaml {
                    path: workspace.join(YAML_INPUT_FILE_NAME).display().to_string(),
                    source,
                })?;
            (YAML_INPUT_FILE_NAME, body)
        }
        InputProjection::ContentText => (TEXT_INPUT_FILE_NAME, content_text(&envelope.content)),
        InputProjection::ContentLines => {
            let mut body = content_lines(&envelope.content).join("\n");
            if !body.is_empty() {
                body.push('\n');
            }
            (LINES_INPUT_FILE_NAME, body)
        }
    };
    let path = workspace.join(name);
    fs::write(&path, body).map_err(|err| io_error(&path, err))?;
    Ok(path)
}
