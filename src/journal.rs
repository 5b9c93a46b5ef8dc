use crate::dispatch::DispatchResult;
use crate::envelope::Envelope;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("failed to read journal {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write journal {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode journal record: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalRecord {
    pub recorded_at: String,
    pub destination: String,
    pub envelope: Envelope,
    pub result: DispatchResult,
}

/// Append-only NDJSON log of dispatched envelopes and their outcomes.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(
        &self,
        destination: &str,
        envelope: &Envelope,
        result: &DispatchResult,
    ) -> Result<(), JournalError> {
        let record = JournalRecord {
            recorded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            destination: destination.to_string(),
            envelope: envelope.clone(),
            result: result.clone(),
        };
        let line =
            serde_json::to_string(&record).map_err(|source| JournalError::Encode { source })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| JournalError::Write {
                path: self.path.display().to_string(),
                source,
            })?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| JournalError::Write {
                path: self.path.display().to_string(),
                source,
            })?;
        writeln!(file, "{line}").map_err(|source| JournalError::Write {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// All decodable records in append order. A journal that does not exist
    /// yet reads as empty; undecodable lines are skipped.
    pub fn read_all(&self) -> Result<Vec<JournalRecord>, JournalError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(JournalError::Read {
                    path: self.path.display().to_string(),
                    source,
                })
            }
        };
        let mut records = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<JournalRecord>(line) {
                records.push(record);
            }
        }
        Ok(records)
    }
}
