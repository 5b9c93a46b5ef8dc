use crate::shared::ids::validate_identifier_value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const GLOBAL_STATE_DIR: &str = ".estafeta";
pub const REGISTRY_FILE_NAME: &str = "registry.yaml";

pub fn default_registry_path() -> Result<PathBuf, RegistryError> {
    let home = std::env::var_os("HOME").ok_or(RegistryError::HomeDirectoryUnavailable)?;
    Ok(PathBuf::from(home)
        .join(GLOBAL_STATE_DIR)
        .join(REGISTRY_FILE_NAME))
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read registry file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml in registry file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("registry validation failed: {0}")]
    Validation(String),
    #[error("failed to resolve home directory for registry path")]
    HomeDirectoryUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    StdinJson,
    FileFlags,
    PositionalPath,
    HttpPost,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Transport::StdinJson => "stdin_json",
            Transport::FileFlags => "file_flags",
            Transport::PositionalPath => "positional_path",
            Transport::HttpPost => "http_post",
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How envelope content is projected into the input artifact handed to an
/// external executable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputProjection {
    #[default]
    YamlMessage,
    ContentText,
    ContentLines,
}

impl InputProjection {
    pub fn as_str(self) -> &'static str {
        match self {
            InputProjection::YamlMessage => "yaml_message",
            InputProjection::ContentText => "content_text",
            InputProjection::ContentLines => "content_lines",
        }
    }
}

impl std::fmt::Display for InputProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flag spelling an executable may accept for its input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagVariant {
    pub input_flag: String,
    #[serde(default)]
    pub output_flag: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Variants probed when a destination declares `file_flags` with no explicit
/// list. Mirrors the flag spellings legacy executables are known to accept.
pub fn default_flag_variants() -> Vec<FlagVariant> {
    vec![
        FlagVariant {
            input_flag: "--source".to_string(),
            output_flag: Some("--out".to_string()),
            extra_args: Vec::new(),
        },
        FlagVariant {
            input_flag: "--input".to_string(),
            output_flag: None,
            extra_args: Vec::new(),
        },
        FlagVariant {
            input_flag: "--file".to_string(),
            output_flag: None,
            extra_args: Vec::new(),
        },
    ]
}

fn default_transports() -> Vec<Transport> {
    vec![Transport::StdinJson]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationConfig {
    #[serde(default)]
    pub in_process_module: Option<String>,
    #[serde(default)]
    pub candidate_symbols: Vec<String>,
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default = "default_transports")]
    pub transports: Vec<Transport>,
    #[serde(default)]
    pub projection: InputProjection,
    #[serde(default)]
    pub file_flags: Vec<FlagVariant>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            in_process_module: None,
            candidate_symbols: Vec::new(),
            executable: None,
            transports: default_transports(),
            projection: InputProjection::default(),
            file_flags: Vec::new(),
            endpoint: None,
            timeout_seconds: None,
        }
    }
}

impl DestinationConfig {
    pub fn in_process(module: &str) -> Self {
        Self {
            in_process_module: Some(module.to_string()),
            ..Self::default()
        }
    }

    pub fn external(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: Some(executable.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub destinations: BTreeMap<String, DestinationConfig>,
}

impl Registry {
    /// Catalog available without any registry file: the mock destination used
    /// for smoke-testing the dispatch path.
    pub fn builtin() -> Self {
        let mut destinations = BTreeMap::new();
        destinations.insert(
            crate::modules::MOCK_DISPATCHER.to_string(),
            DestinationConfig::in_process(crate::modules::MOCK_DISPATCHER),
        );
        Self { destinations }
    }

    pub fn from_path(path: &Path) -> Result<Self, RegistryError> {
        let raw = fs::read_to_string(path).map_err(|source| RegistryError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let registry: Registry =
            serde_yaml::from_str(&raw).map_err(|source| RegistryError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        registry.validate()?;
        Ok(registry)
    }

    pub fn lookup(&self, name: &str) -> Option<&DestinationConfig> {
        self.destinations.get(name)
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        for (name, config) in &self.destinations {
            validate_identifier_value("destination name", name)
                .map_err(RegistryError::Validation)?;
            config
                .validate()
                .map_err(|reason| RegistryError::Validation(format!("`{name}`: {reason}")))?;
        }
        Ok(())
    }
}

impl DestinationConfig {
    // A destination with no module, executable, or endpoint still validates;
    // it fails per dispatch with the missing routes named in the note.
    fn validate(&self) -> Result<(), String> {
        for symbol in &self.candidate_symbols {
            if symbol.trim().is_empty() {
                return Err("candidate symbol must be non-empty".to_string());
            }
        }
        if self.transports.is_empty() {
            return Err("at least one transport must be declared".to_string());
        }
        for variant in &self.file_flags {
            if !variant.input_flag.starts_with('-') {
                return Err(format!(
                    "file flag `{}` must start with `-`",
                    variant.input_flag
                ));
            }
            if let Some(output_flag) = &variant.output_flag {
                if !output_flag.starts_with('-') {
                    return Err(format!("output flag `{output_flag}` must start with `-`"));
                }
            }
        }
        if self.timeout_seconds == Some(0) {
            return Err("timeout_seconds must be greater than zero".to_string());
        }
        Ok(())
    }
}
