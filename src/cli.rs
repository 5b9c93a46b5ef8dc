use crate::dispatch::Dispatcher;
use crate::envelope::{DispatchOptions, Envelope};
use crate::journal::Journal;
use crate::modules::builtin_catalog;
use crate::registry::{default_registry_path, DestinationConfig, Registry};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Dispatch(DispatchArgs),
    Destinations { registry: Option<PathBuf> },
    Help,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchArgs {
    pub destination: String,
    pub registry: Option<PathBuf>,
    pub dry_run: bool,
    pub endpoint: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub journal: Option<PathBuf>,
    pub log_root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliRun {
    pub output: String,
    pub exit_code: i32,
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  dispatch <destination>               Dispatch an envelope (JSON on stdin)".to_string(),
        "    --registry <path>                  Load destinations from a registry file".to_string(),
        "    --dry-run                          Preview the outbound envelope without delivering"
            .to_string(),
        "    --endpoint <url>                   Override the http_post endpoint".to_string(),
        "    --timeout-seconds <n>              Deadline for external invocations".to_string(),
        "    --journal <path>                   Append envelope and result to an NDJSON journal"
            .to_string(),
        "    --log-root <path>                  Write dispatch log lines under this directory"
            .to_string(),
        "  destinations                         List configured destinations and their routes"
            .to_string(),
        "    --registry <path>                  Load destinations from a registry file".to_string(),
        "  help                                 Show this help".to_string(),
    ]
}

pub fn parse_cli(args: &[String]) -> Result<CliCommand, String> {
    let Some(verb) = args.first() else {
        return Ok(CliCommand::Help);
    };
    match verb.as_str() {
        "dispatch" => parse_dispatch(&args[1..]).map(CliCommand::Dispatch),
        "destinations" => parse_destinations(&args[1..]),
        "help" | "--help" | "-h" => Ok(CliCommand::Help),
        other => Err(format!("unknown command `{other}`; run `estafeta help`")),
    }
}

fn flag_value<'a>(rest: &'a [String], index: usize, flag: &str) -> Result<&'a str, String> {
    rest.get(index + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_dispatch(rest: &[String]) -> Result<DispatchArgs, String> {
    let mut args = DispatchArgs::default();
    let mut destination = None;
    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--registry" => {
                args.registry = Some(PathBuf::from(flag_value(rest, i, "--registry")?));
                i += 2;
            }
            "--dry-run" => {
                args.dry_run = true;
                i += 1;
            }
            "--endpoint" => {
                args.endpoint = Some(flag_value(rest, i, "--endpoint")?.to_string());
                i += 2;
            }
            "--timeout-seconds" => {
                let raw = flag_value(rest, i, "--timeout-seconds")?;
                let parsed = raw
                    .parse::<u64>()
                    .map_err(|_| format!("invalid --timeout-seconds value `{raw}`"))?;
                args.timeout_seconds = Some(parsed);
                i += 2;
            }
            "--journal" => {
                args.journal = Some(PathBuf::from(flag_value(rest, i, "--journal")?));
                i += 2;
            }
            "--log-root" => {
                args.log_root = Some(PathBuf::from(flag_value(rest, i, "--log-root")?));
                i += 2;
            }
            other if other.starts_with('-') => {
                return Err(format!("unknown flag `{other}` for dispatch"));
            }
            other => {
                if destination.is_some() {
                    return Err("dispatch accepts a single destination name".to_string());
                }
                destination = Some(other.to_string());
                i += 1;
            }
        }
    }
    args.destination = destination.ok_or("dispatch requires a destination name")?;
    Ok(args)
}

fn parse_destinations(rest: &[String]) -> Result<CliCommand, String> {
    let mut registry = None;
    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--registry" => {
                registry = Some(PathBuf::from(flag_value(rest, i, "--registry")?));
                i += 2;
            }
            other => return Err(format!("unknown argument `{other}` for destinations")),
        }
    }
    Ok(CliCommand::Destinations { registry })
}

fn load_registry(path: Option<&Path>) -> Result<Registry, String> {
    if let Some(path) = path {
        return Registry::from_path(path).map_err(|err| err.to_string());
    }
    match default_registry_path() {
        Ok(path) if path.is_file() => Registry::from_path(&path).map_err(|err| err.to_string()),
        _ => Ok(Registry::builtin()),
    }
}

fn route_summary(config: &DestinationConfig) -> String {
    let mut parts = Vec::new();
    if let Some(module) = &config.in_process_module {
        parts.push(format!("module `{module}`"));
    }
    if let Some(executable) = &config.executable {
        parts.push(format!("executable {}", executable.display()));
    }
    if let Some(endpoint) = &config.endpoint {
        parts.push(format!("endpoint {endpoint}"));
    }
    let transports = config
        .transports
        .iter()
        .map(|transport| transport.as_str())
        .collect::<Vec<_>>()
        .join(",");
    format!("{} [{transports}]", parts.join(", "))
}

/// Runs a parsed command. `input` is the stdin text for `dispatch`; other
/// commands ignore it.
pub fn execute(command: CliCommand, input: Option<&str>) -> Result<CliRun, String> {
    match command {
        CliCommand::Help => Ok(CliRun {
            output: cli_help_lines().join("\n"),
            exit_code: 0,
        }),
        CliCommand::Destinations { registry } => {
            let registry = load_registry(registry.as_deref())?;
            let mut lines: Vec<String> = registry
                .destinations
                .iter()
                .map(|(name, config)| format!("{name:24} {}", route_summary(config)))
                .collect();
            if lines.is_empty() {
                lines.push("(no destinations configured)".to_string());
            }
            Ok(CliRun {
                output: lines.join("\n"),
                exit_code: 0,
            })
        }
        CliCommand::Dispatch(args) => run_dispatch(args, input.unwrap_or_default()),
    }
}

fn run_dispatch(args: DispatchArgs, input: &str) -> Result<CliRun, String> {
    let registry = load_registry(args.registry.as_deref())?;
    let mut dispatcher = Dispatcher::new(registry, builtin_catalog());
    if let Some(root) = &args.log_root {
        dispatcher = dispatcher.with_log_root(root);
    }

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("expected an envelope JSON object on stdin".to_string());
    }
    let value: serde_json::Value =
        serde_json::from_str(trimmed).map_err(|err| format!("invalid envelope json: {err}"))?;
    let envelope = Envelope::from_json(value).map_err(|err| format!("invalid envelope: {err}"))?;

    let options = DispatchOptions {
        dry_run: args.dry_run,
        endpoint: args.endpoint.clone(),
        timeout_seconds: args.timeout_seconds,
    };
    let result = dispatcher.dispatch(&args.destination, &envelope, &options);
    if let Some(path) = &args.journal {
        Journal::new(path)
            .append(&args.destination, &envelope, &result)
            .map_err(|err| err.to_string())?;
    }
    let output = serde_json::to_string(&result)
        .map_err(|err| format!("failed to encode dispatch result: {err}"))?;
    Ok(CliRun {
        output,
        exit_code: if result.is_ok() { 0 } else { 1 },
    })
}

pub fn run(args: Vec<String>) -> Result<CliRun, String> {
    let command = parse_cli(&args)?;
    let input = if matches!(command, CliCommand::Dispatch(_)) {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|err| format!("failed to read stdin: {err}"))?;
        Some(buf)
    } else {
        None
    };
    execute(command, input.as_deref())
}
