use anyhow::Result;
use std::path::PathBuf;

use crate::alerts::AlertStatus;
use crate::command::{AppCommand, DEFAULT_ALERT_LIMIT};

pub(crate) fn version_text() -> String {
    format!("netauto-core {}", env!("CARGO_PKG_VERSION"))
}

pub(crate) fn usage_text() -> String {
    format!(
        "{version}
Device automation and security assessment

Usage:
  netauto-core scan --devices <FILE> [--target <SELECTOR>] [--ports <LIST>]
  netauto-core run <OPERATION> --devices <FILE> [--target <SELECTOR>] [--extra <KEY=VALUE>]...
  netauto-core run --command <CMD> [--command <CMD>]... --devices <FILE> [--target <SELECTOR>]
  netauto-core alerts [--status <open|acknowledged|resolved>] [--limit <N>]
  netauto-core ack <ALERT_ID>
  netauto-core resolve <ALERT_ID>
  netauto-core overview
  netauto-core capabilities
  netauto-core playbooks
  netauto-core --help
  netauto-core --version

Options:
  -d, --devices <FILE>      JSON device list (array or {{\"devices\": [...]}})
  -t, --target <SELECTOR>   Hostname, role group (routers, switches, ...) or tag; default all
  -p, --ports <LIST>        Comma-separated ports to scan (default from NETAUTO_SCAN_PORTS)
  -c, --command <CMD>       Ad hoc command, repeatable
  -e, --extra <KEY=VALUE>   Extra parameter for the operation, repeatable
      --status <STATUS>     Alerts: filter by status
      --limit <N>           Alerts: maximum rows (default: {default_limit})
  -h, --help                Show this help text
  -V, --version             Show version",
        version = version_text(),
        default_limit = DEFAULT_ALERT_LIMIT
    )
}

fn usage_error(message: impl std::fmt::Display) -> anyhow::Error {
    anyhow::anyhow!("{}\n\n{}", message, usage_text())
}

fn parse_limit(raw: &str) -> Result<usize> {
    raw.parse::<usize>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| usage_error(format!("Invalid value for --limit: '{}'. Expected a positive integer.", raw)))
}

fn parse_ports(raw: &str) -> Result<Vec<u16>> {
    let ports = crate::config::parse_port_list(raw);
    if ports.is_empty() {
        return Err(usage_error(format!("Invalid value for --ports: '{}'.", raw)));
    }
    Ok(ports)
}

fn parse_extra(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(usage_error(format!("Invalid value for --extra: '{}'. Expected KEY=VALUE.", raw))),
    }
}

#[derive(Default)]
struct Flags {
    devices: Option<PathBuf>,
    target: Option<String>,
    ports: Option<Vec<u16>>,
    commands: Vec<String>,
    extra_vars: Vec<(String, String)>,
    status: Option<AlertStatus>,
    limit: Option<usize>,
}

impl Flags {
    fn any_device_flag(&self) -> bool {
        self.devices.is_some()
            || self.target.is_some()
            || self.ports.is_some()
            || !self.commands.is_empty()
            || !self.extra_vars.is_empty()
    }

    fn any_alert_flag(&self) -> bool {
        self.status.is_some() || self.limit.is_some()
    }

    fn require_devices(&mut self, command: &str) -> Result<PathBuf> {
        self.devices
            .take()
            .ok_or_else(|| usage_error(format!("{} requires --devices <FILE>.", command)))
    }
}

// `--flag value` or `--flag=value`
fn take_value<I, S>(flag: &str, inline: Option<&str>, iter: &mut I) -> Result<String>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    let value = match inline {
        Some(value) => value.to_string(),
        None => iter
            .next()
            .map(|v| v.as_ref().to_string())
            .ok_or_else(|| usage_error(format!("Missing value for {}.", flag)))?,
    };
    if value.is_empty() {
        return Err(usage_error(format!("Missing value for {}.", flag)));
    }
    Ok(value)
}

pub(crate) fn parse_cli_args<I, S>(args: I) -> Result<AppCommand>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut iter = args.into_iter();
    let _program_name = iter.next();

    let mut command: Option<String> = None;
    let mut positionals: Vec<String> = Vec::new();
    let mut flags = Flags::default();

    while let Some(arg) = iter.next() {
        let arg = arg.as_ref().to_string();
        let (name, inline) = match arg.split_once('=') {
            Some((name, value)) if name.starts_with('-') => (name.to_string(), Some(value)),
            _ => (arg.clone(), None),
        };

        match name.as_str() {
            "-h" | "--help" => return Ok(AppCommand::Help),
            "-V" | "--version" => return Ok(AppCommand::Version),
            "-d" | "--devices" => {
                flags.devices = Some(PathBuf::from(take_value("--devices", inline, &mut iter)?));
            }
            "-t" | "--target" => {
                flags.target = Some(take_value("--target", inline, &mut iter)?);
            }
            "-p" | "--ports" => {
                flags.ports = Some(parse_ports(&take_value("--ports", inline, &mut iter)?)?);
            }
            "-c" | "--command" => {
                flags.commands.push(take_value("--command", inline, &mut iter)?);
            }
            "-e" | "--extra" => {
                flags
                    .extra_vars
                    .push(parse_extra(&take_value("--extra", inline, &mut iter)?)?);
            }
            "--status" => {
                let raw = take_value("--status", inline, &mut iter)?;
                let status = raw.parse::<AlertStatus>().map_err(usage_error)?;
                flags.status = Some(status);
            }
            "--limit" => {
                flags.limit = Some(parse_limit(&take_value("--limit", inline, &mut iter)?)?);
            }
            _ if name.starts_with('-') => {
                return Err(usage_error(format!("Unknown argument: {}", arg)));
            }
            "scan" | "run" | "alerts" | "ack" | "resolve" | "overview" | "capabilities"
            | "playbooks"
                if command.is_none() =>
            {
                command = Some(name.clone());
            }
            _ if command.is_some() => positionals.push(arg),
            _ => return Err(usage_error(format!("Unknown argument: {}", arg))),
        }
    }

    let Some(command) = command else {
        return Ok(AppCommand::Help);
    };

    let single_positional = |positionals: &[String], what: &str| -> Result<String> {
        match positionals {
            [one] => Ok(one.clone()),
            [] => Err(usage_error(format!("{} requires <ALERT_ID>.", what))),
            _ => Err(usage_error(format!("{} takes a single <ALERT_ID>.", what))),
        }
    };

    match command.as_str() {
        "scan" => {
            if !positionals.is_empty() || !flags.commands.is_empty() || !flags.extra_vars.is_empty() {
                return Err(usage_error("scan only accepts --devices, --target and --ports."));
            }
            if flags.any_alert_flag() {
                return Err(usage_error("--status/--limit are only valid with alerts."));
            }
            Ok(AppCommand::Scan {
                devices: flags.require_devices("scan")?,
                target: flags.target,
                ports: flags.ports,
            })
        }
        "run" => {
            if flags.ports.is_some() || flags.any_alert_flag() {
                return Err(usage_error("run does not accept --ports, --status or --limit."));
            }
            let operation = match (positionals.as_slice(), flags.commands.is_empty()) {
                ([], false) => None,
                ([name], true) => Some(name.clone()),
                ([], true) => {
                    return Err(usage_error("run requires <OPERATION> or at least one --command."));
                }
                ([_], false) => {
                    return Err(usage_error("Use either <OPERATION> or --command, not both."));
                }
                _ => return Err(usage_error("run takes a single <OPERATION>.")),
            };
            Ok(AppCommand::Run {
                operation,
                devices: flags.require_devices("run")?,
                target: flags.target,
                commands: flags.commands,
                extra_vars: flags.extra_vars,
            })
        }
        "alerts" => {
            if !positionals.is_empty() || flags.any_device_flag() {
                return Err(usage_error("alerts only accepts --status and --limit."));
            }
            Ok(AppCommand::Alerts {
                status: flags.status,
                limit: flags.limit.unwrap_or(DEFAULT_ALERT_LIMIT),
            })
        }
        "ack" | "resolve" => {
            if flags.any_device_flag() || flags.any_alert_flag() {
                return Err(usage_error(format!("{} takes only <ALERT_ID>.", command)));
            }
            let id = single_positional(&positionals, &command)?;
            Ok(if command == "ack" {
                AppCommand::Ack { id }
            } else {
                AppCommand::Resolve { id }
            })
        }
        other => {
            if !positionals.is_empty() || flags.any_device_flag() || flags.any_alert_flag() {
                return Err(usage_error(format!("{} takes no arguments.", other)));
            }
            Ok(match other {
                "overview" => AppCommand::Overview,
                "capabilities" => AppCommand::Capabilities,
                _ => AppCommand::Playbooks,
            })
        }
    }
}
