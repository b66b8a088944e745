//! Operations and the playbook catalog

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

struct BuiltIn {
    name: &'static str,
    description: &'static str,
    commands: &'static [&'static str],
}

const BUILT_INS: &[BuiltIn] = &[
    BuiltIn {
        name: "connectivity_test",
        description: "Test device connectivity",
        commands: &["echo 'Connection successful from {{ inventory_hostname }}'"],
    },
    BuiltIn {
        name: "system_info",
        description: "Gather system information",
        commands: &["hostname", "uname -a", "uptime"],
    },
    BuiltIn {
        name: "backup_config",
        description: "Backup device configuration",
        commands: &["show running-config"],
    },
];

/// What a job runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// A playbook for the runner tier. `commands` is the equivalent command
    /// set for the direct tier; custom playbooks have none.
    Playbook { name: String, commands: Vec<String> },
    /// Raw commands, run by the runner's ad hoc mode or directly.
    AdHoc { commands: Vec<String> },
}

impl Operation {
    /// Resolve a built-in operation name or a playbook file name.
    pub fn named(name: &str) -> Self {
        let name = name.trim();
        let stem = name
            .strip_suffix(".yml")
            .or_else(|| name.strip_suffix(".yaml"))
            .unwrap_or(name);
        match built_in(stem) {
            Some(built_in) => Operation::Playbook {
                name: format!("{}.yml", built_in.name),
                commands: built_in.commands.iter().map(|c| c.to_string()).collect(),
            },
            None if stem == name => Operation::Playbook {
                name: format!("{}.yml", name),
                commands: Vec::new(),
            },
            None => Operation::Playbook {
                name: name.to_string(),
                commands: Vec::new(),
            },
        }
    }

    pub fn ad_hoc(commands: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Operation::AdHoc {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// Label stored on the job record
    pub fn label(&self) -> String {
        match self {
            Operation::Playbook { name, .. } => name
                .strip_suffix(".yml")
                .unwrap_or(name.as_str())
                .to_string(),
            Operation::AdHoc { commands } => format!("adhoc: {}", commands.join(" && ")),
        }
    }

    /// Command set for the direct tier
    pub fn direct_commands(&self) -> &[String] {
        match self {
            Operation::Playbook { commands, .. } => commands,
            Operation::AdHoc { commands } => commands,
        }
    }
}

/// Replace `{{ key }}` placeholders from `params`, plus the per-device
/// `inventory_hostname`. Unknown placeholders are left as written.
pub fn render_command(command: &str, hostname: &str, params: &Map<String, Value>) -> String {
    let mut rendered = String::with_capacity(command.len());
    let mut rest = command;

    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start..].find("}}") else {
            break;
        };
        let end = start + end;
        let key = rest[start + 2..end].trim();

        rendered.push_str(&rest[..start]);
        let replacement = match key {
            "inventory_hostname" => Some(hostname.to_string()),
            _ => params.get(key).map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        };
        match replacement {
            Some(value) => rendered.push_str(&value),
            None => rendered.push_str(&rest[start..end + 2]),
        }
        rest = &rest[end + 2..];
    }

    rendered.push_str(rest);
    rendered
}

/// One play as the runner reads it
#[derive(Debug, Serialize)]
struct PlaybookPlay<'a> {
    name: &'a str,
    hosts: &'a str,
    gather_facts: bool,
    tasks: Vec<PlaybookTask>,
}

#[derive(Debug, Serialize)]
struct PlaybookTask {
    name: String,
    raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    register: Option<String>,
}

fn built_in(stem: &str) -> Option<&'static BuiltIn> {
    BUILT_INS.iter().find(|b| b.name == stem)
}

fn is_built_in_file(file_name: &str) -> bool {
    file_name
        .strip_suffix(".yml")
        .and_then(built_in)
        .is_some()
}

/// YAML for a built-in: one play over every host, one `raw` task per command.
fn render_builtin_playbook(built_in: &BuiltIn) -> Result<String> {
    let tasks = built_in
        .commands
        .iter()
        .enumerate()
        .map(|(index, command)| PlaybookTask {
            name: format!("{} ({})", built_in.description, index + 1),
            raw: command.to_string(),
            register: (built_in.name == "backup_config").then(|| "running_config".to_string()),
        })
        .collect();
    let plays = [PlaybookPlay {
        name: built_in.description,
        hosts: "all",
        gather_facts: false,
        tasks,
    }];
    serde_yaml::to_string(&plays)
        .with_context(|| format!("Failed to render playbook {}", built_in.name))
}

/// Write `<name>.yml` for every built-in into `dir`, creating the directory.
/// Existing files are left alone, so an operator's edits survive. Returns
/// the files written.
pub fn write_builtin_playbooks(dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create playbook directory {}", dir.display()))?;

    let mut written = Vec::new();
    for built_in in BUILT_INS {
        let path = dir.join(format!("{}.yml", built_in.name));
        if path.exists() {
            continue;
        }
        std::fs::write(&path, render_builtin_playbook(built_in)?)
            .with_context(|| format!("Failed to write playbook {}", path.display()))?;
        crate::log_debug!("Wrote built-in playbook {}", path.display());
        written.push(path);
    }
    Ok(written)
}

/// Make sure a built-in playbook named `file_name` exists in `dir` before
/// the runner is handed its path. Custom playbooks are never created.
pub fn ensure_builtin_playbook(dir: &Path, file_name: &str) -> Result<()> {
    if is_built_in_file(file_name) && !dir.join(file_name).is_file() {
        write_builtin_playbooks(dir)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaybookInfo {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
    pub built_in: bool,
}

/// List playbooks in `dir` (skipping temporary `temp_*` files) followed by
/// built-ins that have no file of their own.
pub fn list_playbooks(dir: &Path) -> Result<Vec<PlaybookInfo>> {
    let mut playbooks = Vec::new();

    if dir.is_dir() {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read playbook directory {}", dir.display()))?;
        for entry in entries {
            let path = entry.context("Failed to read playbook directory entry")?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let is_yaml = file_name.ends_with(".yml") || file_name.ends_with(".yaml");
            if !is_yaml || file_name.starts_with("temp_") || !path.is_file() {
                continue;
            }
            playbooks.push(PlaybookInfo {
                name: file_name.to_string(),
                description: playbook_description(&path),
                built_in: is_built_in_file(file_name),
                path,
            });
        }
    }

    for built_in in BUILT_INS {
        let file_name = format!("{}.yml", built_in.name);
        if !playbooks.iter().any(|p| p.name == file_name) {
            playbooks.push(PlaybookInfo {
                name: file_name.clone(),
                description: built_in.description.to_string(),
                path: dir.join(&file_name),
                built_in: true,
            });
        }
    }

    playbooks.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(playbooks)
}

// The first play's `name`, or empty when the file doesn't parse.
fn playbook_description(path: &Path) -> String {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return String::new();
    };
    match serde_yaml::from_str::<serde_yaml::Value>(&raw) {
        Ok(serde_yaml::Value::Sequence(plays)) => plays
            .first()
            .and_then(|play| play.get("name"))
            .and_then(|name| name.as_str())
            .unwrap_or_default()
            .to_string(),
        Ok(_) => String::new(),
        Err(e) => {
            crate::log_debug!("Playbook {} is not valid YAML: {}", path.display(), e);
            String::new()
        }
    }
}
