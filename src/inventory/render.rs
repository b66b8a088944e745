//! Runner inventory rendering (YAML)

use super::{InventoryError, TargetSet, network_os};
use serde_yaml::{Mapping, Value};

fn key(s: &str) -> Value {
    Value::String(s.to_string())
}

/// Render the inventory document consumed by the automation runner.
///
/// Layout: `all.hosts.<hostname>` carries connection vars, and
/// `all.children.<role group>.hosts` lists members. Every device appears in
/// exactly one role group, `unknown` included.
pub fn render_inventory(targets: &TargetSet) -> Result<String, InventoryError> {
    let mut hosts = Mapping::new();
    for device in targets {
        let mut vars = Mapping::new();
        vars.insert(key("ansible_host"), key(&device.host));
        vars.insert(key("ansible_port"), Value::from(device.port));
        vars.insert(key("ansible_user"), key(device.credentials.username()));
        vars.insert(key("ansible_password"), key(device.credentials.password()));
        vars.insert(
            key("ansible_network_os"),
            key(network_os(&device.role_label, device.vendor.as_deref())),
        );
        vars.insert(key("device_role"), key(device.role.as_str()));
        vars.insert(
            key("device_tags"),
            Value::Sequence(device.tags.iter().map(|t| key(t)).collect()),
        );
        if let Some(vendor) = &device.vendor {
            vars.insert(key("device_vendor"), key(vendor));
        }
        hosts.insert(key(&device.hostname), Value::Mapping(vars));
    }

    let mut children = Mapping::new();
    for (role, members) in targets.groups() {
        let mut group_hosts = Mapping::new();
        for device in members {
            group_hosts.insert(key(&device.hostname), Value::Mapping(Mapping::new()));
        }
        let mut group = Mapping::new();
        group.insert(key("hosts"), Value::Mapping(group_hosts));
        children.insert(key(role.group_name()), Value::Mapping(group));
    }

    let mut all_vars = Mapping::new();
    all_vars.insert(key("ansible_connection"), key("ssh"));
    all_vars.insert(
        key("ansible_ssh_common_args"),
        key("-o StrictHostKeyChecking=no"),
    );
    all_vars.insert(key("ansible_host_key_checking"), Value::Bool(false));

    let mut all = Mapping::new();
    all.insert(key("hosts"), Value::Mapping(hosts));
    all.insert(key("vars"), Value::Mapping(all_vars));
    all.insert(key("children"), Value::Mapping(children));

    let mut root = Mapping::new();
    root.insert(key("all"), Value::Mapping(all));

    Ok(serde_yaml::to_string(&Value::Mapping(root))?)
}
