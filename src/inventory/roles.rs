//! Role synonym table and network OS mapping

use crate::models::DeviceRole;

/// Exact synonyms, checked after normalizing case and separators.
const ROLE_SYNONYMS: &[(&str, DeviceRole)] = &[
    ("router", DeviceRole::Router),
    ("routers", DeviceRole::Router),
    ("cisco_ios", DeviceRole::Router),
    ("cisco_xe", DeviceRole::Router),
    ("cisco_xr", DeviceRole::Router),
    ("ios", DeviceRole::Router),
    ("iosxr", DeviceRole::Router),
    ("juniper", DeviceRole::Router),
    ("junos", DeviceRole::Router),
    ("mikrotik", DeviceRole::Router),
    ("vyos", DeviceRole::Router),
    ("edge", DeviceRole::Router),
    ("core", DeviceRole::Router),
    ("switch", DeviceRole::Switch),
    ("switches", DeviceRole::Switch),
    ("cisco_nxos", DeviceRole::Switch),
    ("nxos", DeviceRole::Switch),
    ("arista", DeviceRole::Switch),
    ("eos", DeviceRole::Switch),
    ("cumulus", DeviceRole::Switch),
    ("access", DeviceRole::Switch),
    ("distribution", DeviceRole::Switch),
    ("firewall", DeviceRole::Firewall),
    ("firewalls", DeviceRole::Firewall),
    ("cisco_asa", DeviceRole::Firewall),
    ("asa", DeviceRole::Firewall),
    ("fortinet", DeviceRole::Firewall),
    ("fortigate", DeviceRole::Firewall),
    ("palo_alto", DeviceRole::Firewall),
    ("paloalto", DeviceRole::Firewall),
    ("pfsense", DeviceRole::Firewall),
    ("server", DeviceRole::Server),
    ("servers", DeviceRole::Server),
    ("linux", DeviceRole::Server),
    ("windows", DeviceRole::Server),
    ("ubuntu", DeviceRole::Server),
    ("host", DeviceRole::Server),
    ("vm", DeviceRole::Server),
];

/// Keyword fallback for labels like `core-router-01` or `l3_switch`.
const ROLE_KEYWORDS: &[(&str, DeviceRole)] = &[
    ("firewall", DeviceRole::Firewall),
    ("asa", DeviceRole::Firewall),
    ("router", DeviceRole::Router),
    ("switch", DeviceRole::Switch),
    ("server", DeviceRole::Server),
];

/// Ordered: the first matching key wins.
const NETWORK_OS_MAP: &[(&str, &str)] = &[
    ("cisco_xr", "iosxr"),
    ("iosxr", "iosxr"),
    ("cisco_nxos", "nxos"),
    ("nxos", "nxos"),
    ("cisco_asa", "asa"),
    ("asa", "asa"),
    ("cisco_xe", "ios"),
    ("cisco_ios", "ios"),
    ("juniper", "junos"),
    ("junos", "junos"),
    ("arista", "eos"),
    ("comware", "comware"),
    ("hp", "comware"),
    ("dell", "dellos10"),
];

pub const DEFAULT_NETWORK_OS: &str = "ios";

fn normalize_label(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

/// Lowercase alphanumeric runs: `Cisco-ASA 5506` becomes `[cisco, asa, 5506]`.
fn tokens(label: &str) -> Vec<String> {
    label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

/// True when every token of `key` appears, in order and adjacent, in
/// `label_tokens`. Substrings inside a token never match.
fn has_token_run(label_tokens: &[String], key: &str) -> bool {
    let key_tokens = tokens(key);
    if key_tokens.is_empty() || key_tokens.len() > label_tokens.len() {
        return false;
    }
    label_tokens
        .windows(key_tokens.len())
        .any(|window| window == key_tokens.as_slice())
}

/// Map a free-form role label onto a [`DeviceRole`].
///
/// Never fails: anything unrecognized lands in [`DeviceRole::Unknown`].
pub fn normalize_role(label: &str) -> DeviceRole {
    let normalized = normalize_label(label);
    if normalized.is_empty() {
        return DeviceRole::Unknown;
    }

    if let Some((_, role)) = ROLE_SYNONYMS.iter().find(|(k, _)| *k == normalized) {
        return *role;
    }

    let label_tokens = tokens(&normalized);
    ROLE_KEYWORDS
        .iter()
        .find(|(k, _)| has_token_run(&label_tokens, k))
        .map(|(_, role)| *role)
        .unwrap_or(DeviceRole::Unknown)
}

/// Network OS for the runner inventory, derived from the role label and
/// then the vendor.
pub fn network_os(role_label: &str, vendor: Option<&str>) -> &'static str {
    let candidates = [Some(role_label), vendor];
    for candidate in candidates.into_iter().flatten() {
        let label_tokens = tokens(candidate);
        if let Some((_, os)) = NETWORK_OS_MAP
            .iter()
            .find(|(k, _)| has_token_run(&label_tokens, k))
        {
            return os;
        }
    }
    DEFAULT_NETWORK_OS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synonyms_share_a_group() {
        assert_eq!(normalize_role("cisco_ios"), DeviceRole::Router);
        assert_eq!(normalize_role("Router"), DeviceRole::Router);
        assert_eq!(normalize_role("Cisco-ASA"), DeviceRole::Firewall);
        assert_eq!(normalize_role("arista"), DeviceRole::Switch);
    }

    #[test]
    fn keyword_fallback_and_unknown_bucket() {
        assert_eq!(normalize_role("core-router-01"), DeviceRole::Router);
        assert_eq!(normalize_role("l3 switch"), DeviceRole::Switch);
        assert_eq!(normalize_role("toaster"), DeviceRole::Unknown);
        assert_eq!(normalize_role(""), DeviceRole::Unknown);
    }

    #[test]
    fn network_os_mapping() {
        assert_eq!(network_os("cisco_xr", None), "iosxr");
        assert_eq!(network_os("cisco_nxos", None), "nxos");
        assert_eq!(network_os("router", Some("Juniper")), "junos");
        assert_eq!(network_os("switch", Some("arista")), "eos");
        assert_eq!(network_os("unknown", None), DEFAULT_NETWORK_OS);
    }

    #[test]
    fn network_os_matches_whole_tokens_only() {
        assert_eq!(network_os("php-server", None), DEFAULT_NETWORK_OS);
        assert_eq!(network_os("nasa-gw", None), DEFAULT_NETWORK_OS);
        assert_eq!(network_os("edge", Some("HP ProCurve")), "comware");
        assert_eq!(network_os("Cisco-ASA-5506", None), "asa");
        assert_eq!(network_os("lab cisco xr 01", None), "iosxr");
    }

    #[test]
    fn role_keywords_ignore_embedded_substrings() {
        assert_eq!(normalize_role("nasa-gw"), DeviceRole::Unknown);
        assert_eq!(normalize_role("dc1-asa-02"), DeviceRole::Firewall);
        assert_eq!(normalize_role("serverless"), DeviceRole::Unknown);
        assert_eq!(normalize_role("app_server_3"), DeviceRole::Server);
    }
}
