use crate::models::{CONTROL_SUFFIX, FORWARDING_SUFFIX};

/// Lab tag implied by a device name ("lab1-r1" -> "lab1")
pub fn lab_of(name: &str) -> Option<String> {
    match name.split_once('-') {
        Some((lab, rest)) if !lab.is_empty() && !rest.is_empty() => Some(lab.to_string()),
        _ => None,
    }
}

/// Whether `name` belongs to `lab` by the "<lab>-" prefix convention
pub fn in_lab(name: &str, lab: &str) -> bool {
    name.strip_prefix(lab)
        .map(|rest| rest.starts_with('-'))
        .unwrap_or(false)
}

/// Split a constituent VM id into its composite base name, if it carries a
/// control or forwarding suffix ("sw1-re" -> "sw1")
pub fn composite_base(vm_id: &str) -> Option<&str> {
    [CONTROL_SUFFIX, FORWARDING_SUFFIX]
        .iter()
        .find_map(|suffix| vm_id.strip_suffix(suffix))
        .filter(|base| !base.is_empty())
}

pub fn control_unit_id(name: &str) -> String {
    format!("{}{}", name, CONTROL_SUFFIX)
}

pub fn forwarding_unit_id(name: &str) -> String {
    format!("{}{}", name, FORWARDING_SUFFIX)
}

/// Validate an IPv4 address (e.g., "192.168.1.1").
/// Returns true if the string is a valid dotted-decimal IPv4 address.
pub fn is_valid_ipv4(ip: &str) -> bool {
    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|p| p.parse::<u8>().is_ok())
}

/// Validate a device or lab name.
/// Allows alphanumeric, hyphens, dots, and underscores. No path separators or shell metacharacters,
/// since the name ends up as a provisioning script argument and a disk image filename.
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }
    if name.starts_with('-') || name.starts_with('.') {
        return false;
    }
    name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
}
