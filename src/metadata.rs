//! Pure type-checking rules for scalar build values.
//!
//! A failed check is a normal, reportable outcome (`is_valid = false`); the
//! resolver aggregates failures across the whole table and fails once. Only
//! an unrecognized dataType tag is fatal here.

use crate::errors::{EngineError, EngineResult};
use std::path::Path;

/// Outcome of checking one value against one dataType rule. Ephemeral; never
/// persisted.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub data_item: String,
    pub data_type: String,
    pub is_valid: bool,
}

/// Check `value` against the rule for `data_type`.
///
/// Returns `Err(UnsupportedType)` for a tag outside the closed set; that is
/// a caller bug or a corrupt source, not a failed validation.
pub fn validate(value: &str, data_type: &str) -> EngineResult<ValidationResult> {
    let is_valid = match data_type {
        "FQDN" => is_fqdn(value),
        "string" => !value.trim().is_empty(),
        "ipv4" => is_ipv4(value),
        "ipv4MaskLength" => is_mask_length(value),
        "nsxtTransportType" => matches!(value, "OVERLAY" | "VLAN"),
        "CIDR" => is_cidr(value),
        "vcsaAppSize" => matches!(value, "tiny" | "small" | "medium" | "large"),
        "folderPath" => Path::new(value).exists(),
        _ => {
            return Err(EngineError::UnsupportedType {
                data_item: value.to_string(),
                data_type: data_type.to_string(),
            })
        }
    };
    Ok(ValidationResult {
        data_item: value.to_string(),
        data_type: data_type.to_string(),
        is_valid,
    })
}

fn is_fqdn(value: &str) -> bool {
    let len = value.len();
    if !(4..=253).contains(&len) {
        return false;
    }
    if !value.contains('.') {
        return false;
    }
    value.split('.').all(is_hostname_label)
}

fn is_hostname_label(label: &str) -> bool {
    if label.is_empty() || label.len() > 63 {
        return false;
    }
    if label.starts_with('-') || label.ends_with('-') {
        return false;
    }
    label
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
}

fn is_ipv4(value: &str) -> bool {
    let octets: Vec<&str> = value.split('.').collect();
    if octets.len() != 4 {
        return false;
    }
    octets.iter().all(|octet| is_octet(octet))
}

fn is_octet(text: &str) -> bool {
    if text.is_empty() || text.len() > 3 || !text.chars().all(|ch| ch.is_ascii_digit()) {
        return false;
    }
    match text.parse::<u16>() {
        Ok(n) => n <= 255,
        Err(_) => false,
    }
}

fn is_mask_length(value: &str) -> bool {
    match value.parse::<u8>() {
        Ok(n) => n <= 32,
        Err(_) => false,
    }
}

fn is_cidr(value: &str) -> bool {
    match value.split_once('/') {
        Some((addr, prefix)) => is_ipv4(addr) && !prefix.is_empty() && is_mask_length(prefix),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(value: &str, data_type: &str) -> bool {
        validate(value, data_type).expect("supported type").is_valid
    }

    #[test]
    fn ipv4_accepts_valid_octets() {
        assert!(check("1.2.3.4", "ipv4"));
        assert!(check("0.0.0.0", "ipv4"));
        assert!(check("255.255.255.255", "ipv4"));
    }

    #[test]
    fn ipv4_rejects_out_of_range_and_malformed() {
        assert!(!check("1.2.3.400", "ipv4"));
        assert!(!check("1.2.3", "ipv4"));
        assert!(!check("1.2.3.4.5", "ipv4"));
        assert!(!check("1.2.3.", "ipv4"));
        assert!(!check("a.b.c.d", "ipv4"));
    }

    #[test]
    fn fqdn_accepts_dotted_hostnames() {
        assert!(check("host.example.com", "FQDN"));
        assert!(check("a.bc", "FQDN"));
    }

    #[test]
    fn fqdn_rejects_bad_labels() {
        assert!(!check("bad_host", "FQDN"));
        assert!(!check("-host.example.com", "FQDN"));
        assert!(!check("host-.example.com", "FQDN"));
        assert!(!check("a.b", "FQDN"));
        assert!(!check("host..example.com", "FQDN"));
    }

    #[test]
    fn vcsa_app_size_is_closed_set() {
        assert!(check("large", "vcsaAppSize"));
        assert!(check("tiny", "vcsaAppSize"));
        assert!(!check("xl", "vcsaAppSize"));
        assert!(!check("Large", "vcsaAppSize"));
    }

    #[test]
    fn mask_length_and_cidr_bounds() {
        assert!(check("0", "ipv4MaskLength"));
        assert!(check("32", "ipv4MaskLength"));
        assert!(!check("33", "ipv4MaskLength"));
        assert!(!check("-1", "ipv4MaskLength"));
        assert!(check("10.0.0.0/24", "CIDR"));
        assert!(!check("10.0.0.0/33", "CIDR"));
        assert!(!check("10.0.0.0", "CIDR"));
    }

    #[test]
    fn transport_type_is_case_sensitive() {
        assert!(check("OVERLAY", "nsxtTransportType"));
        assert!(check("VLAN", "nsxtTransportType"));
        assert!(!check("overlay", "nsxtTransportType"));
    }

    #[test]
    fn string_rejects_whitespace_only() {
        assert!(check("x", "string"));
        assert!(!check("   ", "string"));
        assert!(!check("", "string"));
    }

    #[test]
    fn folder_path_checks_existence() {
        let dir = tempfile::tempdir().expect("create temp dir");
        assert!(check(&dir.path().display().to_string(), "folderPath"));
        assert!(!check(
            &dir.path().join("missing").display().to_string(),
            "folderPath"
        ));
    }

    #[test]
    fn unsupported_type_is_fatal() {
        let err = validate("x", "uuid").expect_err("must fail");
        assert!(matches!(
            err,
            crate::errors::EngineError::UnsupportedType { .. }
        ));
    }
}
