//! Value-table resolution.
//!
//! Builds the final build-input table: base CSV rows, override replacement,
//! indirect value rewrites (DML media, credential references, network
//! allocations), then one validation sweep that reports every failing item
//! at once. Any failure aborts without returning a table.

use crate::credentials::{self, CredentialService};
use crate::dml::DmlIndex;
use crate::errors::{EngineError, EngineResult};
use crate::metadata;
use crate::netalloc::{self, AllocAction};
use crate::table::{self, BuildValue};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// dataType tag marking a DML media reference.
pub const DML_TYPE: &str = "DML";
/// dataType tag marking a credential reference.
pub const CREDENTIAL_TYPE: &str = "Credential";
/// Prefix of the network-allocation tag `NETALLOCATION#<netName>#<action>`.
pub const NETALLOCATION_PREFIX: &str = "NETALLOCATION#";

/// Inputs to one resolution pass.
pub struct ResolveRequest<'a> {
    pub build_path: &'a Path,
    pub overrides_path: Option<&'a Path>,
    pub dml_index_path: Option<&'a Path>,
    pub credential_store: &'a Path,
    pub credential_key_ref: &'a str,
    pub network_ledger_path: Option<&'a Path>,
    pub skip_media_validation: bool,
    pub skip_credential_check: bool,
}

/// Resolve the full value table or fail with no table.
pub fn resolve(
    request: &ResolveRequest<'_>,
    credential_service: &dyn CredentialService,
) -> EngineResult<Vec<BuildValue>> {
    let mut rows = table::load_build_values(request.build_path)?;
    if rows.is_empty() {
        return Err(EngineError::input(format!(
            "no build values found under {}",
            request.build_path.display()
        )));
    }
    ensure_unique_keys(&rows, request.build_path)?;

    if let Some(overrides_path) = request.overrides_path {
        let overrides = table::load_value_file(overrides_path)?;
        ensure_unique_keys(&overrides, overrides_path)?;
        apply_overrides(&mut rows, overrides);
    }

    resolve_dml_rows(&mut rows, request)?;
    resolve_credential_rows(&mut rows, request, credential_service)?;
    resolve_netallocation_rows(&mut rows, request)?;
    validate_rows(&rows)?;

    Ok(rows)
}

/// Key-to-value lookup handed to the template renderer.
pub fn to_lookup(rows: &[BuildValue]) -> BTreeMap<String, String> {
    rows.iter()
        .map(|row| (row.key.clone(), row.value.clone()))
        .collect()
}

fn ensure_unique_keys(rows: &[BuildValue], source: &Path) -> EngineResult<()> {
    let mut seen = BTreeSet::new();
    for row in rows {
        if !seen.insert(row.key.as_str()) {
            return Err(EngineError::input(format!(
                "duplicate key '{}' in {}",
                row.key,
                source.display()
            )));
        }
    }
    Ok(())
}

/// An override row sharing a key fully supersedes the base row; rows with
/// new keys are appended.
fn apply_overrides(rows: &mut Vec<BuildValue>, overrides: Vec<BuildValue>) {
    for override_row in overrides {
        match rows.iter_mut().find(|row| row.key == override_row.key) {
            Some(row) => *row = override_row,
            None => rows.push(override_row),
        }
    }
}

fn resolve_dml_rows(rows: &mut [BuildValue], request: &ResolveRequest<'_>) -> EngineResult<()> {
    if !rows.iter().any(|row| row.data_type == DML_TYPE) {
        return Ok(());
    }
    let index_path = request.dml_index_path.ok_or_else(|| {
        EngineError::resolution(
            "table contains DML references but no DML index was supplied".to_string(),
        )
    })?;
    let index = DmlIndex::load(index_path)?;
    for row in rows.iter_mut().filter(|row| row.data_type == DML_TYPE) {
        let media_path = index
            .resolve_item(&row.value, request.skip_media_validation)
            .map_err(|err| {
                EngineError::resolution(format!("key '{}': {err}", row.key))
            })?;
        row.value = media_path.display().to_string();
        row.data_type = "folderPath".to_string();
    }
    Ok(())
}

fn resolve_credential_rows(
    rows: &mut [BuildValue],
    request: &ResolveRequest<'_>,
    credential_service: &dyn CredentialService,
) -> EngineResult<()> {
    for row in rows
        .iter_mut()
        .filter(|row| row.data_type == CREDENTIAL_TYPE)
    {
        let record_path: PathBuf = credentials::record_path(request.credential_store, &row.value);
        if !request.skip_credential_check {
            credential_service
                .decrypt(&record_path, request.credential_key_ref)
                .map_err(|err| {
                    EngineError::resolution(format!("key '{}': {err}", row.key))
                })?;
        }
        row.value = record_path.display().to_string();
    }
    Ok(())
}

fn resolve_netallocation_rows(
    rows: &mut [BuildValue],
    request: &ResolveRequest<'_>,
) -> EngineResult<()> {
    for row in rows
        .iter_mut()
        .filter(|row| row.data_type.starts_with(NETALLOCATION_PREFIX))
    {
        let tag = row.data_type.clone();
        let mut parts = tag.splitn(3, '#');
        let _prefix = parts.next();
        let net_name = parts.next().filter(|name| !name.is_empty());
        let action_token = parts.next().filter(|token| !token.is_empty());
        let (net_name, action_token) = match (net_name, action_token) {
            (Some(net_name), Some(action_token)) => (net_name, action_token),
            _ => {
                return Err(EngineError::resolution(format!(
                    "key '{}': malformed allocation tag '{tag}' (expected NETALLOCATION#<netName>#<action>)",
                    row.key
                )))
            }
        };
        let ledger_path = request.network_ledger_path.ok_or_else(|| {
            EngineError::resolution(format!(
                "key '{}' requests a network allocation but no ledger was supplied",
                row.key
            ))
        })?;
        let action = AllocAction::parse(action_token)
            .map_err(|err| EngineError::resolution(format!("key '{}': {err}", row.key)))?;
        row.value = netalloc::allocate(ledger_path, net_name, action)
            .map_err(|err| EngineError::resolution(format!("key '{}': {err}", row.key)))?;
        row.data_type = "ipv4".to_string();
    }
    Ok(())
}

fn validate_rows(rows: &[BuildValue]) -> EngineResult<()> {
    let mut failures = Vec::new();
    for row in rows.iter().filter(|row| row.data_type != CREDENTIAL_TYPE) {
        let result = metadata::validate(&row.value, &row.data_type)?;
        if !result.is_valid {
            failures.push(format!(
                "key '{}': '{}' is not a valid {}",
                row.key, row.value, row.data_type
            ));
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Validation(failures))
    }
}
