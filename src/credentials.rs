//! Credential service boundary.
//!
//! The engine only needs two operations at this seam: a decrypt used as a
//! smoke test during value-table resolution, and an encrypt used by the CLI
//! to seed a store. Real encryption backends implement [`CredentialService`];
//! the default store is a plain file format suitable for labs and tests.

use crate::errors::{EngineError, EngineResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Stored credential record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub key_ref: String,
    pub payload: String,
}

/// Decrypt/encrypt contract the resolver and CLI depend on.
pub trait CredentialService {
    fn decrypt(&self, path: &Path, key_ref: &str) -> EngineResult<String>;
    fn encrypt(&self, credential: &str, key_ref: &str) -> EngineResult<CredentialRecord>;
}

/// File-backed store: one JSON record per credential, payload base64-coded.
/// This is deliberately not cryptography; it exists so the resolution smoke
/// test and round trips have a concrete backend.
pub struct FileCredentialStore;

impl CredentialService for FileCredentialStore {
    fn decrypt(&self, path: &Path, key_ref: &str) -> EngineResult<String> {
        let text = fs::read_to_string(path).map_err(|err| {
            EngineError::resolution(format!(
                "read credential record {}: {err}",
                path.display()
            ))
        })?;
        let record: CredentialRecord = serde_json::from_str(&text).map_err(|err| {
            EngineError::resolution(format!(
                "parse credential record {}: {err}",
                path.display()
            ))
        })?;
        if record.key_ref != key_ref {
            return Err(EngineError::resolution(format!(
                "credential record {} was stored under key '{}', not '{key_ref}'",
                path.display(),
                record.key_ref
            )));
        }
        let bytes = BASE64.decode(record.payload.as_bytes()).map_err(|err| {
            EngineError::resolution(format!(
                "decode credential record {}: {err}",
                path.display()
            ))
        })?;
        String::from_utf8(bytes).map_err(|_| {
            EngineError::resolution(format!(
                "credential record {} is not valid UTF-8",
                path.display()
            ))
        })
    }

    fn encrypt(&self, credential: &str, key_ref: &str) -> EngineResult<CredentialRecord> {
        Ok(CredentialRecord {
            key_ref: key_ref.to_string(),
            payload: BASE64.encode(credential.as_bytes()),
        })
    }
}

/// Write a record into the store under `<store>/<name>.json`.
pub fn write_record(store_dir: &Path, name: &str, record: &CredentialRecord) -> EngineResult<std::path::PathBuf> {
    fs::create_dir_all(store_dir).map_err(|err| {
        EngineError::input(format!("create {}: {err}", store_dir.display()))
    })?;
    let path = record_path(store_dir, name);
    let text = serde_json::to_string_pretty(record)
        .map_err(|err| EngineError::input(format!("serialize credential record: {err}")))?;
    fs::write(&path, text)
        .map_err(|err| EngineError::input(format!("write {}: {err}", path.display())))?;
    Ok(path)
}

/// Absolute path of a named record inside the store.
pub fn record_path(store_dir: &Path, name: &str) -> std::path::PathBuf {
    store_dir.join(format!("{name}.json"))
}
