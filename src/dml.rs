//! Definitive Media Library lookups.
//!
//! The index maps item numbers to media paths plus the digest the media must
//! match. Paths are stored relative to the index file's directory.

use crate::errors::{EngineError, EngineResult};
use crate::table::{self, DmlIndexEntry};
use crate::util::sha256_hex;
use std::fs;
use std::path::{Path, PathBuf};

/// Loaded DML index, anchored at the directory the index file lives in.
pub struct DmlIndex {
    base_dir: PathBuf,
    entries: Vec<DmlIndexEntry>,
}

impl DmlIndex {
    pub fn load(index_path: &Path) -> EngineResult<Self> {
        let entries = table::load_dml_index(index_path)?;
        let base_dir = index_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(DmlIndex { base_dir, entries })
    }

    /// Resolve an item number to the absolute media path, verifying the
    /// stored SHA256 unless `skip_verification` is set. Any miss or mismatch
    /// is a resolution error; no partial result is returned.
    pub fn resolve_item(&self, item_number: &str, skip_verification: bool) -> EngineResult<PathBuf> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.item_number == item_number)
            .ok_or_else(|| {
                EngineError::resolution(format!(
                    "DML item '{item_number}' not found in index"
                ))
            })?;
        let media_path = self.base_dir.join(&entry.path);
        if skip_verification {
            return Ok(media_path);
        }
        let bytes = fs::read(&media_path).map_err(|err| {
            EngineError::resolution(format!(
                "read DML media {} for item '{item_number}': {err}",
                media_path.display()
            ))
        })?;
        let actual = sha256_hex(&bytes);
        if !actual.eq_ignore_ascii_case(&entry.sha256) {
            return Err(EngineError::resolution(format!(
                "DML item '{item_number}' digest mismatch for {}: index has {}, media has {actual}",
                media_path.display(),
                entry.sha256
            )));
        }
        Ok(media_path)
    }
}
