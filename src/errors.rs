//! Typed error taxonomy for the workflow engine.
//!
//! Expected, reportable failures (validation, resolution) are distinct
//! variants so callers decide policy; the sequencer's fail-fast abort is a
//! deliberate choice rather than a side effect of the error mechanism.

/// Errors produced by the engine core. Every message names the offending
/// file, key, or value so the input can be located without a debugger.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing or malformed source files (CSV sources, ledger, stage dir).
    #[error("input error: {0}")]
    Input(String),

    /// DML or credential lookup failure, hash mismatch, bad indirect tag.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// One or more metadata items failed their type rules, reported in
    /// aggregate after the whole table has been checked.
    #[error("validation failed for {} item(s): {}", .0.len(), .0.join("; "))]
    Validation(Vec<String>),

    /// Unresolved placeholder or malformed rendered stage document.
    #[error("template error in {file}: {message}")]
    Template { file: String, message: String },

    /// Unknown network or exhausted address pool.
    #[error("allocation error: {0}")]
    Allocation(String),

    /// An action-provider invocation failed; the run aborts.
    #[error("action '{function}' failed: {message}")]
    Action { function: String, message: String },

    /// A dataType tag outside the validator's closed set. Fatal, unlike a
    /// failed validation.
    #[error("unsupported data type '{data_type}' for item '{data_item}'")]
    UnsupportedType { data_item: String, data_type: String },
}

/// Result alias used throughout the engine core.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn input(message: impl Into<String>) -> Self {
        EngineError::Input(message.into())
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        EngineError::Resolution(message.into())
    }

    pub fn allocation(message: impl Into<String>) -> Self {
        EngineError::Allocation(message.into())
    }

    pub fn template(file: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Template {
            file: file.into(),
            message: message.into(),
        }
    }
}
