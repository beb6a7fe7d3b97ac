//! Stage document rendering.
//!
//! A stage document is a JSON array of parameter objects whose values may
//! contain `##key##` placeholder tags. Tags are resolved against the value
//! table line by line before the document is parsed structurally, so an
//! unresolved key fails with its file and line rather than as a JSON error.
//!
//! The tag grammar is the strict one: repeated, non-nested, non-greedy,
//! case-sensitive `##...##` pairs, zero or more per line.

use crate::errors::{EngineError, EngineResult};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// One parsed stage: an ordered unit of work.
#[derive(Debug, Clone)]
pub struct StageTemplate {
    pub sequence_id: u32,
    pub function_name: String,
    pub source_file: String,
    pub objects: Vec<ObjectSpec>,
}

/// Ordered parameter pairs for one action invocation within a stage.
#[derive(Debug, Clone)]
pub struct ObjectSpec {
    pub params: Vec<(String, String)>,
}

/// A placeholder discovered by static analysis, without rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderRef {
    pub name: String,
    pub function_name: String,
    pub sequence_id: u32,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"##([A-Za-z0-9_.:-]+?)##").expect("valid placeholder regex"))
}

/// Split `{sequenceId}${functionName}.{ext}` into its components.
pub fn parse_stage_name(filename: &str) -> EngineResult<(u32, String)> {
    let (seq_token, rest) = filename.split_once('$').ok_or_else(|| {
        EngineError::template(
            filename,
            "file name must follow {sequenceId}${functionName}.{ext}",
        )
    })?;
    let sequence_id = seq_token.parse::<u32>().map_err(|_| {
        EngineError::template(
            filename,
            format!("sequence id '{seq_token}' is not a number"),
        )
    })?;
    let function_name = match rest.split_once('.') {
        Some((name, _ext)) => name,
        None => rest,
    };
    if function_name.is_empty() {
        return Err(EngineError::template(filename, "function name is empty"));
    }
    Ok((sequence_id, function_name.to_string()))
}

/// Render `document` against `value_table` and parse it into a stage.
///
/// Fails on the first unresolved placeholder in file order, before any
/// structural parse is attempted.
pub fn parse_stage(
    document: &str,
    filename: &str,
    value_table: &BTreeMap<String, String>,
) -> EngineResult<StageTemplate> {
    let (sequence_id, function_name) = parse_stage_name(filename)?;
    let rendered = render_document(document, filename, value_table)?;
    // One document-wide pass so literal backslashes (Windows paths from the
    // value table) survive the JSON parse below.
    let escaped = rendered.replace('\\', "\\\\");
    let objects = parse_objects(&escaped, filename)?;
    Ok(StageTemplate {
        sequence_id,
        function_name,
        source_file: filename.to_string(),
        objects,
    })
}

/// Tag discovery without substitution, for static analysis of which keys a
/// stage requires.
pub fn extract_placeholders(document: &str, filename: &str) -> EngineResult<Vec<PlaceholderRef>> {
    let (sequence_id, function_name) = parse_stage_name(filename)?;
    let mut seen = Vec::new();
    for line in document.lines() {
        for capture in placeholder_regex().captures_iter(line) {
            let name = capture[1].to_string();
            if seen.iter().any(|existing: &PlaceholderRef| existing.name == name) {
                continue;
            }
            seen.push(PlaceholderRef {
                name,
                function_name: function_name.clone(),
                sequence_id,
            });
        }
    }
    Ok(seen)
}

fn render_document(
    document: &str,
    filename: &str,
    value_table: &BTreeMap<String, String>,
) -> EngineResult<String> {
    let regex = placeholder_regex();
    let mut out = String::with_capacity(document.len());
    for (index, line) in document.lines().enumerate() {
        let mut cursor = 0;
        for capture in regex.captures_iter(line) {
            let full = capture.get(0).expect("match range");
            let key = &capture[1];
            let value = value_table.get(key).ok_or_else(|| {
                EngineError::template(
                    filename,
                    format!(
                        "unresolved placeholder '{key}' on line {}",
                        index + 1
                    ),
                )
            })?;
            out.push_str(&line[cursor..full.start()]);
            out.push_str(value);
            cursor = full.end();
        }
        out.push_str(&line[cursor..]);
        out.push('\n');
    }
    Ok(out)
}

fn parse_objects(rendered: &str, filename: &str) -> EngineResult<Vec<ObjectSpec>> {
    let value: serde_json::Value = serde_json::from_str(rendered)
        .map_err(|err| EngineError::template(filename, format!("rendered document: {err}")))?;
    let items = value.as_array().ok_or_else(|| {
        EngineError::template(filename, "rendered document must be a JSON array of objects")
    })?;
    let mut objects = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let map = item.as_object().ok_or_else(|| {
            EngineError::template(filename, format!("entry {} is not an object", index + 1))
        })?;
        let mut params = Vec::with_capacity(map.len());
        for (name, raw) in map {
            let text = match raw {
                serde_json::Value::String(text) => text.clone(),
                serde_json::Value::Number(number) => number.to_string(),
                serde_json::Value::Bool(flag) => flag.to_string(),
                serde_json::Value::Null => String::new(),
                other => {
                    return Err(EngineError::template(
                        filename,
                        format!(
                            "parameter '{name}' in entry {} must be a scalar, found {other}",
                            index + 1
                        ),
                    ))
                }
            };
            params.push((name.clone(), text));
        }
        objects.push(ObjectSpec { params });
    }
    Ok(objects)
}
