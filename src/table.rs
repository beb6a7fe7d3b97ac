//! CSV sources for the value table and the DML index.
//!
//! The sources are plain four-column CSV with a header row; fields may be
//! double-quoted, with `""` escaping inside quotes. Nothing fancier than
//! that is accepted.

use crate::errors::{EngineError, EngineResult};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// One resolved (or to-be-resolved) build input row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildValue {
    pub key: String,
    pub value: String,
    pub data_type: String,
    pub description: String,
}

/// One immutable DML index row; `path` is relative to the index file's
/// directory.
#[derive(Debug, Clone)]
pub struct DmlIndexEntry {
    pub item_number: String,
    pub path: String,
    pub sha256: String,
}

const VALUE_HEADER: [&str; 4] = ["key", "value", "dataType", "description"];
const DML_HEADER: [&str; 3] = ["itemNumber", "path", "sha256"];

/// Load base build-value rows. `build_path` may be a single CSV file or a
/// directory whose `*.csv` files are concatenated in name order.
pub fn load_build_values(build_path: &Path) -> EngineResult<Vec<BuildValue>> {
    let mut rows = Vec::new();
    if build_path.is_file() {
        rows.extend(load_value_file(build_path)?);
    } else if build_path.is_dir() {
        for file in csv_files_sorted(build_path)? {
            rows.extend(load_value_file(&file)?);
        }
    } else {
        return Err(EngineError::input(format!(
            "build path {} does not exist",
            build_path.display()
        )));
    }
    Ok(rows)
}

/// Load one build-value CSV file.
pub fn load_value_file(path: &Path) -> EngineResult<Vec<BuildValue>> {
    let records = read_csv(path, &VALUE_HEADER)?;
    Ok(records
        .into_iter()
        .map(|fields| BuildValue {
            key: fields[0].clone(),
            value: fields[1].clone(),
            data_type: fields[2].clone(),
            description: fields[3].clone(),
        })
        .collect())
}

/// Load the DML index CSV.
pub fn load_dml_index(path: &Path) -> EngineResult<Vec<DmlIndexEntry>> {
    let records = read_csv(path, &DML_HEADER)?;
    Ok(records
        .into_iter()
        .map(|fields| DmlIndexEntry {
            item_number: fields[0].clone(),
            path: fields[1].clone(),
            sha256: fields[2].clone(),
        })
        .collect())
}

fn csv_files_sorted(dir: &Path) -> EngineResult<Vec<std::path::PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|err| EngineError::input(format!("read {}: {err}", dir.display())))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|err| EngineError::input(format!("read {}: {err}", dir.display())))?;
        let path = entry.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_csv(path: &Path, header: &[&str]) -> EngineResult<Vec<Vec<String>>> {
    let text = fs::read_to_string(path)
        .map_err(|err| EngineError::input(format!("read {}: {err}", path.display())))?;
    let mut lines = text.lines().enumerate();

    let header_fields = loop {
        match lines.next() {
            Some((_, line)) if line.trim().is_empty() => continue,
            Some((number, line)) => break parse_record(line, path, number + 1)?,
            None => {
                return Err(EngineError::input(format!(
                    "{} is empty (expected header {})",
                    path.display(),
                    header.join(",")
                )))
            }
        }
    };
    if header_fields != header {
        return Err(EngineError::input(format!(
            "{} has header '{}' (expected '{}')",
            path.display(),
            header_fields.join(","),
            header.join(",")
        )));
    }

    let mut records = Vec::new();
    for (number, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = parse_record(line, path, number + 1)?;
        if fields.len() != header.len() {
            return Err(EngineError::input(format!(
                "{} line {}: expected {} fields, found {}",
                path.display(),
                number + 1,
                header.len(),
                fields.len()
            )));
        }
        records.push(fields);
    }
    Ok(records)
}

fn parse_record(line: &str, path: &Path, number: usize) -> EngineResult<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                other => field.push(other),
            }
        } else {
            match ch {
                '"' if field.is_empty() => in_quotes = true,
                ',' => {
                    fields.push(std::mem::take(&mut field));
                }
                other => field.push(other),
            }
        }
    }
    if in_quotes {
        return Err(EngineError::input(format!(
            "{} line {number}: unterminated quoted field",
            path.display()
        )));
    }
    fields.push(field);
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).expect("write fixture");
        path
    }

    #[test]
    fn parses_plain_and_quoted_fields() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = write(
            dir.path(),
            "values.csv",
            "key,value,dataType,description\n\
             hostFQDN,host.example.com,FQDN,management host\n\
             note,\"a, quoted \"\"value\"\"\",string,free text\n",
        );
        let rows = load_value_file(&path).expect("parse");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "hostFQDN");
        assert_eq!(rows[0].data_type, "FQDN");
        assert_eq!(rows[1].value, "a, quoted \"value\"");
    }

    #[test]
    fn rejects_wrong_header_and_field_count() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let bad_header = write(dir.path(), "bad.csv", "k,v,t,d\nx,y,string,z\n");
        assert!(load_value_file(&bad_header).is_err());

        let short_row = write(
            dir.path(),
            "short.csv",
            "key,value,dataType,description\nx,y,string\n",
        );
        let err = load_value_file(&short_row).expect_err("short row");
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn concatenates_directory_sources_in_name_order() {
        let dir = tempfile::tempdir().expect("create temp dir");
        write(
            dir.path(),
            "10-base.csv",
            "key,value,dataType,description\nalpha,a,string,first\n",
        );
        write(
            dir.path(),
            "20-extra.csv",
            "key,value,dataType,description\nbeta,b,string,second\n",
        );
        let rows = load_build_values(dir.path()).expect("load dir");
        let keys: Vec<&str> = rows.iter().map(|row| row.key.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "beta"]);
    }

    #[test]
    fn dml_index_rows_parse() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = write(
            dir.path(),
            "index.csv",
            "itemNumber,path,sha256\nDML-001,media/esxi.iso,abc123\n",
        );
        let rows = load_dml_index(&path).expect("parse index");
        assert_eq!(rows[0].item_number, "DML-001");
        assert_eq!(rows[0].path, "media/esxi.iso");
    }

    #[test]
    fn unterminated_quote_is_an_input_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = write(
            dir.path(),
            "broken.csv",
            "key,value,dataType,description\nx,\"unterminated,string,d\n",
        );
        assert!(load_value_file(&path).is_err());
    }
}
