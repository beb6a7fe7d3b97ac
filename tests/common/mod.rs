#![allow(dead_code)] // each integration binary uses a subset of these helpers

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Invoke the vforge binary with `args`, capturing output.
pub fn vforge<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_vforge"))
        .args(args)
        .output()
        .expect("run vforge")
}

pub fn write_file(dir: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture dir");
    }
    fs::write(&path, contents).expect("write fixture");
    path
}

/// Minimal valid build-value source with one FQDN row.
pub fn basic_build_csv(dir: &Path) -> PathBuf {
    write_file(
        dir,
        "build.csv",
        "key,value,dataType,description\nhostFQDN,esx1.lab.local,FQDN,management host\n",
    )
}

/// Ledger with a three-address management range.
pub fn small_ledger(dir: &Path) -> PathBuf {
    write_file(
        dir,
        "networks.json",
        r#"[
  {
    "networkName": "mgmt",
    "rangeStart": "10.0.0.10",
    "rangeEnd": "10.0.0.12",
    "gateway": "10.0.0.1",
    "netid": "10.0.0.0",
    "netmask": "255.255.255.0",
    "addressAllocations": []
  }
]
"#,
    )
}

pub fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

pub fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Concatenated contents of every run log under `log_dir` (empty when the
/// directory never came into existence).
pub fn all_log_text(log_dir: &Path) -> String {
    let mut text = String::new();
    let Ok(entries) = fs::read_dir(log_dir) else {
        return text;
    };
    for entry in entries {
        let path = entry.expect("read log dir").path();
        if path.is_file() {
            text.push_str(&fs::read_to_string(&path).expect("read log file"));
        }
    }
    text
}
