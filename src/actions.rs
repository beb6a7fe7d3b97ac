//! Action providers and the static registry that dispatches them.
//!
//! A provider is a named callable: it accepts the ordered parameter map a
//! stage rendered, may write diagnostics to the run log, and returns zero or
//! one primary result. Platform providers (virtual-machine creation, switch
//! configuration, media mounting) register through the same trait; the
//! built-ins here are the local ones the binary ships with.

use crate::errors::{EngineError, EngineResult};
use crate::runlog::{LogLevel, RunLog};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

/// Run-log handle scoped to one stage's function name.
pub struct StageLog<'a> {
    log: &'a mut RunLog,
    function: &'a str,
}

impl<'a> StageLog<'a> {
    pub fn new(log: &'a mut RunLog, function: &'a str) -> Self {
        StageLog { log, function }
    }

    pub fn verbose(&mut self, message: &str) {
        self.log.line(self.function, LogLevel::Verbose, message);
    }

    pub fn warning(&mut self, message: &str) {
        self.log.line(self.function, LogLevel::Warning, message);
    }

    pub fn error(&mut self, message: &str) {
        self.log.line(self.function, LogLevel::Error, message);
    }

    pub fn stdout(&mut self, message: &str) {
        self.log.line(self.function, LogLevel::Stdout, message);
    }

    pub fn function(&self) -> &str {
        self.function
    }

    /// Build the action error that aborts the run.
    pub fn fail(&self, message: impl Into<String>) -> EngineError {
        EngineError::Action {
            function: self.function.to_string(),
            message: message.into(),
        }
    }
}

/// Named operation a stage invokes.
pub trait ActionProvider {
    fn invoke(
        &self,
        params: &[(String, String)],
        log: &mut StageLog<'_>,
    ) -> EngineResult<Option<String>>;
}

/// Static name-to-handler registry. Resolving an unregistered name is an
/// input error at stage-load time, never a runtime crash.
pub struct ActionRegistry {
    providers: BTreeMap<String, Box<dyn ActionProvider>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        ActionRegistry {
            providers: BTreeMap::new(),
        }
    }

    /// Registry pre-loaded with the built-in local providers.
    pub fn with_builtins() -> Self {
        let mut registry = ActionRegistry::new();
        registry.register("echo", Box::new(EchoProvider));
        registry.register("runCommand", Box::new(RunCommandProvider));
        registry.register("writeFile", Box::new(WriteFileProvider));
        registry.register("sleepSeconds", Box::new(SleepProvider));
        registry
    }

    pub fn register(&mut self, name: &str, provider: Box<dyn ActionProvider>) {
        self.providers.insert(name.to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<&dyn ActionProvider> {
        self.providers.get(name).map(Box::as_ref)
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        ActionRegistry::with_builtins()
    }
}

/// First value for `name` in an ordered parameter map.
pub fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn require_param<'a>(
    params: &'a [(String, String)],
    name: &str,
    log: &StageLog<'_>,
) -> EngineResult<&'a str> {
    param(params, name).ok_or_else(|| log.fail(format!("missing required parameter '{name}'")))
}

/// Logs its `message` parameter and returns it as the primary result.
struct EchoProvider;

impl ActionProvider for EchoProvider {
    fn invoke(
        &self,
        params: &[(String, String)],
        log: &mut StageLog<'_>,
    ) -> EngineResult<Option<String>> {
        let message = require_param(params, "message", log)?;
        log.verbose(message);
        Ok(Some(message.to_string()))
    }
}

/// Spawns a local process. Parameters: `program` (required), `args`
/// (shell-style word list), `cwd`, `timeoutSeconds` (the child is killed
/// past the deadline; no deadline when absent). The primary result is
/// trimmed stdout; stderr lines surface as warnings. A non-zero exit or a
/// timeout aborts the stage.
struct RunCommandProvider;

impl ActionProvider for RunCommandProvider {
    fn invoke(
        &self,
        params: &[(String, String)],
        log: &mut StageLog<'_>,
    ) -> EngineResult<Option<String>> {
        let program = require_param(params, "program", log)?;
        let args = match param(params, "args") {
            Some(raw) => shell_words::split(raw)
                .map_err(|err| log.fail(format!("parse args '{raw}': {err}")))?,
            None => Vec::new(),
        };
        let timeout = match param(params, "timeoutSeconds") {
            Some(raw) => Some(
                raw.parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite() && *value >= 0.0)
                    .map(std::time::Duration::from_secs_f64)
                    .ok_or_else(|| log.fail(format!("invalid timeoutSeconds '{raw}'")))?,
            ),
            None => None,
        };
        let resolved = if program.contains(std::path::MAIN_SEPARATOR) {
            Path::new(program).to_path_buf()
        } else {
            which::which(program)
                .map_err(|err| log.fail(format!("locate program '{program}': {err}")))?
        };

        let mut command = Command::new(&resolved);
        command
            .args(&args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        if let Some(cwd) = param(params, "cwd") {
            command.current_dir(cwd);
        }
        log.verbose(&format!(
            "spawning {} {}",
            resolved.display(),
            args.join(" ")
        ));
        let start = std::time::Instant::now();
        let mut child = command
            .spawn()
            .map_err(|err| log.fail(format!("spawn {}: {err}", resolved.display())))?;
        let mut timed_out = false;
        if let Some(timeout) = timeout {
            loop {
                let status = child
                    .try_wait()
                    .map_err(|err| log.fail(format!("wait for {}: {err}", resolved.display())))?;
                if status.is_some() {
                    break;
                }
                if start.elapsed() > timeout {
                    timed_out = true;
                    let _ = child.kill();
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(25));
            }
        }
        let output = child
            .wait_with_output()
            .map_err(|err| log.fail(format!("collect {} output: {err}", resolved.display())))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stdout.lines() {
            log.verbose(line);
        }
        for line in stderr.lines() {
            log.warning(line);
        }
        if timed_out {
            return Err(log.fail(format!(
                "{} timed out after {:.1}s and was killed",
                resolved.display(),
                start.elapsed().as_secs_f64()
            )));
        }
        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(log.fail(format!(
                "{} exited with {code}",
                resolved.display()
            )));
        }
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }
}

/// Writes `contents` to `path`, creating parent directories. Primary result
/// is the written path.
struct WriteFileProvider;

impl ActionProvider for WriteFileProvider {
    fn invoke(
        &self,
        params: &[(String, String)],
        log: &mut StageLog<'_>,
    ) -> EngineResult<Option<String>> {
        let path = require_param(params, "path", log)?;
        let contents = param(params, "contents").unwrap_or_default();
        let target = Path::new(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| log.fail(format!("create {}: {err}", parent.display())))?;
        }
        std::fs::write(target, contents)
            .map_err(|err| log.fail(format!("write {}: {err}", target.display())))?;
        log.verbose(&format!("wrote {}", target.display()));
        Ok(Some(path.to_string()))
    }
}

/// Blocks for `seconds`. Returns no primary result.
struct SleepProvider;

impl ActionProvider for SleepProvider {
    fn invoke(
        &self,
        params: &[(String, String)],
        log: &mut StageLog<'_>,
    ) -> EngineResult<Option<String>> {
        let raw = require_param(params, "seconds", log)?;
        let seconds = raw
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite() && *value >= 0.0)
            .ok_or_else(|| log.fail(format!("invalid seconds '{raw}'")))?;
        std::thread::sleep(std::time::Duration::from_secs_f64(seconds));
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_log(dir: &Path) -> RunLog {
        RunLog::create(dir, "actions-test", false).expect("create log")
    }

    #[test]
    fn registry_resolves_builtins_and_rejects_unknown_names() {
        let registry = ActionRegistry::with_builtins();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("runCommand").is_some());
        assert!(registry.get("deployVcsa").is_none());
    }

    #[test]
    fn echo_returns_its_message() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut log = test_log(dir.path());
        let mut stage_log = StageLog::new(&mut log, "echo");
        let params = vec![("message".to_string(), "hello".to_string())];
        let result = EchoProvider
            .invoke(&params, &mut stage_log)
            .expect("invoke echo");
        assert_eq!(result.as_deref(), Some("hello"));
    }

    #[test]
    fn missing_required_parameter_is_an_action_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut log = test_log(dir.path());
        let mut stage_log = StageLog::new(&mut log, "echo");
        let err = EchoProvider
            .invoke(&[], &mut stage_log)
            .expect_err("missing parameter");
        assert!(err.to_string().contains("message"));
    }

    #[test]
    fn write_file_creates_parents_and_returns_path() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut log = test_log(dir.path());
        let mut stage_log = StageLog::new(&mut log, "writeFile");
        let target = dir.path().join("out/flag.txt");
        let params = vec![
            ("path".to_string(), target.display().to_string()),
            ("contents".to_string(), "done".to_string()),
        ];
        let result = WriteFileProvider
            .invoke(&params, &mut stage_log)
            .expect("invoke writeFile");
        assert_eq!(result.as_deref(), Some(target.display().to_string().as_str()));
        assert_eq!(std::fs::read_to_string(&target).expect("read"), "done");
    }

    #[test]
    fn run_command_captures_stdout_when_binary_exists() {
        let Ok(_) = which::which("echo") else {
            return;
        };
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut log = test_log(dir.path());
        let mut stage_log = StageLog::new(&mut log, "runCommand");
        let params = vec![
            ("program".to_string(), "echo".to_string()),
            ("args".to_string(), "vm-201".to_string()),
        ];
        let result = RunCommandProvider
            .invoke(&params, &mut stage_log)
            .expect("invoke runCommand");
        assert_eq!(result.as_deref(), Some("vm-201"));
    }

    #[test]
    fn run_command_fails_on_nonzero_exit() {
        let Ok(_) = which::which("false") else {
            return;
        };
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut log = test_log(dir.path());
        let mut stage_log = StageLog::new(&mut log, "runCommand");
        let params = vec![("program".to_string(), "false".to_string())];
        let err = RunCommandProvider
            .invoke(&params, &mut stage_log)
            .expect_err("nonzero exit");
        assert!(matches!(err, EngineError::Action { .. }));
    }

    #[test]
    fn run_command_kills_child_past_its_deadline() {
        let Ok(_) = which::which("sleep") else {
            return;
        };
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut log = test_log(dir.path());
        let mut stage_log = StageLog::new(&mut log, "runCommand");
        let params = vec![
            ("program".to_string(), "sleep".to_string()),
            ("args".to_string(), "5".to_string()),
            ("timeoutSeconds".to_string(), "0.2".to_string()),
        ];
        let err = RunCommandProvider
            .invoke(&params, &mut stage_log)
            .expect_err("deadline exceeded");
        assert!(err.to_string().contains("timed out"));
    }
}
