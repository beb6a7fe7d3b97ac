//! Stage sequencing and cross-stage attribute propagation.
//!
//! Execution is strictly single-threaded and sequential: one stage at a
//! time, one object invocation at a time, in declared order. That ordering
//! is what makes positional attribute capture sound, so nothing here may
//! reorder or parallelize.

use crate::actions::{ActionRegistry, StageLog};
use crate::errors::{EngineError, EngineResult};
use crate::runlog::{LogLevel, RunLog};
use crate::template::{self, StageTemplate};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Reserved parameter name that declares an output capture instead of a
/// provider parameter.
pub const ATTRIBUTE_PARAM: &str = "workflowAttrib";
/// Prefix marking a parameter value as an attribute-store reference.
pub const ATTRIBUTE_REF_MARKER: &str = "@@";

/// Per-run configuration owned by the caller.
pub struct RunConfig {
    /// Pause inserted after each stage so external side effects settle
    /// before the next stage begins.
    pub settle: Duration,
    /// Run-scoped working storage, removed on completion or abort.
    pub scratch_dir: PathBuf,
}

/// Explicit run state threaded through every stage: the attribute store,
/// the run configuration, and the log sink. There is no ambient state.
pub struct Sequencer<'a> {
    registry: &'a ActionRegistry,
    config: RunConfig,
    attributes: BTreeMap<String, String>,
    log: RunLog,
}

impl<'a> Sequencer<'a> {
    pub fn new(registry: &'a ActionRegistry, config: RunConfig, log: RunLog) -> Self {
        Sequencer {
            registry,
            config,
            attributes: BTreeMap::new(),
            log,
        }
    }

    /// Attribute value captured during this run, if any. Exposed for tests
    /// and post-run reporting.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Execute all stages in ascending sequence order. On an action failure
    /// the scratch directory is removed (best effort) and the run aborts
    /// with one aggregate error naming the run log.
    pub fn run(&mut self, stages: &[StageTemplate]) -> EngineResult<()> {
        self.ensure_registered(stages)?;
        fs::create_dir_all(&self.config.scratch_dir).map_err(|err| {
            EngineError::input(format!(
                "create scratch dir {}: {err}",
                self.config.scratch_dir.display()
            ))
        })?;

        let total = stages.len();
        for (position, stage) in stages.iter().enumerate() {
            if let Err(err) = self.run_stage(stage) {
                self.log.line(
                    &stage.function_name,
                    LogLevel::Error,
                    &err.to_string(),
                );
                self.remove_scratch();
                return Err(EngineError::Action {
                    function: stage.function_name.clone(),
                    message: format!(
                        "stage {} ({}) aborted the run; see {}",
                        stage.sequence_id,
                        stage.source_file,
                        self.log.path().display()
                    ),
                });
            }
            if position + 1 < total && !self.config.settle.is_zero() {
                std::thread::sleep(self.config.settle);
            }
        }

        self.remove_scratch();
        Ok(())
    }

    /// Every stage's function name must resolve before the first invocation
    /// runs; an unknown name is a load-time input error.
    fn ensure_registered(&self, stages: &[StageTemplate]) -> EngineResult<()> {
        for stage in stages {
            if self.registry.get(&stage.function_name).is_none() {
                return Err(EngineError::input(format!(
                    "stage {} names unregistered action '{}'",
                    stage.source_file, stage.function_name
                )));
            }
        }
        Ok(())
    }

    fn run_stage(&mut self, stage: &StageTemplate) -> EngineResult<()> {
        self.log.line(
            &stage.function_name,
            LogLevel::Verbose,
            &format!(
                "stage {} begins with {} object(s)",
                stage.sequence_id,
                stage.objects.len()
            ),
        );

        // Captures are positional: the capture declared in object i takes
        // the result of invocation i.
        let mut captures: Vec<(usize, String)> = Vec::new();
        let mut results: Vec<Option<String>> = Vec::with_capacity(stage.objects.len());

        for (index, object) in stage.objects.iter().enumerate() {
            let mut params = Vec::with_capacity(object.params.len());
            for (name, value) in &object.params {
                if name == ATTRIBUTE_PARAM {
                    captures.push((index, value.clone()));
                    continue;
                }
                let resolved = match value.strip_prefix(ATTRIBUTE_REF_MARKER) {
                    // An unset attribute resolves to empty, not an error.
                    Some(attr) => self.attributes.get(attr).cloned().unwrap_or_default(),
                    None => value.clone(),
                };
                params.push((name.clone(), resolved));
            }

            let provider = self
                .registry
                .get(&stage.function_name)
                .expect("checked by ensure_registered");
            let mut stage_log = StageLog::new(&mut self.log, &stage.function_name);
            let result = provider.invoke(&params, &mut stage_log)?;
            if let Some(primary) = &result {
                self.log
                    .line(&stage.function_name, LogLevel::Stdout, primary);
            }
            results.push(result);
        }

        for (index, name) in captures {
            match results.get(index).cloned().flatten() {
                Some(value) => {
                    self.attributes.insert(name, value);
                }
                None => {
                    self.log.line(
                        &stage.function_name,
                        LogLevel::Warning,
                        &format!(
                            "capture '{name}' declared in object {} produced no result; attribute left unset",
                            index + 1
                        ),
                    );
                }
            }
        }
        Ok(())
    }

    fn remove_scratch(&mut self) {
        let scratch = &self.config.scratch_dir;
        if !scratch.exists() {
            return;
        }
        if let Err(err) = fs::remove_dir_all(scratch) {
            self.log.line(
                "sequencer",
                LogLevel::Warning,
                &format!("failed to remove scratch dir {}: {err}", scratch.display()),
            );
        }
    }
}

/// Parse every stage document in `stage_dir` against the value table and
/// return the stages sorted by ascending sequence id (ties broken by file
/// name). Hidden files are ignored; everything else must follow the
/// `{sequenceId}${functionName}.{ext}` convention.
pub fn load_stages(
    stage_dir: &Path,
    value_table: &BTreeMap<String, String>,
) -> EngineResult<Vec<StageTemplate>> {
    let entries = fs::read_dir(stage_dir)
        .map_err(|err| EngineError::input(format!("read {}: {err}", stage_dir.display())))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|err| EngineError::input(format!("read {}: {err}", stage_dir.display())))?;
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        if path.is_file() && !hidden {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(EngineError::input(format!(
            "no stage documents found under {}",
            stage_dir.display()
        )));
    }

    let mut stages = Vec::with_capacity(files.len());
    for path in files {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                EngineError::input(format!("stage file {} is not valid UTF-8", path.display()))
            })?
            .to_string();
        let document = fs::read_to_string(&path)
            .map_err(|err| EngineError::input(format!("read {}: {err}", path.display())))?;
        stages.push(template::parse_stage(&document, &filename, value_table)?);
    }
    stages.sort_by(|a, b| {
        a.sequence_id
            .cmp(&b.sequence_id)
            .then_with(|| a.source_file.cmp(&b.source_file))
    });
    Ok(stages)
}
