//! Command drivers: wire CLI arguments into the engine and report outcomes.

use crate::cli::{AllocateArgs, EncryptCredentialArgs, InspectArgs, ResolveArgs, RunArgs, SourceArgs};
use crate::credentials::{CredentialService, FileCredentialStore};
use crate::netalloc::{self, AllocAction};
use crate::sequencer::{load_stages, RunConfig, Sequencer};
use crate::table;
use crate::template;
use crate::util::now_epoch_ms;
use crate::values::{self, ResolveRequest};
use crate::{actions::ActionRegistry, runlog::RunLog};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::time::Duration;

pub fn run_run(args: RunArgs) -> Result<()> {
    let credential_service = FileCredentialStore;
    let rows = values::resolve(&resolve_request(&args.sources), &credential_service)?;
    let lookup = values::to_lookup(&rows);

    let run_id = now_epoch_ms()?.to_string();
    let log = RunLog::create(&args.log_dir, &run_id, args.verbose)?;
    let log_path = log.path().to_path_buf();
    tracing::info!(run_id = %run_id, log = %log_path.display(), "starting workflow run");

    let stages = load_stages(&args.stages, &lookup)?;
    let registry = ActionRegistry::with_builtins();
    let config = RunConfig {
        settle: Duration::from_secs(args.settle_seconds),
        scratch_dir: args.scratch_dir.join(&run_id),
    };
    let mut sequencer = Sequencer::new(&registry, config, log);
    sequencer.run(&stages)?;

    println!(
        "run {run_id} completed: {} stage(s); log at {}",
        stages.len(),
        log_path.display()
    );
    Ok(())
}

pub fn run_resolve(args: ResolveArgs) -> Result<()> {
    let credential_service = FileCredentialStore;
    let rows = values::resolve(&resolve_request(&args.sources), &credential_service)?;
    let text = serde_json::to_string_pretty(&rows).context("serialize resolved table")?;
    match &args.out {
        Some(out) => {
            fs::write(out, text.as_bytes())
                .with_context(|| format!("write {}", out.display()))?;
            println!("wrote {} value(s) to {}", rows.len(), out.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

pub fn run_inspect(args: InspectArgs) -> Result<()> {
    let mut known: BTreeSet<String> = BTreeSet::new();
    if let Some(build) = &args.build {
        for row in table::load_build_values(build)? {
            known.insert(row.key);
        }
    }
    if let Some(overrides) = &args.overrides {
        for row in table::load_value_file(overrides)? {
            known.insert(row.key);
        }
    }

    let entries = fs::read_dir(&args.stages)
        .with_context(|| format!("read {}", args.stages.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("read {}", args.stages.display()))?
            .path();
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        if path.is_file() && !hidden {
            files.push(path);
        }
    }
    files.sort();

    let mut missing_total = 0usize;
    for path in files {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .context("stage file name is not valid UTF-8")?;
        let document =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let refs = template::extract_placeholders(&document, filename)?;
        println!("{filename}: {} key(s)", refs.len());
        for reference in refs {
            let status = if known.contains(&reference.name) {
                "present"
            } else {
                missing_total += 1;
                "MISSING"
            };
            println!("  {} [{status}]", reference.name);
        }
    }
    if missing_total > 0 && args.build.is_some() {
        anyhow::bail!("{missing_total} placeholder key(s) missing from the value sources");
    }
    Ok(())
}

pub fn run_allocate(args: AllocateArgs) -> Result<()> {
    let action = AllocAction::parse(&args.action)?;
    let value = netalloc::allocate(&args.ledger, &args.network, action)?;
    println!("{value}");
    Ok(())
}

pub fn run_encrypt_credential(args: EncryptCredentialArgs) -> Result<()> {
    let store = FileCredentialStore;
    let record = store.encrypt(&args.secret, &args.key_ref)?;
    let path = crate::credentials::write_record(&args.store, &args.name, &record)?;
    println!("wrote {}", path.display());
    Ok(())
}

fn resolve_request(sources: &SourceArgs) -> ResolveRequest<'_> {
    ResolveRequest {
        build_path: &sources.build,
        overrides_path: sources.overrides.as_deref(),
        dml_index_path: sources.dml_index.as_deref(),
        credential_store: &sources.credential_store,
        credential_key_ref: &sources.credential_key,
        network_ledger_path: sources.network_ledger.as_deref(),
        skip_media_validation: sources.skip_media_validation,
        skip_credential_check: sources.skip_credential_check,
    }
}
