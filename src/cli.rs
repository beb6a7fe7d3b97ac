//! CLI argument parsing for the build workflow.
//!
//! The CLI is intentionally thin: it wires inputs into the engine without
//! embedding policy, so the same core logic can be reused elsewhere.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default pause after each stage, giving platform side effects time to
/// settle before the next stage begins.
pub const DEFAULT_SETTLE_SECONDS: u64 = 5;

/// Root CLI entrypoint for the workflow runner.
#[derive(Parser, Debug)]
#[command(
    name = "vforge",
    version,
    about = "Declarative multi-stage build workflow runner",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level workflow commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Resolve(ResolveArgs),
    Inspect(InspectArgs),
    Allocate(AllocateArgs),
    EncryptCredential(EncryptCredentialArgs),
}

/// Inputs shared by `run` and `resolve`.
#[derive(Parser, Debug)]
pub struct SourceArgs {
    /// Build-value CSV file, or a directory of CSV files merged in name order
    #[arg(long, value_name = "PATH")]
    pub build: PathBuf,

    /// Override CSV; rows sharing a key fully supersede base rows
    #[arg(long, value_name = "PATH")]
    pub overrides: Option<PathBuf>,

    /// DML index CSV (itemNumber,path,sha256)
    #[arg(long, value_name = "PATH")]
    pub dml_index: Option<PathBuf>,

    /// Credential store directory holding one JSON record per credential
    #[arg(long, value_name = "DIR", default_value = "credentials")]
    pub credential_store: PathBuf,

    /// Key reference credential records must have been stored under
    #[arg(long, value_name = "REF", default_value = "default")]
    pub credential_key: String,

    /// Network-allocation ledger JSON
    #[arg(long, value_name = "PATH")]
    pub network_ledger: Option<PathBuf>,

    /// Skip SHA256 verification of DML media
    #[arg(long)]
    pub skip_media_validation: bool,

    /// Skip the credential decrypt smoke test
    #[arg(long)]
    pub skip_credential_check: bool,
}

/// Execute a full workflow: resolve, render, run.
#[derive(Parser, Debug)]
#[command(about = "Resolve inputs, render stage documents, and execute them in order")]
pub struct RunArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Directory of stage documents named {sequenceId}${functionName}.{ext}
    #[arg(long, value_name = "DIR")]
    pub stages: PathBuf,

    /// Directory for run logs
    #[arg(long, value_name = "DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Directory for run-scoped scratch storage
    #[arg(long, value_name = "DIR", default_value = "scratch")]
    pub scratch_dir: PathBuf,

    /// Pause after each stage, in seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_SETTLE_SECONDS)]
    pub settle_seconds: u64,

    /// Mirror run-log lines to stderr
    #[arg(long)]
    pub verbose: bool,
}

/// Resolve the value table without executing anything.
#[derive(Parser, Debug)]
#[command(about = "Resolve the value table and emit it as JSON")]
pub struct ResolveArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Write the resolved table here instead of stdout
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

/// Static analysis of stage documents.
#[derive(Parser, Debug)]
#[command(about = "Report which value-table keys each stage document requires")]
pub struct InspectArgs {
    /// Directory of stage documents named {sequenceId}${functionName}.{ext}
    #[arg(long, value_name = "DIR")]
    pub stages: PathBuf,

    /// Build-value CSV file or directory; keys found here are marked present
    #[arg(long, value_name = "PATH")]
    pub build: Option<PathBuf>,

    /// Override CSV contributing additional keys
    #[arg(long, value_name = "PATH")]
    pub overrides: Option<PathBuf>,
}

/// One allocator call from the command line.
#[derive(Parser, Debug)]
#[command(about = "Issue an address or static network fact from the ledger")]
pub struct AllocateArgs {
    /// Network-allocation ledger JSON
    #[arg(long, value_name = "PATH")]
    pub ledger: PathBuf,

    /// Network name within the ledger
    #[arg(long, value_name = "NAME")]
    pub network: String,

    /// One of newIP, gateway, netId, netMask
    #[arg(long, value_name = "ACTION")]
    pub action: String,
}

/// Seed the file-backed credential store.
#[derive(Parser, Debug)]
#[command(about = "Store a credential record in the credential store")]
pub struct EncryptCredentialArgs {
    /// Credential store directory
    #[arg(long, value_name = "DIR")]
    pub store: PathBuf,

    /// Record name; the value table refers to credentials by this name
    #[arg(long, value_name = "NAME")]
    pub name: String,

    /// Key reference to store the record under
    #[arg(long, value_name = "REF", default_value = "default")]
    pub key_ref: String,

    /// Credential text to store
    #[arg(long, value_name = "SECRET")]
    pub secret: String,
}
