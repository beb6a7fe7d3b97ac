use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod actions;
mod cli;
mod credentials;
mod dml;
mod errors;
mod metadata;
mod netalloc;
mod runlog;
mod sequencer;
mod table;
mod template;
mod util;
mod values;
mod workflow;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = cli::RootArgs::parse();
    match args.command {
        cli::Command::Run(args) => workflow::run_run(args),
        cli::Command::Resolve(args) => workflow::run_resolve(args),
        cli::Command::Inspect(args) => workflow::run_inspect(args),
        cli::Command::Allocate(args) => workflow::run_allocate(args),
        cli::Command::EncryptCredential(args) => workflow::run_encrypt_credential(args),
    }
}
