use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use clap::Args;

use docbatch::worker::run_from_spec_file;

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Worker spec written by the supervisor
    #[arg(long)]
    pub spec: PathBuf,
}

pub fn execute(args: &WorkerArgs, shutdown: &AtomicBool) -> u8 {
    let code = run_from_spec_file(&args.spec, shutdown);
    u8::try_from(code).unwrap_or(crate::EXIT_ERROR)
}
