mod commands;
mod logging;
mod report;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{ArgAction, Parser};

use crate::commands::Command;

pub const EXIT_OK: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_UNFINISHED: u8 = 2;
pub const EXIT_INTERRUPTED: u8 = 130;

/// Parallel batch runs over document collections, with checkpoint and resume.
#[derive(Parser, Debug)]
#[command(name = "docbatch", version, about)]
pub struct Cli {
    /// Configuration file (JSON or YAML)
    #[arg(short, long, global = true, env = "DOCBATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding session records; overrides the configuration
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Emit log records as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose, cli.log_json) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
        eprintln!("Interrupt received, stopping after in-flight documents (press Ctrl-C again to abort)");
    }) {
        log::warn!("Failed to install interrupt handler: {}", e);
    }

    match commands::dispatch(&cli, shutdown) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            report::print_error(&err);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
