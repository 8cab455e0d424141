mod cleanup;
mod list;
mod merge;
mod monitor;
mod preview;
mod resume;
mod start;
mod validate;
mod worker;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Subcommand;
use log::warn;

use docbatch::config::{apply_env_overrides, load_config, Config};
use docbatch::monitor::{PlainRenderer, ProgressMonitor};
use docbatch::session::Session;
use docbatch::worker::spec::log_path;
use docbatch::{BackupPolicy, Controller, DocbatchError, ProcessLauncher, RunOutcome, StateStore};

use crate::{Cli, EXIT_INTERRUPTED, EXIT_OK, EXIT_UNFINISHED};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Plan documents into batches and run them
    Start(start::StartArgs),
    /// Continue an interrupted or partially failed session
    Resume(resume::ResumeArgs),
    /// Show what a resume would do, without changing anything
    Preview(preview::PreviewArgs),
    /// Check a session record for inconsistencies
    Validate(validate::ValidateArgs),
    /// Follow the progress of a running session
    Monitor(monitor::MonitorArgs),
    /// Combine the per-document results of a finished session
    Merge(merge::MergeArgs),
    /// List known sessions
    List(list::ListArgs),
    /// Remove temporary files, or everything with --purge
    Cleanup(cleanup::CleanupArgs),
    /// Process one batch (launched by the supervisor)
    #[command(hide = true)]
    Worker(worker::WorkerArgs),
}

pub fn dispatch(cli: &Cli, shutdown: Arc<AtomicBool>) -> anyhow::Result<u8> {
    let ctx = match &cli.command {
        Command::Worker(args) => return Ok(worker::execute(args, &shutdown)),
        _ => Context::load(cli, shutdown)?,
    };
    match &cli.command {
        Command::Start(args) => start::execute(&ctx, args),
        Command::Resume(args) => resume::execute(&ctx, args),
        Command::Preview(args) => preview::execute(&ctx, args),
        Command::Validate(args) => validate::execute(&ctx, args),
        Command::Monitor(args) => monitor::execute(&ctx, args),
        Command::Merge(args) => merge::execute(&ctx, args),
        Command::List(args) => list::execute(&ctx, args),
        Command::Cleanup(args) => cleanup::execute(&ctx, args),
        Command::Worker(args) => Ok(worker::execute(args, &ctx.shutdown)),
    }
}

/// Resolved configuration shared by the commands.
pub struct Context {
    pub config: Config,
    pub state_dir: PathBuf,
    pub shutdown: Arc<AtomicBool>,
    worker_args: Vec<String>,
}

impl Context {
    fn load(cli: &Cli, shutdown: Arc<AtomicBool>) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => load_config(path)
                .map_err(DocbatchError::from)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => Config::default(),
        };
        apply_env_overrides(&mut config).map_err(DocbatchError::from)?;
        if let Some(dir) = &cli.state_dir {
            config.state_directory = Some(dir.to_string_lossy().to_string());
        }
        let state_dir = config.state_dir();

        let mut worker_args = vec!["-v".to_string(); usize::from(cli.verbose)];
        if cli.log_json {
            worker_args.push("--log-json".to_string());
        }

        Ok(Self {
            config,
            state_dir,
            shutdown,
            worker_args,
        })
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(&self.state_dir, BackupPolicy::from(&self.config.backup))
    }

    pub fn controller(&self) -> anyhow::Result<Controller> {
        let launcher = ProcessLauncher::current_exe()
            .context("Failed to locate the docbatch executable")?
            .with_args(self.worker_args.clone());
        Ok(Controller::new(
            self.store(),
            Box::new(launcher),
            Arc::clone(&self.shutdown),
        ))
    }

    pub fn load_session(&self, session_id: &str) -> anyhow::Result<Session> {
        let session = self
            .store()
            .load(session_id)
            .map_err(DocbatchError::from)?
            .ok_or_else(|| {
                DocbatchError::from(docbatch::ResumeError::NotFound(session_id.to_string()))
            })?;
        Ok(session)
    }
}

/// Runs `work` with a progress monitor on stderr, unless disabled.
pub fn with_monitor<T>(
    ctx: &Context,
    session_id: &str,
    enabled: bool,
    work: impl FnOnce() -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let guard = if enabled {
        let monitor =
            ProgressMonitor::new(ctx.store().state_path(session_id), ctx.config.monitor_interval());
        match monitor.spawn(Box::new(PlainRenderer)) {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!("Progress monitor unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    let result = work();
    drop(guard);
    result
}

pub fn print_outcome(session: &Session, outcome: &RunOutcome) {
    println!(
        "Session {}: {} | {}/{} documents completed, {} failed | {} run(s)",
        session.session_id,
        session.status.as_str(),
        session.completed_documents,
        session.total_documents,
        session.failed_documents,
        outcome.runs
    );
    for failure in &outcome.failed_batches {
        println!(
            "  batch {} failed: {} (log: {})",
            failure.batch_id,
            failure.reason,
            log_path(&session.temp_dir, &failure.batch_id).display()
        );
    }
    if outcome.interrupted || outcome.pending_batches > 0 || !outcome.failed_batches.is_empty() {
        println!("Continue with: docbatch resume {}", session.session_id);
    } else {
        println!("Results: {}", session.output_dir.display());
    }
}

pub fn exit_code(outcome: &RunOutcome) -> u8 {
    if outcome.interrupted {
        EXIT_INTERRUPTED
    } else if outcome.all_completed() {
        EXIT_OK
    } else {
        EXIT_UNFINISHED
    }
}
