use std::io::Write;
use std::time::Duration;

use clap::Args;

use docbatch::monitor::{JsonRenderer, MonitorTick, PlainRenderer, ProgressMonitor, StatusRenderer};
use docbatch::worker::retry::interruptible_sleep;
use docbatch::SessionStatus;

use super::Context;
use crate::{EXIT_INTERRUPTED, EXIT_OK, EXIT_UNFINISHED};

#[derive(Args, Debug)]
pub struct MonitorArgs {
    pub session_id: String,

    /// Polling interval; defaults to monitor_interval_ms from the configuration
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// One JSON object per update
    #[arg(long)]
    pub json: bool,
}

pub fn execute(ctx: &Context, args: &MonitorArgs) -> anyhow::Result<u8> {
    // Fails early with a classified error when the session is unknown.
    ctx.load_session(&args.session_id)?;

    let interval = args
        .interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| ctx.config.monitor_interval());
    let renderer: Box<dyn StatusRenderer> = if args.json {
        Box::new(JsonRenderer)
    } else {
        Box::new(PlainRenderer)
    };

    let mut monitor = ProgressMonitor::new(ctx.store().state_path(&args.session_id), interval);
    let mut stdout = std::io::stdout();
    loop {
        if let MonitorTick::Changed(summary) = monitor.poll_once() {
            writeln!(stdout, "{}", renderer.render(&summary))?;
            stdout.flush()?;
            if summary.is_terminal() {
                let clean = summary.status == SessionStatus::Completed
                    && summary.failed_documents == 0
                    && summary.batches_failed == 0;
                return Ok(if clean { EXIT_OK } else { EXIT_UNFINISHED });
            }
        }
        if !interruptible_sleep(interval, &ctx.shutdown) {
            return Ok(EXIT_INTERRUPTED);
        }
    }
}
