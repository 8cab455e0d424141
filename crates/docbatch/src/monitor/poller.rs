//! Read-only polling of a session record.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};

use crate::monitor::progress::{ProgressSummary, StatusRenderer};
use crate::session::SessionStatus;
use crate::storage::read_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorTick {
    /// No readable record (missing, partially visible or malformed).
    NoUpdate,
    Unchanged,
    Changed(ProgressSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    Finished(SessionStatus),
    Cancelled,
}

/// Polls a state file and reports changes. Never writes.
pub struct ProgressMonitor {
    state_path: PathBuf,
    interval: Duration,
    last: Option<ProgressSummary>,
}

impl ProgressMonitor {
    pub fn new<P: AsRef<Path>>(state_path: P, interval: Duration) -> Self {
        Self {
            state_path: state_path.as_ref().to_path_buf(),
            interval,
            last: None,
        }
    }

    pub fn poll_once(&mut self) -> MonitorTick {
        let session = match read_path(&self.state_path) {
            Ok(session) => session,
            Err(e) => {
                debug!("Monitor skipped a tick: {}", e);
                return MonitorTick::NoUpdate;
            }
        };

        let summary = ProgressSummary::from_session(&session);
        if self.last.as_ref() == Some(&summary) {
            return MonitorTick::Unchanged;
        }
        self.last = Some(summary.clone());
        MonitorTick::Changed(summary)
    }

    /// Emits one rendered line per change until the session reaches a
    /// terminal status or `cancel` fires (a message or a dropped sender).
    pub fn run(
        &mut self,
        cancel: &Receiver<()>,
        renderer: &dyn StatusRenderer,
        out: &mut dyn Write,
    ) -> MonitorExit {
        loop {
            if let MonitorTick::Changed(summary) = self.poll_once() {
                if let Err(e) = writeln!(out, "{}", renderer.render(&summary)).and_then(|_| out.flush()) {
                    warn!("Monitor output failed: {}", e);
                }
                if summary.is_terminal() {
                    return MonitorExit::Finished(summary.status);
                }
            }

            match cancel.recv_timeout(self.interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return MonitorExit::Cancelled,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    /// Runs the monitor on a background thread writing to stderr. Dropping
    /// the guard stops it.
    pub fn spawn(self, renderer: Box<dyn StatusRenderer>) -> std::io::Result<MonitorGuard> {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let mut monitor = self;

        let handle = thread::Builder::new()
            .name("docbatch-monitor".into())
            .spawn(move || {
                let mut stderr = std::io::stderr();
                monitor.run(&cancel_rx, renderer.as_ref(), &mut stderr)
            })?;

        Ok(MonitorGuard {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        })
    }
}

/// Stops the background monitor when dropped.
pub struct MonitorGuard {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<MonitorExit>>,
}

impl MonitorGuard {
    /// Cancels the monitor and waits for it to exit.
    pub fn stop(mut self) -> Option<MonitorExit> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<MonitorExit> {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.try_send(());
        }
        self.handle.take().and_then(|h| h.join().ok())
    }
}

impl Drop for MonitorGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}
