//! Launches batch workers with bounded concurrency and turns what they leave
//! on disk into session state. The supervisor is the only writer of the
//! session record while a run is in progress.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{DocbatchError, StateError, WorkerError};
use crate::session::{BatchStatus, DocumentStatus, Session, SessionStatus};
use crate::storage::{filesystem, StateStore};
use crate::worker::artifact::{self, ArtifactState};
use crate::worker::launcher::{WorkerExit, WorkerHandle, WorkerLauncher};
use crate::worker::runner::{EXIT_FINISHED, EXIT_STOPPED};
use crate::worker::spec::{self, WorkerSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    pub concurrency: usize,
    pub batch_timeout: Duration,
    pub poll_interval: Duration,
}

impl SupervisorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.worker_count.max(1),
            batch_timeout: config.batch_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub batch_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub launched: usize,
    pub completed: Vec<String>,
    pub failed: Vec<BatchFailure>,
    /// Batches still pending when the run ended (interrupted or never launched).
    pub unfinished: Vec<String>,
    pub interrupted: bool,
}

impl RunReport {
    pub fn all_completed(&self) -> bool {
        !self.interrupted && self.failed.is_empty() && self.unfinished.is_empty()
    }
}

struct ActiveWorker {
    batch_id: String,
    handle: Box<dyn WorkerHandle>,
    started: Instant,
}

enum Outcome {
    Finished(WorkerExit),
    TimedOut,
    PollFailed(String),
}

pub struct Supervisor<'a> {
    store: &'a StateStore,
    launcher: &'a dyn WorkerLauncher,
    options: SupervisorOptions,
    shutdown: Arc<AtomicBool>,
}

impl<'a> Supervisor<'a> {
    pub fn new(
        store: &'a StateStore,
        launcher: &'a dyn WorkerLauncher,
        options: SupervisorOptions,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            launcher,
            options,
            shutdown,
        }
    }

    /// Runs every pending batch of `session` in canonical order until all
    /// have finished or a shutdown is requested.
    pub fn run(&self, session: &mut Session) -> Result<RunReport, DocbatchError> {
        self.run_attempt(session, false)
    }

    /// Like [`Supervisor::run`], but when `retry_follows` is set and a failed
    /// batch still has unfinished documents, the session is left `running`
    /// so the saved record never reads as finished between attempts.
    pub fn run_attempt(
        &self,
        session: &mut Session,
        retry_follows: bool,
    ) -> Result<RunReport, DocbatchError> {
        let mut active = Vec::new();
        let result = self.run_inner(session, &mut active, retry_follows);
        if result.is_err() && !active.is_empty() {
            // let orphaned workers wind down on their own
            if let Err(e) = std::fs::write(session.stop_file(), b"") {
                error!("Failed to signal workers of {}: {}", session.session_id, e);
            }
        }
        result
    }

    fn run_inner(
        &self,
        session: &mut Session,
        active: &mut Vec<ActiveWorker>,
        retry_follows: bool,
    ) -> Result<RunReport, DocbatchError> {
        filesystem::ensure_directory(&session.temp_dir).map_err(|e| StateError::CreateDirectory {
            path: session.temp_dir.clone(),
            source: e,
        })?;
        let stop_file = session.stop_file();
        if let Err(e) = filesystem::remove_file_if_exists(&stop_file) {
            warn!("Failed to clear stale stop file {}: {}", stop_file.display(), e);
        }

        let mut queue: VecDeque<String> = session.pending_batches().into();
        let mut report = RunReport::default();

        session.run_attempts += 1;
        session.status = SessionStatus::Running;
        session.touch();
        self.store.save(session)?;

        info!(
            "Session {}: {} batch(es) queued, concurrency {}",
            session.session_id,
            queue.len(),
            self.options.concurrency
        );

        let mut stopping = false;
        loop {
            if !stopping && self.shutdown.load(Ordering::Relaxed) {
                stopping = true;
                report.interrupted = true;
                info!(
                    "Shutdown requested, waiting for {} active worker(s) to finish their current document",
                    active.len()
                );
                if let Err(e) = std::fs::write(&stop_file, b"") {
                    warn!("Failed to create stop file {}: {}", stop_file.display(), e);
                }
            }

            if !stopping {
                while active.len() < self.options.concurrency {
                    let Some(batch_id) = queue.pop_front() else {
                        break;
                    };
                    if let Some(worker) = self.launch(session, &batch_id, &mut report)? {
                        active.push(worker);
                    }
                }
            }

            if active.is_empty() && (queue.is_empty() || stopping) {
                break;
            }

            std::thread::sleep(self.options.poll_interval);

            let mut changed = false;
            let mut index = 0;
            while index < active.len() {
                changed |= reconcile(session, &active[index].batch_id);

                let outcome = self.poll(&mut active[index]);
                match outcome {
                    Some(outcome) => {
                        let worker = active.swap_remove(index);
                        self.finish(session, &worker.batch_id, outcome, &mut report);
                        changed = true;
                    }
                    None => index += 1,
                }
            }

            if changed {
                session.recompute_counts();
                session.touch();
                self.store.save(session)?;
            }
        }

        report.unfinished = queue.into_iter().collect();
        for batch in &session.batches {
            if batch.status == BatchStatus::Pending && !report.unfinished.contains(&batch.batch_id) {
                report.unfinished.push(batch.batch_id.clone());
            }
        }

        if let Err(e) = filesystem::remove_file_if_exists(&stop_file) {
            warn!("Failed to remove stop file {}: {}", stop_file.display(), e);
        }

        session.refresh();
        if !session.is_terminal() {
            session.status = SessionStatus::Paused;
        } else if retry_follows && !report.interrupted && !session.retryable_batches().is_empty() {
            session.status = SessionStatus::Running;
        }
        self.store.save(session)?;

        info!(
            "Session {} run finished: {} completed, {} failed, {} unfinished batch(es); documents {}/{} done, {} failed",
            session.session_id,
            report.completed.len(),
            report.failed.len(),
            report.unfinished.len(),
            session.completed_documents,
            session.total_documents,
            session.failed_documents
        );
        Ok(report)
    }

    fn launch(
        &self,
        session: &mut Session,
        batch_id: &str,
        report: &mut RunReport,
    ) -> Result<Option<ActiveWorker>, DocbatchError> {
        let worker_spec = match session.batch(batch_id) {
            Some(batch) => WorkerSpec::for_batch(session, batch),
            None => return Err(WorkerError::UnknownBatch(batch_id.to_string()).into()),
        };

        if worker_spec.documents.is_empty() {
            debug!("Batch {} has nothing left to process", batch_id);
            if let Some(batch) = session.batch_mut(batch_id) {
                batch.refresh_status();
            }
            report.completed.push(batch_id.to_string());
            return Ok(None);
        }

        let spec_path = spec::spec_path(&session.temp_dir, batch_id);
        let log_path = spec::log_path(&session.temp_dir, batch_id);
        let launched = worker_spec
            .write(&spec_path)
            .and_then(|_| self.launcher.launch(&worker_spec, &spec_path, &log_path));

        let Some(batch) = session.batch_mut(batch_id) else {
            return Err(WorkerError::UnknownBatch(batch_id.to_string()).into());
        };

        let worker = match launched {
            Ok(handle) => {
                info!(
                    "Launched batch {} ({} document(s), attempt {})",
                    batch_id,
                    worker_spec.documents.len(),
                    batch.attempts + 1
                );
                batch.status = BatchStatus::Running;
                batch.start_time = Some(Utc::now());
                batch.end_time = None;
                batch.attempts += 1;
                batch.last_error = None;
                for doc in &mut batch.documents {
                    if !doc.is_terminal() {
                        doc.status = DocumentStatus::Running;
                    }
                }
                report.launched += 1;
                Some(ActiveWorker {
                    batch_id: batch_id.to_string(),
                    handle,
                    started: Instant::now(),
                })
            }
            Err(e) => {
                error!("{}", e);
                batch.attempts += 1;
                batch.status = BatchStatus::Failed;
                batch.last_error = Some(e.to_string());
                report.failed.push(BatchFailure {
                    batch_id: batch_id.to_string(),
                    reason: e.to_string(),
                });
                None
            }
        };

        session.touch();
        self.store.save(session)?;
        Ok(worker)
    }

    fn poll(&self, worker: &mut ActiveWorker) -> Option<Outcome> {
        match worker.handle.try_wait() {
            Ok(Some(exit)) => Some(Outcome::Finished(exit)),
            Ok(None) if worker.started.elapsed() > self.options.batch_timeout => {
                warn!(
                    "Batch {} exceeded its {}s timeout, terminating worker",
                    worker.batch_id,
                    self.options.batch_timeout.as_secs()
                );
                if let Err(e) = worker.handle.kill() {
                    error!("Failed to terminate worker for {}: {}", worker.batch_id, e);
                }
                Some(Outcome::TimedOut)
            }
            Ok(None) => None,
            Err(e) => {
                let err = WorkerError::Poll {
                    batch_id: worker.batch_id.clone(),
                    source: e,
                };
                error!("{}", err);
                if let Err(e) = worker.handle.kill() {
                    error!("Failed to terminate worker for {}: {}", worker.batch_id, e);
                }
                Some(Outcome::PollFailed(err.to_string()))
            }
        }
    }

    fn finish(&self, session: &mut Session, batch_id: &str, outcome: Outcome, report: &mut RunReport) {
        reconcile(session, batch_id);
        let timeout = self.options.batch_timeout;
        let Some(batch) = session.batch_mut(batch_id) else {
            return;
        };

        let unfinished = batch.documents.len() - batch.terminal_documents();
        let now = Utc::now();

        let failure = match outcome {
            Outcome::Finished(WorkerExit::Code(code)) if unfinished == 0 => {
                if code != EXIT_FINISHED {
                    debug!("Batch {} exited with {} but every document is done", batch_id, code);
                }
                None
            }
            Outcome::Finished(WorkerExit::Code(EXIT_STOPPED)) => {
                info!(
                    "Batch {} stopped with {} document(s) left, returning it to pending",
                    batch_id, unfinished
                );
                batch.reset_for_rerun();
                return;
            }
            Outcome::Finished(WorkerExit::Code(EXIT_FINISHED)) => Some(format!(
                "worker exited without results for {} document(s)",
                unfinished
            )),
            Outcome::Finished(exit) => Some(format!(
                "worker {} with {} document(s) unfinished",
                exit.describe(),
                unfinished
            )),
            Outcome::TimedOut => Some(format!(
                "timed out after {}s with {} document(s) unfinished",
                timeout.as_secs(),
                unfinished
            )),
            Outcome::PollFailed(reason) => Some(reason),
        };

        match failure {
            None => {
                batch.refresh_status();
                batch.end_time = Some(now);
                info!("Batch {} completed", batch_id);
                report.completed.push(batch_id.to_string());
            }
            Some(reason) => {
                for doc in &mut batch.documents {
                    if doc.status == DocumentStatus::Running {
                        doc.mark_pending();
                    }
                }
                batch.status = BatchStatus::Failed;
                batch.end_time = Some(now);
                batch.last_error = Some(reason.clone());
                warn!("Batch {} failed: {}", batch_id, reason);
                report.failed.push(BatchFailure {
                    batch_id: batch_id.to_string(),
                    reason,
                });
            }
        }
    }
}

/// Folds the batch's artifacts into document statuses. Returns whether
/// anything changed.
pub fn reconcile(session: &mut Session, batch_id: &str) -> bool {
    let output_dir = session.output_dir.clone();
    let Some(batch) = session.batch_mut(batch_id) else {
        return false;
    };

    let mut changed = false;
    for doc in &mut batch.documents {
        if doc.status == DocumentStatus::Completed {
            continue;
        }
        match artifact::inspect(&output_dir, batch_id, &doc.document_path) {
            ArtifactState::Completed(path) => {
                doc.mark_completed(path);
                changed = true;
            }
            ArtifactState::Failed(error) => {
                if doc.status != DocumentStatus::Failed || doc.error.as_deref() != Some(error.as_str()) {
                    doc.mark_failed(error);
                    changed = true;
                }
            }
            ArtifactState::Missing | ArtifactState::Malformed(_) => {}
        }
    }

    if changed {
        batch.update_progress();
    }
    changed
}
