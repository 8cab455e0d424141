//! Session lifecycle: create, run with retries, resume, clean up.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

use crate::config::Config;
use crate::error::{DocbatchError, PlanningError, ResumeError, Result, StateError};
use crate::planner;
use crate::resume::{ResumeCoordinator, ResumePlan, ResumePreview};
use crate::session::{generate_session_id, BatchStatus, Session, SessionStatus};
use crate::storage::{filesystem, StateStore};
use crate::worker::retry::{interruptible_sleep, RetryPolicy};
use crate::worker::{BatchFailure, Supervisor, SupervisorOptions, WorkerLauncher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Supervisor runs performed, retries included.
    pub runs: u32,
    pub interrupted: bool,
    pub completed_batches: usize,
    pub failed_batches: Vec<BatchFailure>,
    pub pending_batches: usize,
}

impl RunOutcome {
    fn from_session(session: &Session, runs: u32, interrupted: bool) -> Self {
        let failed_batches = session
            .batches
            .iter()
            .filter(|b| b.status == BatchStatus::Failed)
            .map(|b| BatchFailure {
                batch_id: b.batch_id.clone(),
                reason: b.last_error.clone().unwrap_or_default(),
            })
            .collect();
        Self {
            runs,
            interrupted,
            completed_batches: session
                .batches
                .iter()
                .filter(|b| b.status == BatchStatus::Completed)
                .count(),
            failed_batches,
            pending_batches: session
                .batches
                .iter()
                .filter(|b| !b.is_terminal())
                .count(),
        }
    }

    pub fn all_completed(&self) -> bool {
        !self.interrupted && self.failed_batches.is_empty() && self.pending_batches == 0
    }
}

pub struct ResumeOutcome {
    pub session: Session,
    pub preview: ResumePreview,
    pub run: RunOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOptions {
    /// Also delete the state record, its backups and the output directory.
    pub purge: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub temp_dir_removed: bool,
    pub backups_pruned: usize,
    pub output_dir_removed: bool,
    pub backups_removed: usize,
    pub record_removed: bool,
}

pub struct Controller {
    store: StateStore,
    launcher: Box<dyn WorkerLauncher>,
    shutdown: Arc<AtomicBool>,
}

impl Controller {
    pub fn new(store: StateStore, launcher: Box<dyn WorkerLauncher>, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            store,
            launcher,
            shutdown,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Plans `documents` into batches and persists a new session.
    pub fn create_session(&self, config: &Config, documents: &[PathBuf]) -> Result<Session> {
        let session_id = generate_session_id();
        let plan = planner::plan(&session_id, documents, config.worker_count, config.max_per_batch)?;

        let output_dir = absolute(Path::new(&config.output_directory)).join(&session_id);
        let temp_dir = absolute(self.store.state_dir()).join("tmp").join(&session_id);
        for dir in [&output_dir, &temp_dir] {
            filesystem::ensure_directory(dir).map_err(|e| PlanningError::CreateDirectory {
                path: dir.clone(),
                source: e,
            })?;
        }

        let session = Session::new(
            session_id,
            config.clone(),
            temp_dir,
            output_dir,
            plan.batches,
            plan.issues.iter().map(ToString::to_string).collect(),
        );
        self.store.save(&session)?;

        info!(
            "Created session {}: {} documents in {} batches",
            session.session_id,
            session.total_documents,
            session.batches.len()
        );
        Ok(session)
    }

    /// Runs the session's pending batches, re-running failed batches with
    /// backoff up to the configured number of runs.
    pub fn run(&self, session: &mut Session) -> Result<RunOutcome> {
        let policy = RetryPolicy::from(&session.config_snapshot.retry);
        let options = SupervisorOptions::from_config(&session.config_snapshot);
        let supervisor = Supervisor::new(
            &self.store,
            self.launcher.as_ref(),
            options,
            Arc::clone(&self.shutdown),
        );

        let mut runs = 0;
        let mut interrupted = false;
        loop {
            let report = supervisor.run_attempt(session, policy.should_retry(runs + 1))?;
            runs += 1;
            if report.interrupted || self.shutdown.load(Ordering::Relaxed) {
                interrupted = true;
                break;
            }

            let retryable = session.retryable_batches();
            if retryable.is_empty() || !policy.should_retry(runs) {
                break;
            }

            let delay = policy.delay_for(runs - 1);
            info!(
                "Retrying {} failed batch(es) in {:.1}s (run {} of {})",
                retryable.len(),
                delay.as_secs_f64(),
                runs + 1,
                policy.max_attempts
            );
            if !interruptible_sleep(delay, &self.shutdown) {
                interrupted = true;
                break;
            }

            for batch_id in &retryable {
                if let Some(batch) = session.batch_mut(batch_id) {
                    batch.reset_for_rerun();
                }
            }
        }

        if session.status == SessionStatus::Running {
            // kept running for a retry that did not happen
            session.refresh();
            if !session.is_terminal() {
                session.status = SessionStatus::Paused;
            }
            self.store.save(session)?;
        }

        let outcome = RunOutcome::from_session(session, runs, interrupted);
        if !outcome.failed_batches.is_empty() {
            warn!(
                "Session {} finished with {} failed batch(es)",
                session.session_id,
                outcome.failed_batches.len()
            );
        }
        Ok(outcome)
    }

    pub fn resume(&self, session_id: &str, force: bool) -> Result<ResumeOutcome> {
        let plan = self.prepare_resume(session_id, force)?;
        self.run_resumed(plan)
    }

    /// Reconciles and saves the session so the record reflects what is left
    /// to run. Nothing is launched.
    pub fn prepare_resume(&self, session_id: &str, force: bool) -> Result<ResumePlan> {
        ResumeCoordinator::new(&self.store).prepare(session_id, force)
    }

    pub fn run_resumed(&self, plan: ResumePlan) -> Result<ResumeOutcome> {
        let preview = plan.preview.clone();
        let mut session = plan.session;

        let run = if preview.incomplete_batches.is_empty() {
            info!("Session {} has no remaining work", session.session_id);
            RunOutcome::from_session(&session, 0, false)
        } else {
            self.run(&mut session)?
        };

        Ok(ResumeOutcome {
            session,
            preview,
            run,
        })
    }

    pub fn cleanup(&self, session_id: &str, options: CleanupOptions) -> Result<CleanupReport> {
        let session = self
            .store
            .load(session_id)?
            .ok_or_else(|| DocbatchError::from(ResumeError::NotFound(session_id.to_string())))?;

        let remove_err = |path: &Path, e: std::io::Error| StateError::Remove {
            path: path.to_path_buf(),
            source: e,
        };

        let mut report = CleanupReport {
            temp_dir_removed: filesystem::remove_dir_if_exists(&session.temp_dir)
                .map_err(|e| remove_err(&session.temp_dir, e))?,
            ..CleanupReport::default()
        };

        if options.purge {
            report.output_dir_removed = filesystem::remove_dir_if_exists(&session.output_dir)
                .map_err(|e| remove_err(&session.output_dir, e))?;
            report.backups_removed = self.store.remove_backups(session_id)?;
            report.record_removed = self.store.remove(session_id)?;
            info!("Purged session {}", session_id);
        } else {
            report.backups_pruned = self.store.prune_backups(session_id).removed.len();
            info!(
                "Cleaned up session {} ({} backup(s) pruned)",
                session_id, report.backups_pruned
            );
        }

        Ok(report)
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
