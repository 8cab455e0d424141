//! Ways to start a batch worker and observe it until it exits.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::debug;

use crate::error::WorkerError;
use crate::processor::DocumentProcessor;
use crate::storage::filesystem;
use crate::worker::runner::{run_worker, EXIT_FATAL};
use crate::worker::spec::WorkerSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// The worker exited on its own with this code.
    Code(i32),
    /// Killed by a signal or panicked.
    Crashed(String),
}

impl WorkerExit {
    pub fn describe(&self) -> String {
        match self {
            WorkerExit::Code(code) => format!("exit code {}", code),
            WorkerExit::Crashed(reason) => format!("crashed: {}", reason),
        }
    }
}

pub trait WorkerHandle {
    fn batch_id(&self) -> &str;

    /// Non-blocking. `Ok(None)` while the worker is still running.
    fn try_wait(&mut self) -> std::io::Result<Option<WorkerExit>>;

    /// Terminates the worker as promptly as the launcher allows.
    fn kill(&mut self) -> std::io::Result<()>;
}

pub trait WorkerLauncher: Send + Sync {
    fn launch(
        &self,
        spec: &WorkerSpec,
        spec_path: &Path,
        log_path: &Path,
    ) -> Result<Box<dyn WorkerHandle>, WorkerError>;
}

/// Runs each batch in its own OS process: `{program} worker --spec {path}`.
pub struct ProcessLauncher {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            extra_args: Vec::new(),
        }
    }

    /// Launches workers with the currently running executable.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Arguments placed before the `worker` subcommand (global flags).
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(
        &self,
        spec: &WorkerSpec,
        spec_path: &Path,
        log_path: &Path,
    ) -> Result<Box<dyn WorkerHandle>, WorkerError> {
        let spawn_err = |e: std::io::Error| WorkerError::Spawn {
            batch_id: spec.batch_id.clone(),
            source: e,
        };

        if let Some(dir) = log_path.parent() {
            filesystem::ensure_directory(dir).map_err(spawn_err)?;
        }
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(spawn_err)?;
        let log_err = log.try_clone().map_err(spawn_err)?;

        let child = Command::new(&self.program)
            .args(&self.extra_args)
            .arg("worker")
            .arg("--spec")
            .arg(spec_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(spawn_err)?;

        debug!("Spawned worker pid {} for batch {}", child.id(), spec.batch_id);

        Ok(Box::new(ProcessHandle {
            batch_id: spec.batch_id.clone(),
            child,
        }))
    }
}

struct ProcessHandle {
    batch_id: String,
    child: Child,
}

impl WorkerHandle for ProcessHandle {
    fn batch_id(&self) -> &str {
        &self.batch_id
    }

    fn try_wait(&mut self) -> std::io::Result<Option<WorkerExit>> {
        Ok(self.child.try_wait()?.map(|status| match status.code() {
            Some(code) => WorkerExit::Code(code),
            None => WorkerExit::Crashed(status.to_string()),
        }))
    }

    fn kill(&mut self) -> std::io::Result<()> {
        match self.child.kill() {
            Ok(()) => {}
            // already exited
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        self.child.wait().map(|_| ())
    }
}

/// Runs each batch on a named thread of the current process with an injected
/// processor. A panicking worker is reported as a crash.
///
/// Threads cannot be interrupted mid-document, so `kill` blocks until the
/// in-flight document is finished and the thread has exited.
pub struct ThreadLauncher {
    processor: Arc<dyn DocumentProcessor>,
}

impl ThreadLauncher {
    pub fn new(processor: Arc<dyn DocumentProcessor>) -> Self {
        Self { processor }
    }
}

impl WorkerLauncher for ThreadLauncher {
    fn launch(
        &self,
        spec: &WorkerSpec,
        _spec_path: &Path,
        _log_path: &Path,
    ) -> Result<Box<dyn WorkerHandle>, WorkerError> {
        let killed = Arc::new(AtomicBool::new(false));
        let killed_flag = Arc::clone(&killed);
        let processor = Arc::clone(&self.processor);
        let worker_spec = spec.clone();

        let handle = thread::Builder::new()
            .name(format!("docbatch-{}", spec.batch_id))
            .spawn(move || {
                let should_stop =
                    || killed_flag.load(Ordering::Relaxed) || worker_spec.stop_requested();
                match run_worker(&worker_spec, processor.as_ref(), &should_stop) {
                    Ok(summary) => summary.exit_code(),
                    Err(e) => {
                        log::error!("Worker for batch {} aborted: {}", worker_spec.batch_id, e);
                        EXIT_FATAL
                    }
                }
            })
            .map_err(|e| WorkerError::Spawn {
                batch_id: spec.batch_id.clone(),
                source: e,
            })?;

        Ok(Box::new(ThreadHandle {
            batch_id: spec.batch_id.clone(),
            handle: Some(handle),
            killed,
        }))
    }
}

struct ThreadHandle {
    batch_id: String,
    handle: Option<JoinHandle<i32>>,
    killed: Arc<AtomicBool>,
}

impl WorkerHandle for ThreadHandle {
    fn batch_id(&self) -> &str {
        &self.batch_id
    }

    fn try_wait(&mut self) -> std::io::Result<Option<WorkerExit>> {
        let finished = match &self.handle {
            Some(handle) => handle.is_finished(),
            None => return Ok(Some(WorkerExit::Crashed("already reaped".to_string()))),
        };
        if !finished {
            return Ok(None);
        }

        let exit = match self.handle.take().map(JoinHandle::join) {
            Some(Ok(code)) => WorkerExit::Code(code),
            Some(Err(panic)) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic".to_string());
                WorkerExit::Crashed(format!("worker panicked: {}", message))
            }
            None => WorkerExit::Crashed("already reaped".to_string()),
        };
        Ok(Some(exit))
    }

    /// Stops the worker before its next document and joins the thread.
    fn kill(&mut self) -> std::io::Result<()> {
        self.killed.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("Worker thread for {} panicked while stopping", self.batch_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessingSettings;
    use crate::error::ProcessError;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    struct Panicking;

    impl DocumentProcessor for Panicking {
        fn process(
            &self,
            _path: &Path,
            _settings: &ProcessingSettings,
        ) -> Result<serde_json::Value, ProcessError> {
            panic!("segfault in extractor")
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    struct Slow {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl DocumentProcessor for Slow {
        fn process(
            &self,
            _path: &Path,
            _settings: &ProcessingSettings,
        ) -> Result<serde_json::Value, ProcessError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(150));
            Ok(serde_json::json!({ "ok": true }))
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn wait_for(handle: &mut Box<dyn WorkerHandle>) -> WorkerExit {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(exit) = handle.try_wait().unwrap() {
                return exit;
            }
            assert!(Instant::now() < deadline, "worker did not finish");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn spec(temp_dir: &TempDir) -> WorkerSpec {
        let doc = temp_dir.path().join("a.txt");
        std::fs::write(&doc, "alpha beta").unwrap();
        WorkerSpec {
            session_id: "20260101_120000_abcdef01".to_string(),
            batch_id: "20260101_120000_abcdef01-1".to_string(),
            documents: vec![doc],
            output_dir: temp_dir.path().join("out"),
            stop_file: temp_dir.path().join("STOP"),
            processing: ProcessingSettings::default(),
        }
    }

    #[test]
    fn test_thread_launcher_runs_to_completion() {
        let temp_dir = TempDir::new().unwrap();
        let spec = spec(&temp_dir);
        let launcher = ThreadLauncher::new(Arc::new(crate::processor::text::TextProcessor::new()));

        let mut handle = launcher
            .launch(&spec, Path::new("unused"), Path::new("unused"))
            .unwrap();

        assert_eq!(handle.batch_id(), spec.batch_id);
        assert_eq!(wait_for(&mut handle), WorkerExit::Code(0));
    }

    #[test]
    fn test_thread_launcher_reports_panic_as_crash() {
        let temp_dir = TempDir::new().unwrap();
        let spec = spec(&temp_dir);
        let launcher = ThreadLauncher::new(Arc::new(Panicking));

        let mut handle = launcher
            .launch(&spec, Path::new("unused"), Path::new("unused"))
            .unwrap();

        match wait_for(&mut handle) {
            WorkerExit::Crashed(reason) => assert!(reason.contains("segfault")),
            other => panic!("Expected crash, got {:?}", other),
        }
    }

    #[test]
    fn test_thread_kill_waits_for_in_flight_document() {
        let temp_dir = TempDir::new().unwrap();
        let mut spec = spec(&temp_dir);
        for name in ["b.txt", "c.txt"] {
            let doc = temp_dir.path().join(name);
            std::fs::write(&doc, "gamma").unwrap();
            spec.documents.push(doc);
        }
        let processor = Arc::new(Slow {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let launcher = ThreadLauncher::new(processor.clone());

        let mut handle = launcher
            .launch(&spec, Path::new("unused"), Path::new("unused"))
            .unwrap();
        std::thread::sleep(Duration::from_millis(30));
        handle.kill().unwrap();

        // the first document was finished before kill returned
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            crate::worker::artifact::inspect(&spec.output_dir, &spec.batch_id, &spec.documents[0]),
            crate::worker::artifact::ArtifactState::Completed(_)
        ));

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_launcher_redirects_output_to_log() {
        let temp_dir = TempDir::new().unwrap();
        let spec = spec(&temp_dir);
        let log_path = temp_dir.path().join("logs/batch.log");
        let launcher = ProcessLauncher::new("sh").with_args(vec![
            "-c".to_string(),
            "echo \"$0 $1 $2\"".to_string(),
        ]);

        let mut handle = launcher
            .launch(&spec, Path::new("/tmp/spec.json"), &log_path)
            .unwrap();

        assert_eq!(wait_for(&mut handle), WorkerExit::Code(0));
        let log = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(log.trim(), "worker --spec /tmp/spec.json");
    }

    #[test]
    fn test_process_launcher_missing_program() {
        let temp_dir = TempDir::new().unwrap();
        let spec = spec(&temp_dir);
        let launcher = ProcessLauncher::new("/nonexistent/docbatch");

        let result = launcher.launch(&spec, Path::new("s.json"), &temp_dir.path().join("l.log"));
        assert!(matches!(result, Err(WorkerError::Spawn { .. })));
    }
}
