//! Shared utilities for docbatch integration tests.
//!
//! - `TestHarness`: isolated temp directories, config and controller setup
//! - `CountingProcessor`: a processor that records every invocation

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use docbatch::config::{Config, ProcessingSettings, RetryConfig};
use docbatch::error::ProcessError;
use docbatch::processor::text::TextProcessor;
use docbatch::{BackupPolicy, Controller, DocumentProcessor, StateStore, ThreadLauncher};

/// Wraps the text processor, counts calls and fails (or panics, like a
/// crashing worker) on chosen file names.
pub struct CountingProcessor {
    calls: AtomicUsize,
    seen: Mutex<Vec<PathBuf>>,
    fail_on: Vec<String>,
    crash_on: Vec<String>,
    inner: TextProcessor,
}

impl CountingProcessor {
    pub fn new() -> Arc<Self> {
        Self::failing_on(&[])
    }

    pub fn failing_on(names: &[&str]) -> Arc<Self> {
        Self::build(names, &[])
    }

    pub fn crashing_on(names: &[&str]) -> Arc<Self> {
        Self::build(&[], names)
    }

    fn build(fail_on: &[&str], crash_on: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            fail_on: fail_on.iter().map(|n| n.to_string()).collect(),
            crash_on: crash_on.iter().map(|n| n.to_string()).collect(),
            inner: TextProcessor::new(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

impl DocumentProcessor for CountingProcessor {
    fn process(
        &self,
        path: &Path,
        settings: &ProcessingSettings,
    ) -> Result<serde_json::Value, ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(path.to_path_buf());

        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if self.crash_on.iter().any(|c| c == name) {
            panic!("worker crashed on {}", name);
        }
        if self.fail_on.iter().any(|f| f == name) {
            return Err(ProcessError::InvalidOutput(format!("refused {}", name)));
        }
        self.inner.process(path, settings)
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Isolated environment: documents, state and output under one temp dir.
pub struct TestHarness {
    temp_dir: TempDir,
    pub docs_dir: PathBuf,
    pub state_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let docs_dir = base.join("docs");
        std::fs::create_dir_all(&docs_dir).expect("Failed to create docs dir");

        Self {
            docs_dir,
            state_dir: base.join("state"),
            output_dir: base.join("out"),
            temp_dir,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `count` text documents named `doc-NN.txt`, in name order.
    pub fn write_docs(&self, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = self.docs_dir.join(format!("doc-{:02}.txt", i));
                std::fs::write(&path, format!("Document {}\nwith two lines\n", i))
                    .expect("Failed to write document");
                path
            })
            .collect()
    }

    pub fn config(&self, worker_count: usize, max_per_batch: usize) -> Config {
        Config {
            output_directory: self.output_dir.to_string_lossy().to_string(),
            state_directory: Some(self.state_dir.to_string_lossy().to_string()),
            worker_count,
            max_per_batch,
            poll_interval_ms: 5,
            retry: RetryConfig {
                max_attempts: 1,
                ..RetryConfig::default()
            },
            ..Config::default()
        }
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(&self.state_dir, BackupPolicy::default())
    }

    pub fn controller(&self, processor: Arc<dyn DocumentProcessor>) -> Controller {
        self.controller_with_shutdown(processor, Arc::new(AtomicBool::new(false)))
    }

    pub fn controller_with_shutdown(
        &self,
        processor: Arc<dyn DocumentProcessor>,
        shutdown: Arc<AtomicBool>,
    ) -> Controller {
        Controller::new(self.store(), Box::new(ThreadLauncher::new(processor)), shutdown)
    }
}
