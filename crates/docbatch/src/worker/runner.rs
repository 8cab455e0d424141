use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};
use tracing::info_span;

use crate::error::WorkerError;
use crate::processor::{build_processor, DocumentProcessor};
use crate::sanitize;
use crate::worker::artifact::{self, ArtifactState};
use crate::worker::spec::WorkerSpec;

pub const EXIT_FINISHED: i32 = 0;
pub const EXIT_FATAL: i32 = 1;
pub const EXIT_STOPPED: i32 = 3;

/// Recorded for a document whose processor produced `null`. Such a result can
/// never be accepted as an artifact, so it is kept as a terminal failure.
pub const NULL_RESULT_ERROR: &str = "processor returned null";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub stopped_early: bool,
}

impl WorkerSummary {
    pub fn exit_code(&self) -> i32 {
        if self.stopped_early {
            EXIT_STOPPED
        } else {
            EXIT_FINISHED
        }
    }
}

/// Processes the worker spec's documents in order, one artifact per document.
///
/// `should_stop` is checked before each document; an in-flight document is
/// always finished. Never touches the session record.
pub fn run_worker(
    spec: &WorkerSpec,
    processor: &dyn DocumentProcessor,
    should_stop: &dyn Fn() -> bool,
) -> Result<WorkerSummary, WorkerError> {
    let _batch_span = info_span!("batch",
        session_id = %spec.session_id,
        batch_id = %spec.batch_id,
        documents = spec.documents.len(),
    )
    .entered();

    let mut summary = WorkerSummary::default();

    for document in &spec.documents {
        if should_stop() {
            info!(
                "Stop requested, leaving batch {} with {} document(s) done",
                spec.batch_id,
                summary.processed + summary.failed + summary.skipped
            );
            summary.stopped_early = true;
            break;
        }

        let _doc_span = info_span!("document", filename = %sanitize::redact_path(document)).entered();

        if let ArtifactState::Completed(_) = artifact::inspect(&spec.output_dir, &spec.batch_id, document) {
            summary.skipped += 1;
            continue;
        }

        match processor.process(document, &spec.processing) {
            Ok(result) if result.is_null() => {
                warn!("Processor returned null for {}", sanitize::redact_path(document));
                artifact::write_failure(
                    &spec.output_dir,
                    &spec.session_id,
                    &spec.batch_id,
                    document,
                    NULL_RESULT_ERROR,
                )?;
                summary.failed += 1;
            }
            Ok(result) => {
                artifact::write_result(
                    &spec.output_dir,
                    &spec.session_id,
                    &spec.batch_id,
                    document,
                    result,
                )?;
                summary.processed += 1;
            }
            Err(e) => {
                warn!("Failed to process {}: {}", sanitize::redact_path(document), e);
                artifact::write_failure(
                    &spec.output_dir,
                    &spec.session_id,
                    &spec.batch_id,
                    document,
                    &e.to_string(),
                )?;
                summary.failed += 1;
            }
        }
    }

    info!(
        "Batch {} worker done: {} processed, {} failed, {} skipped",
        spec.batch_id, summary.processed, summary.failed, summary.skipped
    );
    Ok(summary)
}

/// Entry point of a worker process. Returns the process exit code.
pub fn run_from_spec_file(spec_path: &Path, interrupted: &AtomicBool) -> i32 {
    let spec = match WorkerSpec::read(spec_path) {
        Ok(spec) => spec,
        Err(e) => {
            error!("{}", e);
            return EXIT_FATAL;
        }
    };

    let processor = build_processor(&spec.processing);
    let should_stop = || interrupted.load(Ordering::Relaxed) || spec.stop_requested();

    match run_worker(&spec, processor.as_ref(), &should_stop) {
        Ok(summary) => summary.exit_code(),
        Err(e) => {
            error!("Worker for batch {} aborted: {}", spec.batch_id, e);
            EXIT_FATAL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessingSettings;
    use crate::error::ProcessError;
    use std::cell::Cell;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    const SESSION: &str = "20260101_120000_abcdef01";

    struct Scripted {
        calls: AtomicUsize,
        fail_on: Option<&'static str>,
    }

    struct Silent {
        calls: AtomicUsize,
    }

    impl DocumentProcessor for Silent {
        fn process(
            &self,
            _path: &Path,
            _settings: &ProcessingSettings,
        ) -> Result<serde_json::Value, ProcessError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::Value::Null)
        }

        fn name(&self) -> &'static str {
            "silent"
        }
    }

    impl DocumentProcessor for Scripted {
        fn process(
            &self,
            path: &Path,
            _settings: &ProcessingSettings,
        ) -> Result<serde_json::Value, ProcessError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.map(|n| path.ends_with(n)).unwrap_or(false) {
                return Err(ProcessError::NotConfigured("scripted failure".to_string()));
            }
            Ok(serde_json::json!({ "doc": path.to_string_lossy() }))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn spec(temp_dir: &TempDir, names: &[&str]) -> WorkerSpec {
        WorkerSpec {
            session_id: SESSION.to_string(),
            batch_id: format!("{}-1", SESSION),
            documents: names.iter().map(|n| PathBuf::from("/d").join(n)).collect(),
            output_dir: temp_dir.path().join("out"),
            stop_file: temp_dir.path().join("STOP"),
            processing: ProcessingSettings::default(),
        }
    }

    #[test]
    fn test_processes_all_and_records_failures() {
        let temp_dir = TempDir::new().unwrap();
        let spec = spec(&temp_dir, &["a.pdf", "b.pdf", "c.pdf"]);
        let processor = Scripted {
            calls: AtomicUsize::new(0),
            fail_on: Some("b.pdf"),
        };

        let summary = run_worker(&spec, &processor, &|| false).unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.exit_code(), EXIT_FINISHED);
        assert!(matches!(
            artifact::inspect(&spec.output_dir, &spec.batch_id, Path::new("/d/b.pdf")),
            ArtifactState::Failed(_)
        ));
    }

    #[test]
    fn test_null_result_is_recorded_as_failure() {
        let temp_dir = TempDir::new().unwrap();
        let spec = spec(&temp_dir, &["a.pdf"]);
        let processor = Silent {
            calls: AtomicUsize::new(0),
        };

        let summary = run_worker(&spec, &processor, &|| false).unwrap();

        assert_eq!(summary.processed, 0);
        assert_eq!(summary.failed, 1);
        match artifact::inspect(&spec.output_dir, &spec.batch_id, Path::new("/d/a.pdf")) {
            ArtifactState::Failed(error) => assert_eq!(error, NULL_RESULT_ERROR),
            other => panic!("expected a failure marker, got {:?}", other),
        }
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_skips_documents_with_valid_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        let spec = spec(&temp_dir, &["a.pdf", "b.pdf"]);
        let processor = Scripted {
            calls: AtomicUsize::new(0),
            fail_on: None,
        };

        run_worker(&spec, &processor, &|| false).unwrap();
        let summary = run_worker(&spec, &processor, &|| false).unwrap();

        assert_eq!(summary.skipped, 2);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stop_signal_halts_between_documents() {
        let temp_dir = TempDir::new().unwrap();
        let spec = spec(&temp_dir, &["a.pdf", "b.pdf", "c.pdf"]);
        let processor = Scripted {
            calls: AtomicUsize::new(0),
            fail_on: None,
        };
        let checks = Cell::new(0);
        let should_stop = || {
            checks.set(checks.get() + 1);
            checks.get() > 1
        };

        let summary = run_worker(&spec, &processor, &should_stop).unwrap();

        assert_eq!(summary.processed, 1);
        assert!(summary.stopped_early);
        assert_eq!(summary.exit_code(), EXIT_STOPPED);
    }

    #[test]
    fn test_run_from_spec_file_honours_stop_file() {
        let temp_dir = TempDir::new().unwrap();
        let spec = spec(&temp_dir, &["a.pdf"]);
        let spec_path = temp_dir.path().join("spec.json");
        spec.write(&spec_path).unwrap();
        std::fs::write(&spec.stop_file, b"").unwrap();

        let code = run_from_spec_file(&spec_path, &AtomicBool::new(false));
        assert_eq!(code, EXIT_STOPPED);
    }

    #[test]
    fn test_run_from_missing_spec_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let code = run_from_spec_file(&temp_dir.path().join("absent.json"), &AtomicBool::new(false));
        assert_eq!(code, EXIT_FATAL);
    }
}
