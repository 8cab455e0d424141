use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocbatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Planning error: {0}")]
    Planning(#[from] PlanningError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Resume error: {0}")]
    Resume(#[from] ResumeError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),
}

/// Failure classes surfaced to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    StateCorruption,
    PlanningError,
    WorkerFailure,
    MergeInconsistency,
    Configuration,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::StateCorruption => "state-corruption",
            ErrorClass::PlanningError => "planning-error",
            ErrorClass::WorkerFailure => "worker-failure",
            ErrorClass::MergeInconsistency => "merge-inconsistency",
            ErrorClass::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DocbatchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DocbatchError::Config(_) => ErrorClass::Configuration,
            DocbatchError::State(_) => ErrorClass::StateCorruption,
            DocbatchError::Planning(_) => ErrorClass::PlanningError,
            DocbatchError::Worker(_) => ErrorClass::WorkerFailure,
            DocbatchError::Resume(ResumeError::Refused { .. }) => ErrorClass::StateCorruption,
            DocbatchError::Resume(ResumeError::NotFound(_)) => ErrorClass::StateCorruption,
            DocbatchError::Merge(_) => ErrorClass::MergeInconsistency,
        }
    }

    /// Concrete next step for the operator, when one exists.
    pub fn remediation(&self) -> Option<String> {
        match self {
            DocbatchError::Config(_) => {
                Some("fix the configuration file and run the command again".to_string())
            }
            DocbatchError::State(StateError::Parse { path, .. })
            | DocbatchError::State(StateError::MissingVersion { path })
            | DocbatchError::State(StateError::UnsupportedVersion { path, .. }) => Some(format!(
                "inspect '{}' or restore a copy from the backups/ directory",
                path.display()
            )),
            DocbatchError::State(_) => None,
            DocbatchError::Planning(_) => {
                Some("check that the input documents exist and are readable".to_string())
            }
            DocbatchError::Worker(WorkerError::Spawn { batch_id, .. }) => Some(format!(
                "check the worker executable, then resume the session (batch {})",
                batch_id
            )),
            DocbatchError::Worker(_) => {
                Some("inspect the batch logs under the session temp directory, then resume".to_string())
            }
            DocbatchError::Resume(ResumeError::Refused { session_id, .. }) => Some(format!(
                "review the issues with 'preview {}' and re-run with --force to resume anyway",
                session_id
            )),
            DocbatchError::Resume(ResumeError::NotFound(_)) => {
                Some("run 'list' to see the known sessions".to_string())
            }
            DocbatchError::Merge(MergeError::BatchNotTerminal { .. }) => {
                Some("resume the session until every batch has finished".to_string())
            }
            DocbatchError::Merge(MergeError::InvalidRecord { .. }) => Some(
                "resume the session to repair the record, or re-run merge with --force".to_string(),
            ),
            DocbatchError::Merge(MergeError::Inconsistent { .. }) => Some(
                "resume the session to regenerate the missing artifacts, or re-run merge with --force"
                    .to_string(),
            ),
            DocbatchError::Merge(_) => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnv { name: String, value: String },
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to read state file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write state file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file '{path}' is not a valid session record: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("State file '{path}' has no schema_version")]
    MissingVersion { path: PathBuf },

    #[error("State file '{path}' has schema version {found}, this build supports up to {supported}")]
    UnsupportedVersion {
        path: PathBuf,
        found: u64,
        supported: u32,
    },

    #[error("Failed to serialize session '{session_id}': {source}")]
    Serialize {
        session_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid session id '{0}'")]
    InvalidSessionId(String),
}

#[derive(Error, Debug)]
pub enum PlanningError {
    #[error("No processable documents remain after validation ({excluded} excluded)")]
    NoDocuments { excluded: usize },

    #[error("worker_count must be at least 1")]
    InvalidWorkerCount,

    #[error("max_per_batch must be at least 1")]
    InvalidBatchSize,

    #[error("Directory scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Invalid exclude pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Failed to create session directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Document '{0}' is not valid UTF-8 text")]
    InvalidEncoding(PathBuf),

    #[error("Processor is not configured: {0}")]
    NotConfigured(String),

    #[error("Failed to run command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Processor output is not valid JSON: {0}")]
    InvalidOutput(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker for batch {batch_id}: {source}")]
    Spawn {
        batch_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write worker spec '{path}': {source}")]
    WriteSpec {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read worker spec '{path}': {reason}")]
    ReadSpec { path: PathBuf, reason: String },

    #[error("Failed to poll worker for batch {batch_id}: {source}")]
    Poll {
        batch_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write artifact '{path}': {source}")]
    WriteArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown batch '{0}'")]
    UnknownBatch(String),
}

#[derive(Error, Debug)]
pub enum ResumeError {
    #[error("No state record found for session '{0}'")]
    NotFound(String),

    #[error("Resume of session '{session_id}' refused, {} unresolved issue(s): {}", .issues.len(), .issues.join("; "))]
    Refused {
        session_id: String,
        issues: Vec<String>,
    },
}

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Batch {batch_id} is still {status}, merge needs every batch finished")]
    BatchNotTerminal { batch_id: String, status: String },

    #[error("Session record has {} unresolved issue(s): {}", .issues.len(), .issues.join("; "))]
    InvalidRecord { issues: Vec<String> },

    #[error("{} completed document(s) have no usable artifact: {}", .missing.len(), format_missing(.missing))]
    Inconsistent { missing: Vec<MissingArtifact> },

    #[error("Failed to render report: {0}")]
    Render(String),

    #[error("Failed to write '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A completed document whose result artifact could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingArtifact {
    pub batch_id: String,
    pub document_path: PathBuf,
    pub reason: String,
}

fn format_missing(missing: &[MissingArtifact]) -> String {
    missing
        .iter()
        .map(|m| format!("{} [{}] ({})", m.document_path.display(), m.batch_id, m.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, DocbatchError>;
