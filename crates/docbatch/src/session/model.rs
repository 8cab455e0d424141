//! Typed session, batch and document records.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Version written into every persisted session record.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Initializing,
    Running,
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Initializing => "initializing",
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Running => "running",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Running => "running",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub document_path: PathBuf,
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Document {
    pub fn new(document_path: PathBuf) -> Self {
        let mime_type = mime_guess::from_path(&document_path)
            .first()
            .map(|m| m.to_string());
        Self {
            document_path,
            status: DocumentStatus::Pending,
            result_file: None,
            error: None,
            mime_type,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn mark_completed(&mut self, result_file: PathBuf) {
        self.status = DocumentStatus::Completed;
        self.result_file = Some(result_file);
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = DocumentStatus::Failed;
        self.result_file = None;
        self.error = Some(error);
    }

    /// Back to "unknown": rechecked against artifacts on the next run.
    pub fn mark_pending(&mut self) {
        self.status = DocumentStatus::Pending;
        self.result_file = None;
        self.error = None;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: String,
    pub status: BatchStatus,
    pub documents: Vec<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Batch {
    pub fn new(batch_id: String, documents: Vec<PathBuf>) -> Self {
        Self {
            batch_id,
            status: BatchStatus::Pending,
            documents: documents.into_iter().map(Document::new).collect(),
            start_time: None,
            end_time: None,
            progress: 0,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn all_documents_terminal(&self) -> bool {
        self.documents.iter().all(Document::is_terminal)
    }

    pub fn terminal_documents(&self) -> usize {
        self.documents.iter().filter(|d| d.is_terminal()).count()
    }

    /// Documents a worker still has to process, in batch order.
    pub fn unfinished_documents(&self) -> Vec<PathBuf> {
        self.documents
            .iter()
            .filter(|d| d.status != DocumentStatus::Completed)
            .map(|d| d.document_path.clone())
            .collect()
    }

    pub fn document_mut(&mut self, path: &Path) -> Option<&mut Document> {
        self.documents.iter_mut().find(|d| d.document_path == path)
    }

    /// Raises `progress` to the share of terminal documents; never lowers it.
    pub fn update_progress(&mut self) {
        let total = self.documents.len();
        let computed = if total == 0 {
            100
        } else {
            (self.terminal_documents() * 100 / total) as u8
        };
        self.progress = self.progress.max(computed).min(100);
    }

    /// Derives the batch status from its documents. A batch is completed iff
    /// every document is terminal.
    pub fn refresh_status(&mut self) {
        if self.all_documents_terminal() {
            if self.status != BatchStatus::Completed {
                self.status = BatchStatus::Completed;
                self.end_time.get_or_insert_with(Utc::now);
            }
            self.progress = 100;
        } else if self.status == BatchStatus::Completed {
            self.status = BatchStatus::Pending;
            self.end_time = None;
        }
    }

    /// Resets the batch so a worker re-processes its unfinished documents.
    pub fn reset_for_rerun(&mut self) {
        for doc in &mut self.documents {
            if doc.status == DocumentStatus::Running {
                doc.mark_pending();
            }
        }
        self.status = BatchStatus::Pending;
        self.start_time = None;
        self.end_time = None;
    }
}

/// Short, list-friendly view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_documents: usize,
    pub completed_documents: usize,
    pub failed_documents: usize,
    pub batch_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub schema_version: u32,
    pub session_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub config_snapshot: Config,
    pub total_documents: usize,
    pub completed_documents: usize,
    pub failed_documents: usize,
    pub batches: Vec<Batch>,
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub planning_issues: Vec<String>,
    #[serde(default)]
    pub run_attempts: u32,
}

impl Session {
    pub fn new(
        session_id: String,
        config_snapshot: Config,
        temp_dir: PathBuf,
        output_dir: PathBuf,
        batches: Vec<Batch>,
        planning_issues: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        let mut session = Self {
            schema_version: SCHEMA_VERSION,
            session_id,
            status: SessionStatus::Initializing,
            created_at: now,
            updated_at: now,
            config_snapshot,
            total_documents: 0,
            completed_documents: 0,
            failed_documents: 0,
            batches,
            temp_dir,
            output_dir,
            planning_issues,
            run_attempts: 0,
        };
        session.recompute_counts();
        session
    }

    /// Advances `updated_at`. Called on every mutation.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at { now } else { self.updated_at };
    }

    /// Recomputes aggregate counts from document statuses.
    pub fn recompute_counts(&mut self) {
        let mut total = 0;
        let mut completed = 0;
        let mut failed = 0;
        for doc in self.batches.iter().flat_map(|b| b.documents.iter()) {
            total += 1;
            match doc.status {
                DocumentStatus::Completed => completed += 1,
                DocumentStatus::Failed => failed += 1,
                _ => {}
            }
        }
        self.total_documents = total;
        self.completed_documents = completed;
        self.failed_documents = failed;
    }

    pub fn all_batches_terminal(&self) -> bool {
        self.batches.iter().all(Batch::is_terminal)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Refreshes batch statuses, counts and, when nothing is left to run,
    /// marks the session completed.
    pub fn refresh(&mut self) {
        for batch in &mut self.batches {
            if batch.status != BatchStatus::Running {
                batch.refresh_status();
            }
        }
        self.recompute_counts();
        if self.all_batches_terminal() {
            self.status = SessionStatus::Completed;
        } else if self.status == SessionStatus::Completed {
            self.status = SessionStatus::Paused;
        }
        self.touch();
    }

    pub fn batch(&self, batch_id: &str) -> Option<&Batch> {
        self.batches.iter().find(|b| b.batch_id == batch_id)
    }

    pub fn batch_mut(&mut self, batch_id: &str) -> Option<&mut Batch> {
        self.batches.iter_mut().find(|b| b.batch_id == batch_id)
    }

    pub fn pending_batches(&self) -> Vec<String> {
        self.batches
            .iter()
            .filter(|b| b.status == BatchStatus::Pending)
            .map(|b| b.batch_id.clone())
            .collect()
    }

    /// Failed batches that still have documents worth another attempt.
    pub fn retryable_batches(&self) -> Vec<String> {
        self.batches
            .iter()
            .filter(|b| b.status == BatchStatus::Failed && !b.all_documents_terminal())
            .map(|b| b.batch_id.clone())
            .collect()
    }

    pub fn remaining_documents(&self) -> usize {
        self.batches
            .iter()
            .flat_map(|b| b.documents.iter())
            .filter(|d| !d.is_terminal())
            .count()
    }

    pub fn stop_file(&self) -> PathBuf {
        self.temp_dir.join("STOP")
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            total_documents: self.total_documents,
            completed_documents: self.completed_documents,
            failed_documents: self.failed_documents,
            batch_count: self.batches.len(),
        }
    }
}

/// `{YYYYmmdd_HHMMSS}_{8 hex chars}`, sortable by creation time.
pub fn generate_session_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", timestamp, &suffix[..8])
}

pub fn batch_id(session_id: &str, sequence: usize) -> String {
    format!("{}-{}", session_id, sequence)
}

fn session_id_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{8}_\d{6}_[0-9a-f]{8}$").ok())
        .as_ref()
}

/// Session ids become file names, so only the generated shape is accepted.
pub fn is_valid_session_id(session_id: &str) -> bool {
    session_id_regex().is_some_and(|re| re.is_match(session_id))
}
