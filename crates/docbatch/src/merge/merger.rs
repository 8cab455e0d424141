use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;

use crate::error::{MergeError, MissingArtifact};
use crate::merge::render::{MergedRecord, ReportRenderer};
use crate::session::{validate, DocumentStatus, Session};
use crate::storage::filesystem;
use crate::worker::artifact;

pub const REPORT_STEM: &str = "report";
pub const MANIFEST_FILE: &str = "report.manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEntry {
    pub document_path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub document_path: PathBuf,
    pub reason: String,
}

/// What one batch contributed to the report. Rows are `[row_start, row_end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchContribution {
    pub batch_id: String,
    pub row_start: usize,
    pub row_end: usize,
    pub documents: Vec<PathBuf>,
    pub artifacts: Vec<PathBuf>,
    pub failed: Vec<FailedEntry>,
    pub skipped: Vec<SkippedEntry>,
}

/// Provenance of a merged report. Contains no timestamps so identical
/// artifacts give identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeManifest {
    pub session_id: String,
    pub report_file: String,
    pub total_rows: usize,
    pub batches: Vec<BatchContribution>,
}

#[derive(Debug, Clone)]
pub struct MergeReport {
    pub report_path: PathBuf,
    pub manifest_path: PathBuf,
    pub rows: usize,
    pub failed_documents: usize,
    pub skipped: Vec<MissingArtifact>,
}

pub struct ResultMerger {
    renderer: Box<dyn ReportRenderer>,
}

impl ResultMerger {
    pub fn new(renderer: Box<dyn ReportRenderer>) -> Self {
        Self { renderer }
    }

    /// Combines the artifacts of every completed document, in canonical
    /// batch and document order, into one report plus a manifest.
    ///
    /// An invalid record, or a completed document without a usable
    /// artifact, aborts the merge unless `force` is set. Forced merges skip
    /// and list such documents.
    pub fn merge(&self, session: &Session, force: bool) -> Result<MergeReport, MergeError> {
        if let Some(batch) = session.batches.iter().find(|b| !b.is_terminal()) {
            return Err(MergeError::BatchNotTerminal {
                batch_id: batch.batch_id.clone(),
                status: batch.status.as_str().to_string(),
            });
        }

        let validation = validate(session);
        if !validation.is_valid() {
            if !force {
                return Err(MergeError::InvalidRecord {
                    issues: validation.issues,
                });
            }
            warn!(
                "Merging {} despite {} validation issue(s)",
                session.session_id,
                validation.issues.len()
            );
        }

        let output_dir = &session.output_dir;
        let mut records = Vec::new();
        let mut contributions = Vec::with_capacity(session.batches.len());
        let mut missing = Vec::new();
        let mut failed_documents = 0;

        for batch in &session.batches {
            let mut contribution = BatchContribution {
                batch_id: batch.batch_id.clone(),
                row_start: records.len(),
                row_end: records.len(),
                documents: Vec::new(),
                artifacts: Vec::new(),
                failed: Vec::new(),
                skipped: Vec::new(),
            };

            for doc in &batch.documents {
                contribution.documents.push(doc.document_path.clone());
                match doc.status {
                    DocumentStatus::Completed => {
                        let path = artifact::artifact_path(output_dir, &batch.batch_id, &doc.document_path);
                        let loaded = if path.exists() {
                            artifact::load_artifact(&path, &batch.batch_id, &doc.document_path)
                        } else {
                            Err("artifact is missing".to_string())
                        };

                        match loaded {
                            Ok(record) => {
                                contribution.artifacts.push(relative_to(output_dir, &path));
                                records.push(MergedRecord {
                                    row: records.len(),
                                    batch_id: batch.batch_id.clone(),
                                    document_path: doc.document_path.clone(),
                                    result: record.result,
                                });
                            }
                            Err(reason) => {
                                contribution.skipped.push(SkippedEntry {
                                    document_path: doc.document_path.clone(),
                                    reason: reason.clone(),
                                });
                                missing.push(MissingArtifact {
                                    batch_id: batch.batch_id.clone(),
                                    document_path: doc.document_path.clone(),
                                    reason,
                                });
                            }
                        }
                    }
                    DocumentStatus::Failed => {
                        failed_documents += 1;
                        contribution.failed.push(FailedEntry {
                            document_path: doc.document_path.clone(),
                            error: doc.error.clone().unwrap_or_default(),
                        });
                    }
                    DocumentStatus::Pending | DocumentStatus::Running => {
                        contribution.skipped.push(SkippedEntry {
                            document_path: doc.document_path.clone(),
                            reason: "not processed".to_string(),
                        });
                    }
                }
            }

            contribution.row_end = records.len();
            contributions.push(contribution);
        }

        if !missing.is_empty() {
            if !force {
                return Err(MergeError::Inconsistent { missing });
            }
            warn!(
                "Merging {} without {} completed document(s) whose artifacts are unusable",
                session.session_id,
                missing.len()
            );
        }

        let report_file = format!("{}.{}", REPORT_STEM, self.renderer.extension());
        let report_path = output_dir.join(&report_file);
        let manifest_path = output_dir.join(MANIFEST_FILE);

        let report_bytes = self.renderer.render(&records).map_err(MergeError::Render)?;
        write(&report_path, &report_bytes)?;

        let manifest = MergeManifest {
            session_id: session.session_id.clone(),
            report_file,
            total_rows: records.len(),
            batches: contributions,
        };
        let mut manifest_bytes =
            serde_json::to_vec_pretty(&manifest).map_err(|e| MergeError::Render(e.to_string()))?;
        manifest_bytes.push(b'\n');
        write(&manifest_path, &manifest_bytes)?;

        info!(
            "Merged {} row(s) from {} batch(es) into {}",
            records.len(),
            session.batches.len(),
            report_path.display()
        );

        Ok(MergeReport {
            report_path,
            manifest_path,
            rows: records.len(),
            failed_documents,
            skipped: missing,
        })
    }
}

fn relative_to(base: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(base).unwrap_or(path).to_path_buf()
}

fn write(path: &Path, bytes: &[u8]) -> Result<(), MergeError> {
    filesystem::write_atomic(path, bytes).map_err(|e| MergeError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}
