use std::path::PathBuf;

use log::{info, warn};
use serde::Serialize;

use crate::error::{DocbatchError, ResumeError};
use crate::resume::repair::repair;
use crate::session::{validate, DocumentStatus, Session, SessionStatus};
use crate::storage::StateStore;
use crate::worker::artifact::{self, ArtifactState};

/// A document whose recorded status disagreed with the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reclassification {
    pub batch_id: String,
    pub document_path: PathBuf,
    pub from: DocumentStatus,
    pub to: DocumentStatus,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumePreview {
    pub session_id: String,
    pub recorded_status: SessionStatus,
    pub total_documents: usize,
    pub completed_documents: usize,
    pub failed_documents: usize,
    pub remaining_documents: usize,
    pub incomplete_batches: Vec<String>,
    pub reclassified: Vec<Reclassification>,
    /// Corrections applied to an inconsistent record.
    pub repairs: Vec<String>,
    /// Validation issues that repair could not fix. Non-empty blocks resume.
    pub issues: Vec<String>,
    /// Artifacts that exist but could not be trusted.
    pub warnings: Vec<String>,
    pub resumable: bool,
}

#[derive(Debug, Clone)]
pub struct ResumePlan {
    pub session: Session,
    pub preview: ResumePreview,
}

impl ResumePlan {
    pub fn has_work(&self) -> bool {
        !self.preview.incomplete_batches.is_empty()
    }
}

pub struct ResumeCoordinator<'a> {
    store: &'a StateStore,
}

impl<'a> ResumeCoordinator<'a> {
    pub fn new(store: &'a StateStore) -> Self {
        Self { store }
    }

    /// What a resume would do, without saving anything.
    pub fn preview(&self, session_id: &str) -> Result<ResumePreview, DocbatchError> {
        let session = self.load(session_id)?;
        let (_, preview) = analyze(session);
        Ok(preview)
    }

    /// Brings the recorded session in line with the output directory and
    /// returns it ready for the supervisor. Refuses, and marks the record
    /// failed, when the record stays inconsistent after repair and `force` is
    /// not set. Records are never discarded.
    pub fn prepare(&self, session_id: &str, force: bool) -> Result<ResumePlan, DocbatchError> {
        let recorded = self.load(session_id)?;
        let (mut session, preview) = analyze(recorded.clone());

        if !preview.resumable {
            if !force {
                let mut failed = recorded;
                failed.status = SessionStatus::Failed;
                failed.touch();
                self.store.save(&failed)?;
                warn!(
                    "Refusing to resume {}: {} unresolved issue(s)",
                    session_id,
                    preview.issues.len()
                );
                return Err(ResumeError::Refused {
                    session_id: session_id.to_string(),
                    issues: preview.issues,
                }
                .into());
            }
            warn!(
                "Resuming {} despite {} unresolved issue(s)",
                session_id,
                preview.issues.len()
            );
        }

        session.touch();
        self.store.save(&session)?;

        info!(
            "Prepared resume of {}: {} document(s) remaining in {} batch(es), {} reclassified",
            session_id,
            preview.remaining_documents,
            preview.incomplete_batches.len(),
            preview.reclassified.len()
        );
        Ok(ResumePlan { session, preview })
    }

    fn load(&self, session_id: &str) -> Result<Session, DocbatchError> {
        self.store
            .load(session_id)?
            .ok_or_else(|| ResumeError::NotFound(session_id.to_string()).into())
    }
}

/// Validate, repair, detect completed work, classify. Pure apart from
/// reading artifacts.
pub fn analyze(mut session: Session) -> (Session, ResumePreview) {
    let recorded_status = session.status;

    let mut repairs = Vec::new();
    let mut report = validate(&session);
    if !report.is_valid() {
        repairs = repair(&mut session);
        report = validate(&session);
    }

    let (reclassified, warnings) = detect_completed_work(&mut session);
    let incomplete_batches = classify(&mut session);

    session.recompute_counts();
    session.status = if incomplete_batches.is_empty() && !session.batches.is_empty() {
        SessionStatus::Completed
    } else {
        SessionStatus::Paused
    };

    let preview = ResumePreview {
        session_id: session.session_id.clone(),
        recorded_status,
        total_documents: session.total_documents,
        completed_documents: session.completed_documents,
        failed_documents: session.failed_documents,
        remaining_documents: session.remaining_documents(),
        incomplete_batches,
        reclassified,
        repairs,
        resumable: report.is_valid(),
        issues: report.issues,
        warnings,
    };
    (session, preview)
}

/// Corrects document statuses from artifacts. No processor is involved.
fn detect_completed_work(session: &mut Session) -> (Vec<Reclassification>, Vec<String>) {
    let output_dir = session.output_dir.clone();
    let mut reclassified = Vec::new();
    let mut warnings = Vec::new();

    for batch in &mut session.batches {
        let batch_id = batch.batch_id.clone();
        for doc in &mut batch.documents {
            let from = doc.status;
            let state = artifact::inspect(&output_dir, &batch_id, &doc.document_path);

            let reason = match (from, state) {
                (DocumentStatus::Completed, ArtifactState::Completed(path)) => {
                    doc.result_file = Some(path);
                    None
                }
                (DocumentStatus::Completed, ArtifactState::Malformed(reason)) => {
                    warnings.push(format!("{}: {}", doc.document_path.display(), reason));
                    doc.mark_pending();
                    Some(format!("recorded completed but artifact is malformed: {}", reason))
                }
                (DocumentStatus::Completed, _) => {
                    doc.mark_pending();
                    Some("recorded completed but artifact is missing".to_string())
                }
                (_, ArtifactState::Completed(path)) => {
                    doc.mark_completed(path);
                    Some("valid artifact found".to_string())
                }
                (DocumentStatus::Failed, ArtifactState::Failed(_)) => None,
                (_, ArtifactState::Failed(error)) => {
                    doc.mark_failed(error);
                    Some("failure marker found".to_string())
                }
                (_, ArtifactState::Malformed(reason)) => {
                    warnings.push(format!("{}: {}", doc.document_path.display(), reason));
                    None
                }
                (_, ArtifactState::Missing) => None,
            };

            if let Some(reason) = reason {
                reclassified.push(Reclassification {
                    batch_id: batch_id.clone(),
                    document_path: doc.document_path.clone(),
                    from,
                    to: doc.status,
                    reason,
                });
            }
        }
    }

    (reclassified, warnings)
}

/// Leaves fully terminal batches alone and returns every other batch to
/// pending. Returns the ids of the batches that still have work.
fn classify(session: &mut Session) -> Vec<String> {
    let mut incomplete = Vec::new();
    for batch in &mut session.batches {
        if batch.all_documents_terminal() {
            batch.refresh_status();
        } else {
            batch.reset_for_rerun();
            batch.update_progress();
            incomplete.push(batch.batch_id.clone());
        }
    }
    incomplete
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::session::{batch_id, Batch, BatchStatus};
    use crate::storage::BackupPolicy;
    use tempfile::TempDir;

    const ID: &str = "20260101_120000_abcdef01";

    fn setup(temp_dir: &TempDir) -> (StateStore, Session) {
        let store = StateStore::new(temp_dir.path().join("state"), BackupPolicy::disabled());
        let session = Session::new(
            ID.to_string(),
            Config::default(),
            temp_dir.path().join("tmp"),
            temp_dir.path().join("out"),
            vec![
                Batch::new(batch_id(ID, 1), vec![PathBuf::from("/d/a"), PathBuf::from("/d/b")]),
                Batch::new(batch_id(ID, 2), vec![PathBuf::from("/d/c")]),
            ],
            vec![],
        );
        store.save(&session).unwrap();
        (store, session)
    }

    #[test]
    fn test_missing_session() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::new(temp_dir.path(), BackupPolicy::disabled());
        let result = ResumeCoordinator::new(&store).prepare(ID, false);
        assert!(matches!(result, Err(DocbatchError::Resume(ResumeError::NotFound(_)))));
    }

    #[test]
    fn test_detects_artifacts_written_after_last_save() {
        let temp_dir = TempDir::new().unwrap();
        let (store, mut session) = setup(&temp_dir);
        session.batches[0].status = BatchStatus::Running;
        session.batches[0].start_time = Some(chrono::Utc::now());
        for doc in &mut session.batches[0].documents {
            doc.status = DocumentStatus::Running;
        }
        store.save(&session).unwrap();
        artifact::write_result(
            &session.output_dir,
            ID,
            &batch_id(ID, 1),
            &PathBuf::from("/d/a"),
            serde_json::json!({"ok": 1}),
        )
        .unwrap();

        let plan = ResumeCoordinator::new(&store).prepare(ID, false).unwrap();

        let batch = &plan.session.batches[0];
        assert_eq!(batch.status, BatchStatus::Pending);
        assert!(batch.start_time.is_none());
        assert_eq!(batch.documents[0].status, DocumentStatus::Completed);
        assert_eq!(batch.documents[1].status, DocumentStatus::Pending);
        assert_eq!(plan.preview.reclassified.len(), 1);
        assert_eq!(plan.preview.remaining_documents, 2);
        assert_eq!(plan.session.status, SessionStatus::Paused);

        let saved = store.load(ID).unwrap().unwrap();
        assert_eq!(saved.completed_documents, 1);
    }

    #[test]
    fn test_demotes_completed_document_without_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let (store, mut session) = setup(&temp_dir);
        session.batches[1].documents[0].mark_completed(PathBuf::from("/gone.json"));
        session.refresh();
        store.save(&session).unwrap();

        let preview = ResumeCoordinator::new(&store).preview(ID).unwrap();

        assert!(preview.resumable);
        assert_eq!(preview.reclassified.len(), 1);
        assert_eq!(preview.reclassified[0].to, DocumentStatus::Pending);
        assert!(preview.incomplete_batches.contains(&batch_id(ID, 2)));
    }

    #[test]
    fn test_preview_does_not_save() {
        let temp_dir = TempDir::new().unwrap();
        let (store, session) = setup(&temp_dir);
        let before = std::fs::read(store.state_path(ID)).unwrap();

        let preview = ResumeCoordinator::new(&store).preview(ID).unwrap();

        assert_eq!(preview.remaining_documents, session.total_documents);
        assert_eq!(std::fs::read(store.state_path(ID)).unwrap(), before);
    }

    #[test]
    fn test_refuses_unrepairable_record_and_marks_failed() {
        let temp_dir = TempDir::new().unwrap();
        let (store, mut session) = setup(&temp_dir);
        session.batches[1].documents[0].document_path = PathBuf::from("/d/a");
        store.save(&session).unwrap();

        let result = ResumeCoordinator::new(&store).prepare(ID, false);
        match result {
            Err(DocbatchError::Resume(ResumeError::Refused { issues, .. })) => {
                assert!(issues.iter().any(|i| i.contains("claimed more than once")));
            }
            other => panic!("Expected refusal, got {:?}", other.map(|p| p.preview)),
        }
        let saved = store.load(ID).unwrap().unwrap();
        assert_eq!(saved.status, SessionStatus::Failed);
        assert_eq!(saved.batches.len(), 2);

        let plan = ResumeCoordinator::new(&store).prepare(ID, true).unwrap();
        assert_eq!(plan.session.status, SessionStatus::Paused);
    }

    #[test]
    fn test_repairable_record_resumes_without_force() {
        let temp_dir = TempDir::new().unwrap();
        let (store, mut session) = setup(&temp_dir);
        session.completed_documents = 3;
        store.save(&session).unwrap();

        let plan = ResumeCoordinator::new(&store).prepare(ID, false).unwrap();
        assert!(!plan.preview.repairs.is_empty());
        assert!(plan.preview.issues.is_empty());
        assert_eq!(plan.session.completed_documents, 0);
    }

    #[test]
    fn test_fully_done_session_has_no_work() {
        let temp_dir = TempDir::new().unwrap();
        let (store, mut session) = setup(&temp_dir);
        for batch in &mut session.batches {
            let bid = batch.batch_id.clone();
            for doc in &mut batch.documents {
                let path = artifact::write_result(
                    &session.output_dir,
                    ID,
                    &bid,
                    &doc.document_path,
                    serde_json::json!(true),
                )
                .unwrap();
                doc.mark_completed(path);
            }
        }
        session.refresh();
        store.save(&session).unwrap();

        let plan = ResumeCoordinator::new(&store).prepare(ID, false).unwrap();
        assert!(!plan.has_work());
        assert_eq!(plan.session.status, SessionStatus::Completed);
        assert!(plan.preview.reclassified.is_empty());
    }
}
