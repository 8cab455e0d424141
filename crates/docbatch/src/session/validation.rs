//! Invariant checks over a session record. Reports, never repairs.

use std::collections::HashSet;

use super::model::{batch_id, is_valid_session_id, BatchStatus, DocumentStatus, Session, SessionStatus, SCHEMA_VERSION};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    fn push(&mut self, issue: String) {
        self.issues.push(issue);
    }
}

pub fn validate(session: &Session) -> ValidationReport {
    let mut report = ValidationReport::default();

    if session.schema_version != SCHEMA_VERSION {
        report.push(format!(
            "schema_version is {}, expected {}",
            session.schema_version, SCHEMA_VERSION
        ));
    }

    if !is_valid_session_id(&session.session_id) {
        report.push(format!("session_id '{}' is malformed", session.session_id));
    }

    if session.updated_at < session.created_at {
        report.push("updated_at is earlier than created_at".to_string());
    }

    let mut total = 0;
    let mut completed = 0;
    let mut failed = 0;
    let mut seen_paths = HashSet::new();
    let mut seen_batches = HashSet::new();

    for (index, batch) in session.batches.iter().enumerate() {
        if !seen_batches.insert(batch.batch_id.as_str()) {
            report.push(format!("batch id '{}' appears more than once", batch.batch_id));
        }

        let expected_id = batch_id(&session.session_id, index + 1);
        if batch.batch_id != expected_id {
            report.push(format!(
                "batch at position {} has id '{}', expected '{}'",
                index + 1,
                batch.batch_id,
                expected_id
            ));
        }

        if batch.documents.is_empty() {
            report.push(format!("batch '{}' has no documents", batch.batch_id));
        }

        let all_terminal = batch.all_documents_terminal();
        if batch.status == BatchStatus::Completed && !all_terminal {
            report.push(format!(
                "batch '{}' is completed but {} document(s) are not terminal",
                batch.batch_id,
                batch.documents.len() - batch.terminal_documents()
            ));
        }
        if all_terminal && !batch.documents.is_empty() && batch.status != BatchStatus::Completed {
            report.push(format!(
                "batch '{}' is {} although every document is terminal",
                batch.batch_id,
                batch.status.as_str()
            ));
        }

        if batch.progress > 100 {
            report.push(format!(
                "batch '{}' progress {} is outside 0-100",
                batch.batch_id, batch.progress
            ));
        }

        if let (Some(start), Some(end)) = (batch.start_time, batch.end_time) {
            if end < start {
                report.push(format!("batch '{}' ends before it starts", batch.batch_id));
            }
        }

        for doc in &batch.documents {
            total += 1;
            match doc.status {
                DocumentStatus::Completed => completed += 1,
                DocumentStatus::Failed => failed += 1,
                _ => {}
            }
            if !seen_paths.insert(doc.document_path.as_path()) {
                report.push(format!(
                    "document '{}' is claimed more than once",
                    doc.document_path.display()
                ));
            }
        }
    }

    if session.total_documents != total {
        report.push(format!(
            "total_documents is {}, documents in batches: {}",
            session.total_documents, total
        ));
    }
    if session.completed_documents != completed {
        report.push(format!(
            "completed_documents is {}, completed documents: {}",
            session.completed_documents, completed
        ));
    }
    if session.failed_documents != failed {
        report.push(format!(
            "failed_documents is {}, failed documents: {}",
            session.failed_documents, failed
        ));
    }
    if session.completed_documents + session.failed_documents > session.total_documents {
        report.push(format!(
            "completed ({}) + failed ({}) exceeds total ({})",
            session.completed_documents, session.failed_documents, session.total_documents
        ));
    }

    let all_batches_terminal = session.all_batches_terminal();
    if session.status == SessionStatus::Completed && !all_batches_terminal {
        report.push("session is completed but some batches are not terminal".to_string());
    }
    if all_batches_terminal
        && !session.batches.is_empty()
        && session.status != SessionStatus::Completed
        && session.status != SessionStatus::Failed
    {
        report.push(format!(
            "every batch is terminal but the session is {}",
            session.status.as_str()
        ));
    }

    report
}
