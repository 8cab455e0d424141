use crate::session::{Session, SessionStatus};

/// Fixes what can be derived from document statuses: counts, batch and
/// session statuses, progress bounds and impossible timestamps. Returns a
/// description of each change. Duplicate documents and malformed ids are
/// left for validation to report.
pub fn repair(session: &mut Session) -> Vec<String> {
    let mut actions = Vec::new();

    for batch in &mut session.batches {
        if batch.progress > 100 {
            actions.push(format!(
                "clamped progress of batch '{}' from {} to 100",
                batch.batch_id, batch.progress
            ));
            batch.progress = 100;
        }

        if let (Some(start), Some(end)) = (batch.start_time, batch.end_time) {
            if end < start {
                actions.push(format!("cleared end_time of batch '{}'", batch.batch_id));
                batch.end_time = None;
            }
        }

        let before = batch.status;
        batch.refresh_status();
        if batch.status != before {
            actions.push(format!(
                "batch '{}' status {} -> {}",
                batch.batch_id,
                before.as_str(),
                batch.status.as_str()
            ));
        }
    }

    let (total, completed, failed) = (
        session.total_documents,
        session.completed_documents,
        session.failed_documents,
    );
    session.recompute_counts();
    if (total, completed, failed)
        != (
            session.total_documents,
            session.completed_documents,
            session.failed_documents,
        )
    {
        actions.push(format!(
            "recomputed document counts (total {} -> {}, completed {} -> {}, failed {} -> {})",
            total,
            session.total_documents,
            completed,
            session.completed_documents,
            failed,
            session.failed_documents
        ));
    }

    let before = session.status;
    if session.all_batches_terminal() && !session.batches.is_empty() {
        if session.status != SessionStatus::Failed {
            session.status = SessionStatus::Completed;
        }
    } else if session.status == SessionStatus::Completed {
        session.status = SessionStatus::Paused;
    }
    if session.status != before {
        actions.push(format!(
            "session status {} -> {}",
            before.as_str(),
            session.status.as_str()
        ));
    }

    if session.updated_at < session.created_at {
        session.updated_at = session.created_at;
        actions.push("reset updated_at to created_at".to_string());
    }

    actions
}
