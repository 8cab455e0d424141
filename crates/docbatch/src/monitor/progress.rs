use serde::Serialize;

use crate::session::{BatchStatus, DocumentStatus, Session, SessionStatus};

/// Point-in-time progress of a session, as rendered by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub total_documents: usize,
    pub completed_documents: usize,
    pub failed_documents: usize,
    pub batches_pending: usize,
    pub batches_running: usize,
    pub batches_completed: usize,
    pub batches_failed: usize,
    pub percent: u8,
}

impl ProgressSummary {
    pub fn from_session(session: &Session) -> Self {
        let count = |status: BatchStatus| session.batches.iter().filter(|b| b.status == status).count();

        let mut total = 0;
        let mut completed = 0;
        let mut failed = 0;
        for doc in session.batches.iter().flat_map(|b| b.documents.iter()) {
            total += 1;
            match doc.status {
                DocumentStatus::Completed => completed += 1,
                DocumentStatus::Failed => failed += 1,
                _ => {}
            }
        }

        let percent = if total == 0 {
            0
        } else {
            ((completed + failed) * 100 / total) as u8
        };

        Self {
            session_id: session.session_id.clone(),
            status: session.status,
            total_documents: total,
            completed_documents: completed,
            failed_documents: failed,
            batches_pending: count(BatchStatus::Pending),
            batches_running: count(BatchStatus::Running),
            batches_completed: count(BatchStatus::Completed),
            batches_failed: count(BatchStatus::Failed),
            percent,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

pub trait StatusRenderer: Send {
    fn render(&self, summary: &ProgressSummary) -> String;
}

/// `[id] status | docs 12/23 done, 1 failed | batches 2 running, 1 pending, 1 done | 56%`
pub struct PlainRenderer;

impl StatusRenderer for PlainRenderer {
    fn render(&self, s: &ProgressSummary) -> String {
        let mut line = format!(
            "[{}] {} | docs {}/{} done, {} failed | batches {} running, {} pending, {} done",
            s.session_id,
            s.status.as_str(),
            s.completed_documents,
            s.total_documents,
            s.failed_documents,
            s.batches_running,
            s.batches_pending,
            s.batches_completed
        );
        if s.batches_failed > 0 {
            line.push_str(&format!(", {} failed", s.batches_failed));
        }
        line.push_str(&format!(" | {}%", s.percent));
        line
    }
}

/// One JSON object per line, for piping into other tools.
pub struct JsonRenderer;

impl StatusRenderer for JsonRenderer {
    fn render(&self, summary: &ProgressSummary) -> String {
        serde_json::to_string(summary).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::session::{batch_id, Batch};
    use std::path::PathBuf;

    const ID: &str = "20260101_120000_abcdef01";

    #[test]
    fn test_plain_line_format() {
        let docs: Vec<PathBuf> = (0..23).map(|i| PathBuf::from(format!("/d/{}", i))).collect();
        let mut batches: Vec<Batch> = docs
            .chunks(6)
            .enumerate()
            .map(|(i, c)| Batch::new(batch_id(ID, i + 1), c.to_vec()))
            .collect();
        for doc in &mut batches[0].documents {
            doc.mark_completed(PathBuf::from("x"));
        }
        batches[0].refresh_status();
        for doc in batches[1].documents.iter_mut().take(5) {
            doc.mark_completed(PathBuf::from("x"));
        }
        batches[1].documents[5].mark_failed("bad".to_string());
        batches[1].refresh_status();
        batches[2].status = BatchStatus::Running;
        batches[2].documents[0].mark_completed(PathBuf::from("x"));
        batches[3].status = BatchStatus::Running;

        let mut session = Session::new(
            ID.to_string(),
            Config::default(),
            PathBuf::from("/t"),
            PathBuf::from("/o"),
            batches,
            vec![],
        );
        session.status = SessionStatus::Running;

        let line = PlainRenderer.render(&ProgressSummary::from_session(&session));
        assert_eq!(
            line,
            "[20260101_120000_abcdef01] running | docs 12/23 done, 1 failed | batches 2 running, 0 pending, 2 done | 56%"
        );
    }

    #[test]
    fn test_json_renderer() {
        let session = Session::new(
            ID.to_string(),
            Config::default(),
            PathBuf::from("/t"),
            PathBuf::from("/o"),
            vec![Batch::new(batch_id(ID, 1), vec![PathBuf::from("/d/a")])],
            vec![],
        );
        let line = JsonRenderer.render(&ProgressSummary::from_session(&session));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["status"], "initializing");
        assert_eq!(value["batches_pending"], 1);
    }
}
