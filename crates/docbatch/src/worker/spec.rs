use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ProcessingSettings;
use crate::error::WorkerError;
use crate::session::{Batch, Session};
use crate::storage::filesystem;

/// Everything a worker needs to process one batch. Workers receive nothing
/// else: no session state, no shared memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub session_id: String,
    pub batch_id: String,
    /// Documents still to process, in batch order.
    pub documents: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub stop_file: PathBuf,
    pub processing: ProcessingSettings,
}

impl WorkerSpec {
    pub fn for_batch(session: &Session, batch: &Batch) -> Self {
        Self {
            session_id: session.session_id.clone(),
            batch_id: batch.batch_id.clone(),
            documents: batch.unfinished_documents(),
            output_dir: session.output_dir.clone(),
            stop_file: session.stop_file(),
            processing: session.config_snapshot.processing.clone(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), WorkerError> {
        let content = serde_json::to_vec_pretty(self).map_err(|e| WorkerError::WriteSpec {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        filesystem::write_atomic(path, &content).map_err(|e| WorkerError::WriteSpec {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn read(path: &Path) -> Result<Self, WorkerError> {
        let content = std::fs::read_to_string(path).map_err(|e| WorkerError::ReadSpec {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| WorkerError::ReadSpec {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_file.exists()
    }
}

pub fn spec_path(temp_dir: &Path, batch_id: &str) -> PathBuf {
    temp_dir.join("workers").join(format!("{}.json", batch_id))
}

pub fn log_path(temp_dir: &Path, batch_id: &str) -> PathBuf {
    temp_dir.join("logs").join(format!("{}.log", batch_id))
}
