//! Per-document result artifacts and failure markers.
//!
//! Layout: `{output_dir}/batches/{batch_id}/{stem}-{hash}.json` for a result,
//! `{stem}-{hash}.failed.json` next to it for a failure. The hash is derived
//! from the document path, so names are stable across runs and processes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WorkerError;
use crate::sanitize;
use crate::storage::filesystem;

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub format_version: u32,
    pub session_id: String,
    pub batch_id: String,
    pub document_path: PathBuf,
    pub completed_at: DateTime<Utc>,
    pub result: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub format_version: u32,
    pub session_id: String,
    pub batch_id: String,
    pub document_path: PathBuf,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// What the output directory says about one document.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactState {
    Completed(PathBuf),
    Failed(String),
    Missing,
    Malformed(String),
}

pub fn batch_dir(output_dir: &Path, batch_id: &str) -> PathBuf {
    output_dir.join("batches").join(batch_id)
}

fn base_name(document: &Path) -> String {
    format!(
        "{}-{}",
        sanitize::safe_stem(document),
        sanitize::hash_path(document)
    )
}

pub fn artifact_path(output_dir: &Path, batch_id: &str, document: &Path) -> PathBuf {
    batch_dir(output_dir, batch_id).join(format!("{}.json", base_name(document)))
}

pub fn failure_path(output_dir: &Path, batch_id: &str, document: &Path) -> PathBuf {
    batch_dir(output_dir, batch_id).join(format!("{}.failed.json", base_name(document)))
}

/// Writes the result artifact and clears any failure marker left by an
/// earlier attempt.
pub fn write_result(
    output_dir: &Path,
    session_id: &str,
    batch_id: &str,
    document: &Path,
    result: serde_json::Value,
) -> Result<PathBuf, WorkerError> {
    let record = ArtifactRecord {
        format_version: ARTIFACT_FORMAT_VERSION,
        session_id: session_id.to_string(),
        batch_id: batch_id.to_string(),
        document_path: document.to_path_buf(),
        completed_at: Utc::now(),
        result,
    };
    let path = artifact_path(output_dir, batch_id, document);
    write_json(&path, &record)?;

    let marker = failure_path(output_dir, batch_id, document);
    filesystem::remove_file_if_exists(&marker)
        .map_err(|e| WorkerError::WriteArtifact { path: marker, source: e })?;
    Ok(path)
}

pub fn write_failure(
    output_dir: &Path,
    session_id: &str,
    batch_id: &str,
    document: &Path,
    error: &str,
) -> Result<PathBuf, WorkerError> {
    let record = FailureRecord {
        format_version: ARTIFACT_FORMAT_VERSION,
        session_id: session_id.to_string(),
        batch_id: batch_id.to_string(),
        document_path: document.to_path_buf(),
        error: error.to_string(),
        failed_at: Utc::now(),
    };
    let path = failure_path(output_dir, batch_id, document);
    write_json(&path, &record)?;
    Ok(path)
}

fn write_json<T: Serialize>(path: &Path, record: &T) -> Result<(), WorkerError> {
    let content = serde_json::to_vec_pretty(record).map_err(|e| WorkerError::WriteArtifact {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;
    filesystem::write_atomic(path, &content).map_err(|e| WorkerError::WriteArtifact {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Reads and checks a result artifact. The error is a human-readable reason.
pub fn load_artifact(path: &Path, batch_id: &str, document: &Path) -> Result<ArtifactRecord, String> {
    let content = std::fs::read(path).map_err(|e| format!("unreadable: {}", e))?;
    let record: ArtifactRecord =
        serde_json::from_slice(&content).map_err(|e| format!("unparseable: {}", e))?;

    if record.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(format!("unsupported format_version {}", record.format_version));
    }
    if record.document_path != document {
        return Err(format!(
            "records '{}' instead of this document",
            record.document_path.display()
        ));
    }
    if record.batch_id != batch_id {
        return Err(format!("belongs to batch '{}'", record.batch_id));
    }
    if record.result.is_null() {
        return Err("result is null".to_string());
    }
    Ok(record)
}

fn load_failure(path: &Path, batch_id: &str, document: &Path) -> Result<FailureRecord, String> {
    let content = std::fs::read(path).map_err(|e| format!("unreadable: {}", e))?;
    let record: FailureRecord =
        serde_json::from_slice(&content).map_err(|e| format!("unparseable failure marker: {}", e))?;

    if record.document_path != document || record.batch_id != batch_id {
        return Err("failure marker belongs to another document".to_string());
    }
    Ok(record)
}

/// Classifies a document by what is on disk. Only a structurally valid
/// artifact counts as completed.
pub fn inspect(output_dir: &Path, batch_id: &str, document: &Path) -> ArtifactState {
    let path = artifact_path(output_dir, batch_id, document);
    if path.exists() {
        return match load_artifact(&path, batch_id, document) {
            Ok(_) => ArtifactState::Completed(path),
            Err(reason) => ArtifactState::Malformed(reason),
        };
    }

    let marker = failure_path(output_dir, batch_id, document);
    if marker.exists() {
        return match load_failure(&marker, batch_id, document) {
            Ok(record) => ArtifactState::Failed(record.error),
            Err(reason) => ArtifactState::Malformed(reason),
        };
    }

    ArtifactState::Missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const SESSION: &str = "20260101_120000_abcdef01";
    const BATCH: &str = "20260101_120000_abcdef01-1";

    #[test]
    fn test_artifact_name_is_stable_and_readable() {
        let out = Path::new("/out");
        let doc = Path::new("/papers/Smith 2020.pdf");
        let a = artifact_path(out, BATCH, doc);
        let b = artifact_path(out, BATCH, doc);
        assert_eq!(a, b);

        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("Smith_2020-"));
        assert!(name.ends_with(".json"));
        assert!(a.starts_with("/out/batches"));
    }

    #[test]
    fn test_same_stem_different_directories_do_not_collide() {
        let out = Path::new("/out");
        assert_ne!(
            artifact_path(out, BATCH, Path::new("/a/report.pdf")),
            artifact_path(out, BATCH, Path::new("/b/report.pdf"))
        );
    }

    #[test]
    fn test_write_then_inspect_completed() {
        let temp_dir = TempDir::new().unwrap();
        let doc = Path::new("/papers/a.pdf");

        let path = write_result(temp_dir.path(), SESSION, BATCH, doc, json!({"include": true})).unwrap();

        assert_eq!(inspect(temp_dir.path(), BATCH, doc), ArtifactState::Completed(path.clone()));
        let record = load_artifact(&path, BATCH, doc).unwrap();
        assert_eq!(record.result["include"], true);
    }

    #[test]
    fn test_failure_marker_then_success_clears_it() {
        let temp_dir = TempDir::new().unwrap();
        let doc = Path::new("/papers/a.pdf");

        write_failure(temp_dir.path(), SESSION, BATCH, doc, "timeout").unwrap();
        assert_eq!(
            inspect(temp_dir.path(), BATCH, doc),
            ArtifactState::Failed("timeout".to_string())
        );

        write_result(temp_dir.path(), SESSION, BATCH, doc, json!({})).unwrap();
        assert!(!failure_path(temp_dir.path(), BATCH, doc).exists());
        assert!(matches!(inspect(temp_dir.path(), BATCH, doc), ArtifactState::Completed(_)));
    }

    #[test]
    fn test_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(
            inspect(temp_dir.path(), BATCH, Path::new("/papers/a.pdf")),
            ArtifactState::Missing
        );
    }

    #[test]
    fn test_truncated_artifact_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let doc = Path::new("/papers/a.pdf");
        let path = artifact_path(temp_dir.path(), BATCH, doc);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{\"format_version\": 1, \"sess").unwrap();

        assert!(matches!(inspect(temp_dir.path(), BATCH, doc), ArtifactState::Malformed(_)));
    }

    #[test]
    fn test_null_result_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let doc = Path::new("/papers/a.pdf");
        write_result(temp_dir.path(), SESSION, BATCH, doc, serde_json::Value::Null).unwrap();

        match inspect(temp_dir.path(), BATCH, doc) {
            ArtifactState::Malformed(reason) => assert!(reason.contains("null")),
            other => panic!("Expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_artifact_for_other_document_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let doc = Path::new("/papers/a.pdf");
        let written = write_result(temp_dir.path(), SESSION, BATCH, Path::new("/other/x.pdf"), json!(1)).unwrap();
        let expected = artifact_path(temp_dir.path(), BATCH, doc);
        std::fs::rename(written, &expected).unwrap();

        assert!(matches!(inspect(temp_dir.path(), BATCH, doc), ArtifactState::Malformed(_)));
    }
}
