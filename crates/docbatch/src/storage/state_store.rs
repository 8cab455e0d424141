//! Durable, atomically replaced session records under a state directory.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::StateError;
use crate::session::{is_valid_session_id, Session, SessionSummary, ValidationReport, SCHEMA_VERSION};
use crate::storage::backup::{BackupEntry, BackupPolicy, BackupSet, PruneReport};
use crate::storage::filesystem;

const BACKUP_DIR: &str = "backups";

#[derive(Debug, Clone)]
pub struct StateStore {
    state_dir: PathBuf,
    backups: BackupSet,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(state_dir: P, policy: BackupPolicy) -> Self {
        let state_dir = state_dir.as_ref().to_path_buf();
        let backups = BackupSet::new(state_dir.join(BACKUP_DIR), policy);
        Self { state_dir, backups }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn state_path(&self, session_id: &str) -> PathBuf {
        self.state_dir.join(format!("{}.json", session_id))
    }

    pub fn backup_dir(&self) -> &Path {
        self.backups.dir()
    }

    /// Persists the session, replacing any previous record atomically.
    pub fn save(&self, session: &Session) -> Result<PathBuf, StateError> {
        self.save_with(session, |_| Ok(()))
    }

    fn save_with<F>(&self, session: &Session, before_rename: F) -> Result<PathBuf, StateError>
    where
        F: FnOnce(&Path) -> std::io::Result<()>,
    {
        if !is_valid_session_id(&session.session_id) {
            return Err(StateError::InvalidSessionId(session.session_id.clone()));
        }

        filesystem::ensure_directory(&self.state_dir).map_err(|e| StateError::CreateDirectory {
            path: self.state_dir.clone(),
            source: e,
        })?;

        let content = serde_json::to_vec_pretty(session).map_err(|e| StateError::Serialize {
            session_id: session.session_id.clone(),
            source: e,
        })?;

        let path = self.state_path(&session.session_id);
        if let Err(e) = self.backups.snapshot(&session.session_id, &path) {
            warn!("Failed to back up state for {}: {}", session.session_id, e);
        }

        filesystem::write_atomic_with(&path, &content, before_rename).map_err(|e| {
            StateError::WriteFile {
                path: path.clone(),
                source: e,
            }
        })?;

        debug!(
            "Saved session {} ({} of {} documents done)",
            session.session_id,
            session.completed_documents + session.failed_documents,
            session.total_documents
        );
        Ok(path)
    }

    /// Loads a session record. `Ok(None)` when no record exists.
    pub fn load(&self, session_id: &str) -> Result<Option<Session>, StateError> {
        if !is_valid_session_id(session_id) {
            return Err(StateError::InvalidSessionId(session_id.to_string()));
        }

        let path = self.state_path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        read_path(&path).map(Some)
    }

    /// Every readable record, oldest first. Unreadable records are skipped.
    pub fn list(&self) -> Vec<SessionSummary> {
        let entries = match std::fs::read_dir(&self.state_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut summaries: Vec<SessionSummary> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_record_file(p))
            .filter_map(|p| match read_path(&p) {
                Ok(session) => Some(session.summary()),
                Err(e) => {
                    warn!("Skipping unreadable state record: {}", e);
                    None
                }
            })
            .collect();

        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        summaries
    }

    pub fn validate(&self, session: &Session) -> ValidationReport {
        crate::session::validate(session)
    }

    /// Deletes the record. Returns `false` when there was none.
    pub fn remove(&self, session_id: &str) -> Result<bool, StateError> {
        if !is_valid_session_id(session_id) {
            return Err(StateError::InvalidSessionId(session_id.to_string()));
        }
        let path = self.state_path(session_id);
        filesystem::remove_file_if_exists(&path).map_err(|e| StateError::Remove { path, source: e })
    }

    pub fn list_backups(&self, session_id: &str) -> Vec<BackupEntry> {
        self.backups.list(session_id)
    }

    pub fn prune_backups(&self, session_id: &str) -> PruneReport {
        self.backups.prune(session_id)
    }

    pub fn remove_backups(&self, session_id: &str) -> Result<usize, StateError> {
        self.backups
            .remove_all(session_id)
            .map_err(|e| StateError::Remove {
                path: self.backups.dir().to_path_buf(),
                source: e,
            })
    }
}

fn is_record_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
        && path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(is_valid_session_id)
            .unwrap_or(false)
}

/// Reads a session record from an explicit path, upgrading older schema
/// versions in memory.
pub fn read_path(path: &Path) -> Result<Session, StateError> {
    let content = std::fs::read_to_string(path).map_err(|e| StateError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| StateError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

    let version = value
        .get("schema_version")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| StateError::MissingVersion {
            path: path.to_path_buf(),
        })?;

    match version {
        v if v == u64::from(SCHEMA_VERSION) => {}
        1 => upgrade_v1(&mut value),
        found => {
            return Err(StateError::UnsupportedVersion {
                path: path.to_path_buf(),
                found,
                supported: SCHEMA_VERSION,
            })
        }
    }

    serde_json::from_value(value).map_err(|e| StateError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Version 1 records predate retry bookkeeping and per-document errors.
/// The missing fields take their serde defaults; only the version moves.
fn upgrade_v1(value: &mut serde_json::Value) {
    if let Some(object) = value.as_object_mut() {
        object.insert(
            "schema_version".to_string(),
            serde_json::Value::from(SCHEMA_VERSION),
        );
        object
            .entry("planning_issues")
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
    }
}
