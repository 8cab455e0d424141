use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use log::{debug, warn};

use crate::config::BackupConfig;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupPolicy {
    pub enabled: bool,
    pub max_age_days: u32,
    pub max_count: usize,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self::from(&BackupConfig::default())
    }
}

impl From<&BackupConfig> for BackupPolicy {
    fn from(config: &BackupConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_age_days: config.max_age_days,
            max_count: config.max_count,
        }
    }
}

impl BackupPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub removed: Vec<PathBuf>,
    pub kept: usize,
}

/// Timestamped copies of state records under `{state_dir}/backups/`.
#[derive(Debug, Clone)]
pub struct BackupSet {
    dir: PathBuf,
    policy: BackupPolicy,
}

impl BackupSet {
    pub fn new(dir: PathBuf, policy: BackupPolicy) -> Self {
        Self { dir, policy }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn policy(&self) -> BackupPolicy {
        self.policy
    }

    /// Copies `current` aside before it is overwritten. No-op when disabled
    /// or when there is no current record yet.
    pub fn snapshot(&self, session_id: &str, current: &Path) -> std::io::Result<Option<PathBuf>> {
        if !self.policy.enabled || !current.exists() {
            return Ok(None);
        }
        super::filesystem::ensure_directory(&self.dir)?;

        let target = self.dir.join(format!(
            "{}_{}.json",
            session_id,
            Utc::now().format(TIMESTAMP_FORMAT)
        ));
        std::fs::copy(current, &target)?;
        debug!("Backed up {} to {}", session_id, target.display());
        Ok(Some(target))
    }

    /// Backups of one session, oldest first.
    pub fn list(&self, session_id: &str) -> Vec<BackupEntry> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let prefix = format!("{}_", session_id);
        let mut backups: Vec<BackupEntry> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_str()?.to_string();
                let stamp = name.strip_prefix(&prefix)?.strip_suffix(".json")?;
                let taken_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
                    .ok()?
                    .and_utc();
                Some(BackupEntry {
                    path: e.path(),
                    taken_at,
                })
            })
            .collect();

        backups.sort_by(|a, b| a.taken_at.cmp(&b.taken_at).then_with(|| a.path.cmp(&b.path)));
        backups
    }

    pub fn prune(&self, session_id: &str) -> PruneReport {
        self.prune_at(session_id, Utc::now())
    }

    /// Deletes backups older than `max_age_days` and all but the newest
    /// `max_count`.
    pub fn prune_at(&self, session_id: &str, now: DateTime<Utc>) -> PruneReport {
        let backups = self.list(session_id);
        let cutoff = now - Duration::days(i64::from(self.policy.max_age_days));
        let keep_from = backups.len().saturating_sub(self.policy.max_count);

        let mut report = PruneReport::default();
        for (index, entry) in backups.into_iter().enumerate() {
            if index < keep_from || entry.taken_at < cutoff {
                match std::fs::remove_file(&entry.path) {
                    Ok(()) => report.removed.push(entry.path),
                    Err(e) => {
                        warn!("Failed to remove backup {}: {}", entry.path.display(), e);
                        report.kept += 1;
                    }
                }
            } else {
                report.kept += 1;
            }
        }
        report
    }

    /// Deletes every backup of a session. Returns the number removed.
    pub fn remove_all(&self, session_id: &str) -> std::io::Result<usize> {
        let mut removed = 0;
        for entry in self.list(session_id) {
            if super::filesystem::remove_file_if_exists(&entry.path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
