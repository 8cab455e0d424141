use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::PlanningError;

/// Expands input paths into an ordered document list.
///
/// Files given explicitly are kept as-is (the planner decides whether they
/// are usable). Directories are walked recursively in name order and filtered
/// by extension and exclude patterns.
pub struct DocumentScanner {
    extensions: Vec<String>,
    exclude: Vec<glob::Pattern>,
    skip_dirs: Vec<PathBuf>,
}

impl DocumentScanner {
    pub fn new(extensions: &[String], exclude: &[String]) -> Result<Self, PlanningError> {
        let exclude = exclude
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|e| PlanningError::InvalidPattern {
                    pattern: pattern.clone(),
                    source: e,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            exclude,
            skip_dirs: Vec::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, PlanningError> {
        Self::new(&config.extensions, &config.exclude)
    }

    /// Never descends into `dir` (output and state directories).
    pub fn skip_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        let dir = dir.as_ref();
        self.skip_dirs
            .push(std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf()));
        self
    }

    pub fn scan(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>, PlanningError> {
        let mut documents = Vec::new();

        for input in inputs {
            if input.is_dir() {
                self.scan_directory(input, &mut documents)?;
            } else {
                documents.push(input.clone());
            }
        }

        info!("Scanned {} documents from {} input(s)", documents.len(), inputs.len());
        Ok(documents)
    }

    fn scan_directory(&self, root: &Path, documents: &mut Vec<PathBuf>) -> Result<(), PlanningError> {
        let walker = WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && self.is_skipped(e.path())));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(PlanningError::ScanFailed {
                        path: root.to_path_buf(),
                        source: e,
                    })
                }
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !self.has_supported_extension(path) {
                continue;
            }
            if self.is_excluded(root, path) {
                debug!("Excluded by pattern: {}", path.display());
                continue;
            }

            documents.push(path.to_path_buf());
        }

        Ok(())
    }

    fn has_supported_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    fn is_excluded(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let name = path.file_name().map(Path::new).unwrap_or(relative);
        self.exclude
            .iter()
            .any(|p| p.matches_path(relative) || p.matches_path(name))
    }

    fn is_skipped(&self, dir: &Path) -> bool {
        if self.skip_dirs.is_empty() {
            return false;
        }
        let resolved = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        self.skip_dirs.iter().any(|skip| resolved.starts_with(skip))
    }
}
