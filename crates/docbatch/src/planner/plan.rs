//! Partitioning of a validated document list into worker batches.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::PlanningError;
use crate::session::{batch_id, Batch};

/// A document the planner refused to schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanIssue {
    pub path: PathBuf,
    pub reason: String,
}

impl std::fmt::Display for PlanIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub batches: Vec<Batch>,
    pub issues: Vec<PlanIssue>,
    pub batch_size: usize,
}

impl Plan {
    pub fn document_count(&self) -> usize {
        self.batches.iter().map(|b| b.documents.len()).sum()
    }
}

/// `clamp(ceil(total / worker_count), 1, max_per_batch)`.
pub fn batch_size(total: usize, worker_count: usize, max_per_batch: usize) -> usize {
    let workers = worker_count.max(1);
    let per_worker = total.div_ceil(workers);
    per_worker.clamp(1, max_per_batch.max(1))
}

/// Validates `documents` and slices the survivors, in input order, into
/// contiguous batches. The same input always yields the same partition.
pub fn plan(
    session_id: &str,
    documents: &[PathBuf],
    worker_count: usize,
    max_per_batch: usize,
) -> Result<Plan, PlanningError> {
    if worker_count == 0 {
        return Err(PlanningError::InvalidWorkerCount);
    }
    if max_per_batch == 0 {
        return Err(PlanningError::InvalidBatchSize);
    }

    let mut accepted = Vec::with_capacity(documents.len());
    let mut issues = Vec::new();
    let mut seen = HashSet::new();

    for path in documents {
        let resolved = match check_document(path) {
            Ok(resolved) => resolved,
            Err(reason) => {
                warn!("Excluding {}: {}", path.display(), reason);
                issues.push(PlanIssue {
                    path: path.clone(),
                    reason,
                });
                continue;
            }
        };

        if !seen.insert(resolved.clone()) {
            let reason = "listed more than once".to_string();
            warn!("Excluding {}: {}", path.display(), reason);
            issues.push(PlanIssue {
                path: path.clone(),
                reason,
            });
            continue;
        }

        accepted.push(resolved);
    }

    if accepted.is_empty() {
        return Err(PlanningError::NoDocuments {
            excluded: issues.len(),
        });
    }

    let size = batch_size(accepted.len(), worker_count, max_per_batch);
    let batches: Vec<Batch> = accepted
        .chunks(size)
        .enumerate()
        .map(|(index, chunk)| Batch::new(batch_id(session_id, index + 1), chunk.to_vec()))
        .collect();

    info!(
        "Planned {} documents into {} batches of up to {} ({} excluded)",
        accepted.len(),
        batches.len(),
        size,
        issues.len()
    );

    Ok(Plan {
        batches,
        issues,
        batch_size: size,
    })
}

/// Returns the canonical path of a readable regular file, or why it is not one.
fn check_document(path: &Path) -> Result<PathBuf, String> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => "does not exist".to_string(),
        _ => format!("cannot be inspected: {}", e),
    })?;

    if !metadata.is_file() {
        return Err("is not a regular file".to_string());
    }

    File::open(path).map_err(|e| format!("is not readable: {}", e))?;

    std::fs::canonicalize(path).map_err(|e| format!("cannot be resolved: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ID: &str = "20260101_120000_abcdef01";

    fn make_documents(dir: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("doc{:02}.txt", i));
                std::fs::write(&path, format!("document {}", i)).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_batch_size_formula() {
        assert_eq!(batch_size(23, 4, 10), 6);
        assert_eq!(batch_size(100, 4, 10), 10);
        assert_eq!(batch_size(3, 8, 10), 1);
        assert_eq!(batch_size(0, 4, 10), 1);
        assert_eq!(batch_size(10, 1, 10), 10);
    }

    #[test]
    fn test_plan_partitions_in_input_order() {
        let temp_dir = TempDir::new().unwrap();
        let docs = make_documents(temp_dir.path(), 23);

        let plan = plan(ID, &docs, 4, 10).unwrap();

        let sizes: Vec<usize> = plan.batches.iter().map(|b| b.documents.len()).collect();
        assert_eq!(sizes, vec![6, 6, 6, 5]);
        assert_eq!(plan.batches[0].batch_id, format!("{}-1", ID));
        assert_eq!(plan.batches[3].batch_id, format!("{}-4", ID));

        let flattened: Vec<PathBuf> = plan
            .batches
            .iter()
            .flat_map(|b| b.documents.iter().map(|d| d.document_path.clone()))
            .collect();
        let expected: Vec<PathBuf> = docs.iter().map(|p| std::fs::canonicalize(p).unwrap()).collect();
        assert_eq!(flattened, expected);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let temp_dir = TempDir::new().unwrap();
        let docs = make_documents(temp_dir.path(), 17);

        let a = plan(ID, &docs, 3, 4).unwrap();
        let b = plan(ID, &docs, 3, 4).unwrap();
        assert_eq!(a.batches, b.batches);
    }

    #[test]
    fn test_plan_excludes_missing_and_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let mut docs = make_documents(temp_dir.path(), 3);
        docs.push(temp_dir.path().join("missing.pdf"));
        docs.push(docs[0].clone());
        docs.push(temp_dir.path().to_path_buf());

        let plan = plan(ID, &docs, 2, 10).unwrap();

        assert_eq!(plan.document_count(), 3);
        assert_eq!(plan.issues.len(), 3);
        assert!(plan.issues[0].reason.contains("does not exist"));
        assert!(plan.issues[1].reason.contains("more than once"));
        assert!(plan.issues[2].reason.contains("not a regular file"));
    }

    #[test]
    fn test_plan_rejects_empty_result() {
        let temp_dir = TempDir::new().unwrap();
        let result = plan(ID, &[temp_dir.path().join("nope.pdf")], 2, 10);
        assert!(matches!(result, Err(PlanningError::NoDocuments { excluded: 1 })));
    }

    #[test]
    fn test_plan_rejects_invalid_parameters() {
        assert!(matches!(plan(ID, &[], 0, 10), Err(PlanningError::InvalidWorkerCount)));
        assert!(matches!(plan(ID, &[], 2, 0), Err(PlanningError::InvalidBatchSize)));
    }
}
