use docbatch::error::{DocbatchError, MergeError, ResumeError};

/// Prints an error with its classification and the suggested next step.
pub fn print_error(err: &anyhow::Error) {
    let Some(docbatch_err) = err.chain().find_map(|e| e.downcast_ref::<DocbatchError>()) else {
        eprintln!("error: {:#}", err);
        return;
    };

    eprintln!("error [{}]: {}", docbatch_err.class(), docbatch_err);
    match docbatch_err {
        DocbatchError::Resume(ResumeError::Refused { issues, .. })
        | DocbatchError::Merge(MergeError::InvalidRecord { issues }) => {
            for issue in issues {
                eprintln!("  - {}", issue);
            }
        }
        DocbatchError::Merge(MergeError::Inconsistent { missing }) => {
            for m in missing {
                eprintln!("  - {} [{}]: {}", m.document_path.display(), m.batch_id, m.reason);
            }
        }
        _ => {}
    }
    if let Some(remediation) = docbatch_err.remediation() {
        eprintln!("hint: {}", remediation);
    }
}
