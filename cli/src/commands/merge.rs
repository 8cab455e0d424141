use clap::Args;

use docbatch::{ReportFormat, ResultMerger};

use super::Context;
use crate::{EXIT_OK, EXIT_UNFINISHED};

#[derive(Args, Debug)]
pub struct MergeArgs {
    pub session_id: String,

    /// Merge despite validation issues or missing artifacts
    #[arg(long)]
    pub force: bool,

    /// Report format: json or jsonl
    #[arg(long, default_value = "json")]
    pub format: ReportFormat,
}

pub fn execute(ctx: &Context, args: &MergeArgs) -> anyhow::Result<u8> {
    let session = ctx.load_session(&args.session_id)?;
    let report = ResultMerger::new(args.format.renderer())
        .merge(&session, args.force)
        .map_err(docbatch::DocbatchError::from)?;

    println!(
        "Merged {} row(s) into {}",
        report.rows,
        report.report_path.display()
    );
    println!("Manifest: {}", report.manifest_path.display());
    if report.failed_documents > 0 {
        println!("{} document(s) failed and are listed in the manifest", report.failed_documents);
    }
    for skipped in &report.skipped {
        println!(
            "  skipped {} [{}]: {}",
            skipped.document_path.display(),
            skipped.batch_id,
            skipped.reason
        );
    }

    Ok(if report.skipped.is_empty() { EXIT_OK } else { EXIT_UNFINISHED })
}
