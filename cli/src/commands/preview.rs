use clap::Args;

use docbatch::ResumeCoordinator;

use super::Context;
use crate::EXIT_OK;

#[derive(Args, Debug)]
pub struct PreviewArgs {
    pub session_id: String,

    /// Print the preview as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(ctx: &Context, args: &PreviewArgs) -> anyhow::Result<u8> {
    let store = ctx.store();
    let preview = ResumeCoordinator::new(&store).preview(&args.session_id)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(EXIT_OK);
    }

    println!("Session {} ({})", preview.session_id, preview.recorded_status.as_str());
    println!(
        "  documents: {} total, {} completed, {} failed, {} remaining",
        preview.total_documents,
        preview.completed_documents,
        preview.failed_documents,
        preview.remaining_documents
    );
    if preview.incomplete_batches.is_empty() {
        println!("  nothing left to run");
    } else {
        println!("  batches to run: {}", preview.incomplete_batches.join(", "));
    }
    for r in &preview.reclassified {
        println!(
            "  {} [{}]: {} -> {} ({})",
            r.document_path.display(),
            r.batch_id,
            r.from.as_str(),
            r.to.as_str(),
            r.reason
        );
    }
    for repair in &preview.repairs {
        println!("  repair: {}", repair);
    }
    for warning in &preview.warnings {
        println!("  warning: {}", warning);
    }
    for issue in &preview.issues {
        println!("  issue: {}", issue);
    }
    if !preview.resumable {
        println!("Resume will be refused without --force");
    }

    Ok(EXIT_OK)
}
