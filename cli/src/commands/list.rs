use clap::Args;

use super::Context;
use crate::EXIT_OK;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Print the sessions as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(ctx: &Context, args: &ListArgs) -> anyhow::Result<u8> {
    let sessions = ctx.store().list();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(EXIT_OK);
    }

    if sessions.is_empty() {
        println!("No sessions in {}", ctx.state_dir.display());
        return Ok(EXIT_OK);
    }

    println!(
        "{:<26} {:<13} {:>11} {:>7} {:>8}  UPDATED",
        "SESSION", "STATUS", "DONE/TOTAL", "FAILED", "BATCHES"
    );
    for s in &sessions {
        println!(
            "{:<26} {:<13} {:>11} {:>7} {:>8}  {}",
            s.session_id,
            s.status.as_str(),
            format!("{}/{}", s.completed_documents, s.total_documents),
            s.failed_documents,
            s.batch_count,
            s.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(EXIT_OK)
}
