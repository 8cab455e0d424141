use std::io::{BufRead, Write};

use clap::Args;

use docbatch::CleanupOptions;

use super::Context;
use crate::EXIT_OK;

#[derive(Args, Debug)]
pub struct CleanupArgs {
    pub session_id: String,

    /// Also delete the session record, its backups and all results
    #[arg(long)]
    pub purge: bool,

    /// Do not ask for confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub fn execute(ctx: &Context, args: &CleanupArgs) -> anyhow::Result<u8> {
    let session = ctx.load_session(&args.session_id)?;

    if args.purge && !args.yes {
        print!(
            "Delete session {} including {}? [y/N] ",
            session.session_id,
            session.output_dir.display()
        );
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted");
            return Ok(EXIT_OK);
        }
    }

    let controller = ctx.controller()?;
    let report = controller.cleanup(&args.session_id, CleanupOptions { purge: args.purge })?;

    if report.temp_dir_removed {
        println!("Removed {}", session.temp_dir.display());
    }
    if args.purge {
        if report.output_dir_removed {
            println!("Removed {}", session.output_dir.display());
        }
        println!(
            "Removed session record and {} backup(s)",
            report.backups_removed
        );
    } else if report.backups_pruned > 0 {
        println!("Pruned {} backup(s)", report.backups_pruned);
    }
    Ok(EXIT_OK)
}
