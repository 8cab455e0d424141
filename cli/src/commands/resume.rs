use clap::Args;

use super::{exit_code, print_outcome, with_monitor, Context};

#[derive(Args, Debug)]
pub struct ResumeArgs {
    pub session_id: String,

    /// Resume even when the record has unresolved inconsistencies
    #[arg(long)]
    pub force: bool,

    /// Do not print progress while running
    #[arg(long)]
    pub no_monitor: bool,
}

pub fn execute(ctx: &Context, args: &ResumeArgs) -> anyhow::Result<u8> {
    let controller = ctx.controller()?;
    // the monitor must first see the prepared record, not the finished one
    let plan = controller.prepare_resume(&args.session_id, args.force)?;
    let resumed = with_monitor(ctx, &args.session_id, !args.no_monitor, || {
        Ok(controller.run_resumed(plan)?)
    })?;

    let preview = &resumed.preview;
    if !preview.reclassified.is_empty() {
        println!(
            "Recovered {} document(s) from existing results",
            preview.reclassified.len()
        );
    }
    for repair in &preview.repairs {
        println!("  repaired: {}", repair);
    }
    for warning in &preview.warnings {
        println!("  warning: {}", warning);
    }

    print_outcome(&resumed.session, &resumed.run);
    Ok(exit_code(&resumed.run))
}
