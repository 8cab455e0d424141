use clap::Args;

use super::Context;
use crate::{EXIT_ERROR, EXIT_OK};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    pub session_id: String,
}

pub fn execute(ctx: &Context, args: &ValidateArgs) -> anyhow::Result<u8> {
    let session = ctx.load_session(&args.session_id)?;
    let report = ctx.store().validate(&session);

    if report.is_valid() {
        println!("Session {} is consistent", session.session_id);
        return Ok(EXIT_OK);
    }

    println!(
        "Session {} has {} issue(s):",
        session.session_id,
        report.issues.len()
    );
    for issue in &report.issues {
        println!("  - {}", issue);
    }
    Ok(EXIT_ERROR)
}
