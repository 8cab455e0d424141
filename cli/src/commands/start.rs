use std::path::PathBuf;

use anyhow::bail;
use clap::Args;

use docbatch::config::loader::validate_config;
use docbatch::planner::DocumentScanner;
use docbatch::DocbatchError;

use super::{exit_code, print_outcome, with_monitor, Context};

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Files or directories to process; defaults to the configured input directory
    pub paths: Vec<PathBuf>,

    /// Number of batches processed in parallel
    #[arg(long)]
    pub workers: Option<usize>,

    /// Upper bound on documents per batch
    #[arg(long)]
    pub max_per_batch: Option<usize>,

    /// Do not print progress while running
    #[arg(long)]
    pub no_monitor: bool,
}

pub fn execute(ctx: &Context, args: &StartArgs) -> anyhow::Result<u8> {
    let mut config = ctx.config.clone();
    if let Some(workers) = args.workers {
        config.worker_count = workers;
    }
    if let Some(max) = args.max_per_batch {
        config.max_per_batch = max;
    }
    validate_config(&config).map_err(DocbatchError::from)?;

    let inputs = if !args.paths.is_empty() {
        args.paths.clone()
    } else if let Some(dir) = &config.input_directory {
        vec![PathBuf::from(dir)]
    } else {
        bail!("No input paths given and no input_directory configured");
    };

    let documents = DocumentScanner::from_config(&config)
        .map_err(DocbatchError::from)?
        .skip_dir(&ctx.state_dir)
        .skip_dir(&config.output_directory)
        .scan(&inputs)
        .map_err(DocbatchError::from)?;

    let controller = ctx.controller()?;
    let mut session = controller.create_session(&config, &documents)?;
    println!(
        "Session {}: {} documents in {} batches ({} workers)",
        session.session_id,
        session.total_documents,
        session.batches.len(),
        config.worker_count
    );
    for issue in &session.planning_issues {
        println!("  excluded {}", issue);
    }

    let session_id = session.session_id.clone();
    let outcome = with_monitor(ctx, &session_id, !args.no_monitor, || {
        Ok(controller.run(&mut session)?)
    })?;

    print_outcome(&session, &outcome);
    Ok(exit_code(&outcome))
}
