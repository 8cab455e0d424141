use std::io::IsTerminal;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` wins over `-v`. Output goes to
/// stderr, which for worker processes is their batch log file.
pub fn init(verbose: u8, json: bool) -> anyhow::Result<()> {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        let layer = fmt::layer().json().with_writer(std::io::stderr);
        tracing::subscriber::set_global_default(registry.with(layer))?;
    } else {
        let layer = fmt::layer()
            .with_target(false)
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr);
        tracing::subscriber::set_global_default(registry.with(layer))?;
    }

    tracing_log::LogTracer::init()?;
    Ok(())
}
