//! Subscriber setup for applications embedding the crate.

use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::error::LoggingError;

/// Environment variable holding the log filter, e.g. `tsumiki=debug`.
pub const ENV_VAR: &str = "TSUMIKI_LOG";

/// Install a global subscriber printing to stderr next to the progress bars
/// of the operation queue.
///
/// Warnings and errors are shown by default. `TSUMIKI_LOG` overrides the
/// filter with [`EnvFilter`] syntax.
pub fn init() -> Result<(), LoggingError> {
    let filter = match std::env::var(ENV_VAR) {
        Ok(raw) => EnvFilter::try_new(raw)?,
        Err(_) => EnvFilter::new("warn"),
    };

    let indicatif = IndicatifLayer::new();
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(indicatif.get_stderr_writer())
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(layer)
        .with(indicatif)
        .try_init()?;

    Ok(())
}
