//! Structured logging setup for rubric-core
//!
//! Grading runs are usually driven by a service layer, so the subscriber
//! writes to stderr and defaults to warnings only. `RUBRIC_LOG` overrides
//! the filter (standard `tracing` env-filter syntax).

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize structured logging for a grading host process.
///
/// `verbose` bumps the default level to debug; an explicit `log_level`
/// wins over both. `log_json` switches to line-oriented JSON output for
/// log aggregation.
pub fn init_tracing(
    verbose: bool,
    log_level: Option<&str>,
    log_json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let level = match (verbose, log_level) {
        (true, None) => "rubric_core=debug",
        (false, None) => "rubric_core=warn",
        (_, Some(level)) => return init_with_level(level, log_json),
    };

    init_with_level(level, log_json)
}

fn init_with_level(level: &str, log_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    // RUBRIC_LOG environment variable override
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("RUBRIC_LOG"))
        .unwrap_or_else(|_| {
            EnvFilter::new(if level.contains('=') {
                level.to_string()
            } else {
                format!("rubric_core={}", level)
            })
        });

    let registry = tracing_subscriber::registry().with(filter);

    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_exclusive_per_process() {
        // first init wins; a second subscriber registration is rejected
        assert!(init_tracing(true, None, false).is_ok());
        assert!(init_with_level("debug", true).is_err());
    }
}
