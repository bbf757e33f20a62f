//! Tracing initialization from CLI flags.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber.
///
/// `level` is the base level; `package_levels` adds per-target directives
/// (`spectre_log=debug,kube=warn`). `fatal` maps to `error` — tracing has
/// no fatal level, and anything fatal aborts the process anyway.
pub fn init(level: &str, package_levels: Option<&str>) -> Result<()> {
    let base = match level {
        "fatal" => "error",
        other => other,
    };

    let mut filter = EnvFilter::try_new(base).context("invalid log level")?;
    if let Some(packages) = package_levels {
        for directive in packages.split(',').filter(|s| !s.is_empty()) {
            filter = filter.add_directive(
                directive
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid package log level {directive:?}"))?,
            );
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(())
}
