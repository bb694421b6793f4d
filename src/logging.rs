// Operator log
//
// Process-wide `tracing` output: a daily-rolling file under the configured log
// directory plus, for the CLI, a compact stderr layer. The per-run diagnostic
// record is separate (see `diagnostics::LogSink`).

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the file-only operator log.
///
/// Keep the returned guard alive until exit, or buffered lines are lost.
pub fn setup_logging(log_dir: &str, log_prefix: &str, debug_mode: bool) -> Result<WorkerGuard> {
    setup_logging_with_console(log_dir, log_prefix, debug_mode, false)
}

/// Install the operator log, optionally mirrored to stderr.
///
/// Files roll daily as `{log_prefix}.{yyyy-MM-dd}` inside `log_dir`. The level is
/// `debug` or `info` depending on `debug_mode` unless `RUST_LOG` is set.
///
/// Fails if the directory cannot be created or a global subscriber is already
/// installed.
pub fn setup_logging_with_console(
    log_dir: &str,
    log_prefix: &str,
    debug_mode: bool,
    console_output: bool,
) -> Result<WorkerGuard> {
    let dir = Utf8Path::new(log_dir);
    fs::create_dir_all(dir).with_context(|| format!("Failed to create log directory: {}", dir))?;

    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(dir, log_prefix));

    let default_level = if debug_mode { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Files get full source locations; the console stays short
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);
    let console_layer = console_output.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(
        dir = %dir,
        prefix = log_prefix,
        level = default_level,
        console = console_output,
        "Operator log ready"
    );

    Ok(guard)
}
