// Durable diagnostic log
//
// One append-only file per run, shared by every producer. Lines are formatted and
// written while holding the sink's mutex, so concurrent producers can never
// interleave partial lines. Storage failures are reported through `tracing` and
// otherwise swallowed: a broken disk must not take the soak run down with it.

use crate::{APP_NAME, VERSION};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local, NaiveTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Prefix used when a producer writes before anyone called [`LogSink::init`].
pub const DEFAULT_LOG_PREFIX: &str = "hand_passthrough_test";

/// Errors raised while opening or appending to the diagnostic log.
///
/// These never escape [`LogSink::write_line`]; they are only logged.
#[derive(Error, Debug)]
pub enum LogSinkError {
    #[error("Failed to create diagnostics directory {path}: {source}")]
    CreateDir {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open diagnostic log {path}: {source}")]
    Open {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to append to diagnostic log {path}: {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Thread-safe, lazily created diagnostic log file.
///
/// Create one per process and hand out `Arc<LogSink>` clones to every producer.
#[derive(Debug)]
pub struct LogSink {
    dir: Utf8PathBuf,
    inner: Mutex<SinkInner>,
}

#[derive(Debug, Default)]
struct SinkInner {
    file: Option<File>,
    path: Option<Utf8PathBuf>,
    init_attempted: bool,
    write_failures: u64,
}

impl LogSink {
    /// Create a sink that will place its file under `dir`.
    ///
    /// Nothing touches the filesystem until [`init`](Self::init) or the first
    /// [`write_line`](Self::write_line).
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            inner: Mutex::new(SinkInner::default()),
        }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Create the log file `{prefix}_{UTC yyyyMMdd_HHmmss}.log`.
    ///
    /// Only the first call (or first write) has an effect; later calls return
    /// the already active path.
    pub fn init(&self, prefix: &str) -> Option<Utf8PathBuf> {
        let mut inner = self.lock();
        self.init_locked(&mut inner, prefix);
        inner.path.clone()
    }

    /// Append `[HH:MM:SS.mmm] text` to the log.
    pub fn write_line(&self, text: impl AsRef<str>) {
        let mut inner = self.lock();
        if !inner.init_attempted {
            self.init_locked(&mut inner, DEFAULT_LOG_PREFIX);
        }
        append_locked(&mut inner, text.as_ref());
    }

    /// Path of the active log file, if it could be created.
    pub fn current_path(&self) -> Option<Utf8PathBuf> {
        self.lock().path.clone()
    }

    /// Number of appends that failed since the sink was opened.
    pub fn write_failures(&self) -> u64 {
        self.lock().write_failures
    }

    fn lock(&self) -> MutexGuard<'_, SinkInner> {
        // A producer that panicked mid-write cannot corrupt the counters we keep
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_locked(&self, inner: &mut SinkInner, prefix: &str) {
        if inner.init_attempted {
            return;
        }
        inner.init_attempted = true;

        match open_log_file(&self.dir, prefix, Utc::now()) {
            Ok((file, path)) => {
                tracing::info!("Diagnostic log started: {}", path);
                inner.file = Some(file);
                inner.path = Some(path.clone());
                append_locked(inner, &format!("[INIT] Log started: {}", path));
                append_locked(
                    inner,
                    &format!(
                        "[ENV] {} {} | {}/{}",
                        APP_NAME,
                        VERSION,
                        std::env::consts::OS,
                        std::env::consts::ARCH
                    ),
                );
            }
            Err(e) => {
                tracing::warn!("Diagnostic log unavailable, lines will be dropped: {}", e);
            }
        }
    }
}

fn append_locked(inner: &mut SinkInner, text: &str) {
    let Some(file) = inner.file.as_mut() else {
        return;
    };

    let line = format_line(Local::now().time(), text);
    if let Err(source) = file.write_all(line.as_bytes()) {
        inner.write_failures += 1;
        // Report the first failure of a streak and then every 100th
        if inner.write_failures % 100 == 1 {
            let err = LogSinkError::Write {
                path: inner.path.clone().unwrap_or_default(),
                source,
            };
            tracing::warn!(failures = inner.write_failures, "{}", err);
        }
    }
}

fn open_log_file(
    dir: &Utf8Path,
    prefix: &str,
    now: DateTime<Utc>,
) -> Result<(File, Utf8PathBuf), LogSinkError> {
    fs::create_dir_all(dir).map_err(|source| LogSinkError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(log_file_name(prefix, now));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| LogSinkError::Open {
            path: path.clone(),
            source,
        })?;

    Ok((file, path))
}

/// `{prefix}_{yyyyMMdd_HHmmss}.log` for the given UTC start time.
pub fn log_file_name(prefix: &str, started: DateTime<Utc>) -> String {
    format!("{}_{}.log", prefix, started.format("%Y%m%d_%H%M%S"))
}

/// Format one persisted record: `[HH:MM:SS.mmm] text\n`.
///
/// Embedded line breaks are flattened so one call is always one line.
pub fn format_line(time: NaiveTime, text: &str) -> String {
    let text = if text.contains(['\n', '\r']) {
        text.replace("\r\n", " ").replace(['\n', '\r'], " ")
    } else {
        text.to_string()
    };
    format!("[{}] {}\n", time.format("%H:%M:%S%.3f"), text)
}

/// Most recently modified `.log` file in a diagnostics directory.
pub fn latest_log(dir: &Utf8Path) -> Result<Option<Utf8PathBuf>> {
    if !dir.exists() {
        return Ok(None);
    }

    let mut latest: Option<(std::time::SystemTime, Utf8PathBuf)> = None;
    for entry in dir
        .read_dir_utf8()
        .with_context(|| format!("Failed to read diagnostics directory: {}", dir))?
    {
        let entry = entry.with_context(|| format!("Failed to read entry in {}", dir))?;
        let path = entry.path();
        if path.extension() != Some("log") {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .with_context(|| format!("Failed to stat {}", path))?;
        if latest.as_ref().is_none_or(|(best, _)| modified >= *best) {
            latest = Some((modified, path.to_path_buf()));
        }
    }

    Ok(latest.map(|(_, path)| path))
}
