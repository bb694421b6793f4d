// Host log stream ingestion
//
// Feeds device log lines (Android logcat or already-split (severity, text) pairs)
// into the classifier and mirrors the interesting ones into the diagnostic log.

use crate::diagnostics::{Classifier, LogSink, Severity};
use anyhow::{Context, Result};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;

// 03-07 14:05:09.123  1234  5678 W Tag: message
static THREADTIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\.\d{3}\s+\d+\s+\d+\s+([VDIWEFA])\s+(.*)$")
        .expect("Invalid threadtime pattern")
});

// W/Tag( 1234): message
static BRIEF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([VDIWEFA])/([^(]*?)\s*\(\s*\d+\):\s?(.*)$").expect("Invalid brief pattern")
});

/// One parsed host log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogcatLine {
    pub severity: Severity,
    /// `Tag: message` for recognised formats, otherwise the raw line
    pub text: String,
}

/// Parse a logcat line in `threadtime` or `brief` format.
///
/// Lines in neither format are passed through whole at info severity, so
/// flagged substrings are still caught.
pub fn parse_logcat_line(line: &str) -> LogcatLine {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(caps) = THREADTIME_PATTERN.captures(line) {
        return LogcatLine {
            severity: severity_from_priority(&caps[1]),
            text: caps[2].trim().to_string(),
        };
    }

    if let Some(caps) = BRIEF_PATTERN.captures(line) {
        return LogcatLine {
            severity: severity_from_priority(&caps[1]),
            text: format!("{}: {}", caps[2].trim(), caps[3].trim()),
        };
    }

    LogcatLine {
        severity: Severity::Info,
        text: line.trim().to_string(),
    }
}

fn severity_from_priority(priority: &str) -> Severity {
    match priority {
        "W" => Severity::Warning,
        "E" | "F" => Severity::Error,
        _ => Severity::Info,
    }
}

/// Bridge between a host log stream and the diagnostics pipeline.
#[derive(Clone)]
pub struct LogIngest {
    sink: Arc<LogSink>,
    classifier: Arc<Classifier>,
}

impl LogIngest {
    pub fn new(sink: Arc<LogSink>, classifier: Arc<Classifier>) -> Self {
        Self { sink, classifier }
    }

    /// Record one `(severity, text)` event.
    ///
    /// Warnings and errors are mirrored as `[Warning] text` / `[Error] text`,
    /// flagged lines additionally as `[FLAG] text`. Returns whether the line
    /// was flagged.
    pub fn ingest(&self, severity: Severity, message: &str) -> bool {
        match severity {
            Severity::Warning => self.sink.write_line(format!("[Warning] {}", message)),
            Severity::Error => self.sink.write_line(format!("[Error] {}", message)),
            Severity::Info => {}
        }

        let flagged = self.classifier.classify_log_event(severity, message);
        if flagged {
            self.sink.write_line(format!("[FLAG] {}", message));
        }
        flagged
    }

    /// Parse and record one raw logcat line.
    pub fn ingest_line(&self, line: &str) -> bool {
        let parsed = parse_logcat_line(line);
        self.ingest(parsed.severity, &parsed.text)
    }

    /// Consume `reader` line by line until EOF or until `cancel` turns true.
    ///
    /// Returns the number of non-empty lines ingested.
    pub async fn ingest_reader<R>(&self, reader: R, mut cancel: watch::Receiver<bool>) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut count = 0usize;
        let mut cancel_open = true;

        self.sink.write_line("[INGEST] Attached.");
        tracing::info!("Log ingestion attached");

        let result = loop {
            if *cancel.borrow() {
                break Ok(count);
            }

            tokio::select! {
                changed = cancel.changed(), if cancel_open => {
                    // A dropped sender can no longer cancel; keep reading to EOF
                    if changed.is_err() {
                        cancel_open = false;
                    }
                }
                line = lines.next_line() => match line.context("Failed to read host log stream") {
                    Ok(Some(line)) => {
                        if !line.trim().is_empty() {
                            self.ingest_line(&line);
                            count += 1;
                        }
                    }
                    Ok(None) => break Ok(count),
                    Err(e) => break Err(e),
                },
            }
        };

        self.sink.write_line("[INGEST] Detached.");
        tracing::info!(lines = count, "Log ingestion detached");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::clock::ManualClock;
    use camino::Utf8PathBuf;
    use std::fs;
    use tempfile::TempDir;

    fn ingest() -> (LogIngest, Arc<Classifier>, Arc<LogSink>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let sink = Arc::new(LogSink::new(dir));
        let classifier = Arc::new(Classifier::new(
            Arc::clone(&sink),
            Arc::new(ManualClock::new()),
        ));
        let ingest = LogIngest::new(Arc::clone(&sink), Arc::clone(&classifier));
        (ingest, classifier, sink, temp_dir)
    }

    fn log_content(sink: &LogSink) -> String {
        fs::read_to_string(sink.current_path().unwrap()).unwrap()
    }

    #[test]
    fn test_parse_threadtime() {
        let line = "03-07 14:05:09.123  1234  5678 W FrameSetCollator: deadlineMissed frame=42";
        let parsed = parse_logcat_line(line);
        assert_eq!(parsed.severity, Severity::Warning);
        assert_eq!(parsed.text, "FrameSetCollator: deadlineMissed frame=42");
    }

    #[test]
    fn test_parse_brief() {
        let parsed = parse_logcat_line("E/CameraService(  812): muxModeMisMatch on stream 2");
        assert_eq!(parsed.severity, Severity::Error);
        assert_eq!(parsed.text, "CameraService: muxModeMisMatch on stream 2");

        let fatal = parse_logcat_line("F/libc    (  99): Fatal signal 11");
        assert_eq!(fatal.severity, Severity::Error);
        assert_eq!(fatal.text, "libc: Fatal signal 11");
    }

    #[test]
    fn test_parse_other_priorities_are_info() {
        for priority in ["V", "D", "I"] {
            let line = format!("{}/Tag( 1): hello", priority);
            assert_eq!(parse_logcat_line(&line).severity, Severity::Info);
        }
    }

    #[test]
    fn test_parse_unknown_format_passes_through() {
        let parsed = parse_logcat_line("--------- beginning of main\r\n");
        assert_eq!(parsed.severity, Severity::Info);
        assert_eq!(parsed.text, "--------- beginning of main");
    }

    #[test]
    fn test_ingest_mirrors_warnings_and_flags() {
        let (ingest, classifier, sink, _tmp) = ingest();

        assert!(!ingest.ingest(Severity::Warning, "slow frame"));
        assert!(ingest.ingest(Severity::Error, "releasing incomplete frame set"));
        assert!(!ingest.ingest(Severity::Info, "heartbeat ok"));

        let counters = classifier.counters();
        assert_eq!(counters.warnings, 1);
        assert_eq!(counters.errors, 1);
        assert_eq!(counters.flagged_events, 1);

        let content = log_content(&sink);
        assert!(content.contains("] [Warning] slow frame"));
        assert!(content.contains("] [Error] releasing incomplete frame set"));
        assert!(content.contains("] [FLAG] releasing incomplete frame set"));
        assert!(!content.contains("heartbeat ok"));
    }

    #[test]
    fn test_ingest_reader_until_eof() {
        let (ingest, classifier, sink, _tmp) = ingest();
        let input = b"03-07 14:05:09.123  1234  5678 W XrRuntime: onFrameSetAvailable late\n\
                      \n\
                      I/Tracker( 77): hands ok\n\
                      E/Tracker( 77): HANDTRACKING NaN detected\n";
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let count = tokio_test::block_on(ingest.ingest_reader(&input[..], cancel_rx)).unwrap();

        assert_eq!(count, 3);
        let counters = classifier.counters();
        assert_eq!(counters.warnings, 1);
        assert_eq!(counters.errors, 1);
        assert_eq!(counters.flagged_events, 2);

        let content = log_content(&sink);
        let attached = content.find("[INGEST] Attached.").unwrap();
        let detached = content.find("[INGEST] Detached.").unwrap();
        assert!(attached < detached);
    }

    #[test]
    fn test_ingest_reader_stops_when_cancelled() {
        let (ingest, classifier, _sink, _tmp) = ingest();
        let (_cancel_tx, cancel_rx) = watch::channel(true);

        let count =
            tokio_test::block_on(ingest.ingest_reader(&b"W/Tag( 1): deadlineMissed\n"[..], cancel_rx))
                .unwrap();

        assert_eq!(count, 0);
        assert_eq!(classifier.counters().flagged_events, 0);
    }

    #[test]
    fn test_ingest_reader_survives_dropped_sender() {
        let (ingest, _classifier, _sink, _tmp) = ingest();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        drop(cancel_tx);

        let count =
            tokio_test::block_on(ingest.ingest_reader(&b"I/Tag( 1): a\nI/Tag( 1): b\n"[..], cancel_rx))
                .unwrap();

        assert_eq!(count, 2);
    }
}
