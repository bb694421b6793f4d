//! Diagnostic capture pipeline: the durable log sink, the anomaly classifier and
//! host log ingestion.

pub mod classifier;
pub mod ingest;
pub mod log_sink;

pub use classifier::{
    Classifier, ClassifierSnapshot, FLAGGED_PATTERNS, LAST_FLAG_MAX_CHARS, LastFlag, Severity,
    trim_message,
};
pub use ingest::{LogIngest, LogcatLine, parse_logcat_line};
pub use log_sink::{DEFAULT_LOG_PREFIX, LogSink, LogSinkError, format_line, latest_log, log_file_name};
