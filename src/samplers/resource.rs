// Resource sampler
//
// Periodically records process memory to the diagnostic log and caches the most
// recent sample for the live summary.

use crate::diagnostics::LogSink;
use crate::samplers::run_periodic;
use arc_swap::ArcSwapOption;
use camino::Utf8PathBuf;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_RESOURCE_INTERVAL: Duration = Duration::from_secs(5);

/// Latest sample shared with readers.
pub type ResourceCache = Arc<ArcSwapOption<MemorySample>>;

/// Memory figures in MiB.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MemorySample {
    pub allocated_mb: f64,
    pub reserved_mb: f64,
    pub unused_mb: f64,
}

impl MemorySample {
    /// Sample from allocated/reserved byte counts; unused is the difference.
    pub fn from_bytes(allocated: u64, reserved: u64) -> Self {
        const MIB: f64 = 1024.0 * 1024.0;
        Self {
            allocated_mb: allocated as f64 / MIB,
            reserved_mb: reserved as f64 / MIB,
            unused_mb: reserved.saturating_sub(allocated) as f64 / MIB,
        }
    }

    pub fn log_line(&self) -> String {
        format!(
            "[RES] memMB alloc={:.1} reserved={:.1} unused={:.1}",
            self.allocated_mb, self.reserved_mb, self.unused_mb
        )
    }
}

/// Source of memory statistics.
pub trait MemoryProbe: Send + Sync {
    /// `None` when statistics cannot be read on this host.
    fn sample(&self) -> Option<MemorySample>;
}

/// Reads the current process's `VmRSS` (allocated) and `VmSize` (reserved).
#[derive(Debug, Clone)]
pub struct ProcMemoryProbe {
    status_path: Utf8PathBuf,
}

impl ProcMemoryProbe {
    pub fn new() -> Self {
        Self::with_status_path("/proc/self/status")
    }

    pub fn with_status_path(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            status_path: path.into(),
        }
    }

    /// Parse a `/proc/<pid>/status` document.
    pub fn parse_status(status: &str) -> Option<MemorySample> {
        let mut rss_kb = None;
        let mut size_kb = None;

        for line in status.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let kb = value
                .split_whitespace()
                .next()
                .and_then(|n| n.parse::<u64>().ok());
            match key.trim() {
                "VmRSS" => rss_kb = kb,
                "VmSize" => size_kb = kb,
                _ => {}
            }
        }

        Some(MemorySample::from_bytes(rss_kb? * 1024, size_kb? * 1024))
    }
}

impl Default for ProcMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcMemoryProbe {
    fn sample(&self) -> Option<MemorySample> {
        let status = fs::read_to_string(&self.status_path).ok()?;
        Self::parse_status(&status)
    }
}

/// Writes `[RES] memMB ...` every interval.
pub struct ResourceSampler {
    sink: Arc<LogSink>,
    probe: Arc<dyn MemoryProbe>,
    interval: Duration,
    latest: ResourceCache,
    unavailable_logged: AtomicBool,
}

impl ResourceSampler {
    pub fn new(sink: Arc<LogSink>, probe: Arc<dyn MemoryProbe>, interval: Duration) -> Self {
        Self {
            sink,
            probe,
            interval,
            latest: Arc::new(ArcSwapOption::empty()),
            unavailable_logged: AtomicBool::new(false),
        }
    }

    /// Handle to the cached sample; stays valid after the sampler is spawned.
    pub fn cache(&self) -> ResourceCache {
        Arc::clone(&self.latest)
    }

    /// Take one sample, log it and cache it.
    pub fn sample_once(&self) -> Option<MemorySample> {
        match self.probe.sample() {
            Some(sample) => {
                self.sink.write_line(sample.log_line());
                self.latest.store(Some(Arc::new(sample)));
                Some(sample)
            }
            None => {
                if !self.unavailable_logged.swap(true, Ordering::Relaxed) {
                    tracing::warn!("Memory statistics unavailable; resource sampling disabled");
                }
                None
            }
        }
    }

    pub async fn run(self, cancel: watch::Receiver<bool>) {
        tracing::debug!("Resource sampling every {:?}", self.interval);
        run_periodic(self.interval, cancel, || {
            self.sample_once();
        })
        .await;
    }

    pub fn spawn(self, cancel: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FixedProbe(Option<MemorySample>);

    impl MemoryProbe for FixedProbe {
        fn sample(&self) -> Option<MemorySample> {
            self.0
        }
    }

    fn temp_sink() -> (Arc<LogSink>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (Arc::new(LogSink::new(dir)), temp_dir)
    }

    #[test]
    fn test_parse_status() {
        let status = "Name:\thps-soak\nVmPeak:\t  300000 kB\nVmSize:\t  204800 kB\nVmRSS:\t   51200 kB\n";
        let sample = ProcMemoryProbe::parse_status(status).unwrap();
        assert_eq!(sample.allocated_mb, 50.0);
        assert_eq!(sample.reserved_mb, 200.0);
        assert_eq!(sample.unused_mb, 150.0);
    }

    #[test]
    fn test_parse_status_missing_fields() {
        assert!(ProcMemoryProbe::parse_status("Name:\tkthreadd\n").is_none());
    }

    #[test]
    fn test_log_line_format() {
        let sample = MemorySample {
            allocated_mb: 12.345,
            reserved_mb: 64.0,
            unused_mb: 51.64,
        };
        assert_eq!(
            sample.log_line(),
            "[RES] memMB alloc=12.3 reserved=64.0 unused=51.6"
        );
    }

    #[test]
    fn test_sample_once_logs_and_caches() {
        let (sink, _tmp) = temp_sink();
        let expected = MemorySample::from_bytes(10 * 1024 * 1024, 30 * 1024 * 1024);
        let sampler = ResourceSampler::new(
            Arc::clone(&sink),
            Arc::new(FixedProbe(Some(expected))),
            DEFAULT_RESOURCE_INTERVAL,
        );
        let cache = sampler.cache();

        assert_eq!(sampler.sample_once(), Some(expected));

        assert_eq!(cache.load_full().as_deref(), Some(&expected));
        let content = fs::read_to_string(sink.current_path().unwrap()).unwrap();
        assert!(content.contains("[RES] memMB alloc=10.0 reserved=30.0 unused=20.0"));
    }

    #[test]
    fn test_missing_probe_is_noop() {
        let (sink, _tmp) = temp_sink();
        let sampler = ResourceSampler::new(
            Arc::clone(&sink),
            Arc::new(FixedProbe(None)),
            DEFAULT_RESOURCE_INTERVAL,
        );

        assert!(sampler.sample_once().is_none());
        assert!(sampler.sample_once().is_none());
        assert!(sampler.cache().load().is_none());
        assert!(sink.current_path().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_task_samples_on_interval() {
        let (sink, _tmp) = temp_sink();
        let sampler = ResourceSampler::new(
            Arc::clone(&sink),
            Arc::new(FixedProbe(Some(MemorySample::default()))),
            Duration::from_secs(5),
        );
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let task = sampler.spawn(cancel_rx);
        tokio::time::sleep(Duration::from_secs(16)).await;
        cancel_tx.send(true).unwrap();
        task.await.unwrap();

        let content = fs::read_to_string(sink.current_path().unwrap()).unwrap();
        assert_eq!(content.matches("[RES] memMB").count(), 3);
    }
}
