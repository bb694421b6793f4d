use crate::diagnostics::LogSink;
use crate::samplers::run_periodic;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Liveness marker: a `[HB] tick` line every interval proves the host was still
/// scheduling work at that time.
pub struct Heartbeat {
    sink: Arc<LogSink>,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(sink: Arc<LogSink>, interval: Duration) -> Self {
        Self { sink, interval }
    }

    pub async fn run(self, cancel: watch::Receiver<bool>) {
        self.sink.write_line("[HB] HeartbeatLogger enabled.");
        tracing::debug!("Heartbeat every {:?}", self.interval);

        let sink = self.sink;
        run_periodic(self.interval, cancel, || sink.write_line("[HB] tick")).await;
    }

    pub fn spawn(self, cancel: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_writes_ticks() {
        let temp_dir = TempDir::new().unwrap();
        let sink = Arc::new(LogSink::new(
            Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap(),
        ));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let task = Heartbeat::new(Arc::clone(&sink), Duration::from_secs(10)).spawn(cancel_rx);
        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel_tx.send(true).unwrap();
        task.await.unwrap();

        let content = fs::read_to_string(sink.current_path().unwrap()).unwrap();
        assert!(content.contains("[HB] HeartbeatLogger enabled."));
        assert_eq!(content.matches("[HB] tick").count(), 2);
    }
}
