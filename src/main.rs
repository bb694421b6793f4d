//! hps-soak - soak test runner for hand tracking + passthrough devices
//!
//! Command line entry point. It initializes:
//! - Configuration ([`ConfigManager`]: `Soak Data/Soak Config.yaml` + `HPS_SOAK_*`)
//! - Operator logging (daily rolling file + console)
//! - The diagnostic log sink, classifier and samplers
//! - The soak orchestrator ([`SoakRunner`]) against the simulated device
//!
//! # Execution Flow
//!
//! 1. Parse CLI arguments and load settings (CLI flags override the file)
//! 2. Initialize logging under `log_dir`
//! 3. Create the tokio runtime
//! 4. Spawn heartbeat, resource sampler, pose guard (and stdin ingestion)
//! 5. Run warmup, main run and soft resets, printing the live summary
//! 6. Ctrl-C cancels the run; teardown still runs
//! 7. Stop samplers, log the classification summary, shut the runtime down

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use hps_soak::config::DEFAULT_CONFIG_DIR;
use hps_soak::device::{
    CallLog, HandTracking, PassthroughController, PassthroughRegistry, SimulatedHandTracking,
    SimulatedPassthrough,
};
use hps_soak::models::PassthroughBackendKind;
use hps_soak::orchestrator::{Clock, MonotonicClock, Ticker};
use hps_soak::samplers::{Heartbeat, PoseGuard, ProcMemoryProbe, ResourceSampler};
use hps_soak::{
    APP_NAME, Classifier, ConfigManager, LogIngest, LogSink, RunConfig, RunOutcome, Scenario,
    SoakRunner, SoakSettings, SummaryAggregator, VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "hps-soak")]
#[command(about = "Long-duration soak test for hand tracking + passthrough")]
#[command(version)]
struct CliArgs {
    /// Directory holding `Soak Config.yaml`
    #[arg(long, env = "HPS_SOAK_CONFIG_DIR", default_value = DEFAULT_CONFIG_DIR)]
    config_dir: Utf8PathBuf,

    /// HandOnly, HandPlusDepth, HandPlusRGB or HandPlusRGBAndDepth
    #[arg(long)]
    scenario: Option<Scenario>,

    #[arg(long, value_name = "MINUTES")]
    warmup_minutes: Option<f64>,

    #[arg(long, value_name = "MINUTES")]
    run_minutes: Option<f64>,

    /// Disable periodic soft resets
    #[arg(long)]
    no_soft_reset: bool,

    #[arg(long, value_name = "MINUTES")]
    reset_interval_minutes: Option<f64>,

    /// Feed logcat lines from stdin to the classifier
    /// Use with: adb logcat -v threadtime | hps-soak --ingest-stdin
    #[arg(long)]
    ingest_stdin: bool,

    /// Debug-level operator logging
    #[arg(long)]
    debug: bool,

    /// Print the effective settings as YAML and exit
    #[arg(long)]
    print_config: bool,
}

impl CliArgs {
    fn apply(&self, settings: &mut SoakSettings) {
        if let Some(scenario) = self.scenario {
            settings.scenario = scenario;
        }
        if let Some(minutes) = self.warmup_minutes {
            settings.warmup_minutes = minutes;
        }
        if let Some(minutes) = self.run_minutes {
            settings.run_minutes = minutes;
        }
        if self.no_soft_reset {
            settings.soft_reset_enabled = false;
        }
        if let Some(minutes) = self.reset_interval_minutes {
            settings.soft_reset_interval_minutes = minutes;
        }
        if self.debug {
            settings.debug_mode = true;
        }
    }
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let config_manager = ConfigManager::new(&args.config_dir)?;
    let mut settings = config_manager.load_settings()?;
    args.apply(&mut settings);

    if args.print_config {
        let yaml = serde_yaml_ng::to_string(&settings).context("Failed to serialize settings")?;
        print!("{}", yaml);
        return Ok(());
    }

    let _log_guard = hps_soak::logging::setup_logging_with_console(
        &settings.log_dir,
        APP_NAME,
        settings.debug_mode,
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    if !config_manager.settings_path().exists() {
        tracing::warn!(
            "No settings file at {}, running with defaults",
            config_manager.settings_path()
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("hps-soak-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let result = runtime.block_on(run_soak(settings, args.ingest_stdin));

    // Stdin ingestion may still be parked on a blocking read
    runtime.shutdown_timeout(Duration::from_secs(5));

    match &result {
        Ok(outcome) => tracing::info!("Shutdown complete: {:?}", outcome),
        Err(e) => tracing::error!("Soak run failed: {:#}", e),
    }
    result.map(|_| ())
}

async fn run_soak(settings: SoakSettings, ingest_stdin: bool) -> Result<RunOutcome> {
    let sink = Arc::new(LogSink::new(settings.log_dir.as_str()));
    if let Some(path) = sink.init(&settings.log_prefix) {
        println!("Diagnostic log: {}", path);
    }

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let classifier = Arc::new(Classifier::new(Arc::clone(&sink), Arc::clone(&clock)));

    // The CLI drives the in-process simulated device
    let call_log = Arc::new(CallLog::new());
    let hands: Arc<dyn HandTracking> =
        Arc::new(SimulatedHandTracking::with_call_log(Arc::clone(&call_log)));
    let mut registry = PassthroughRegistry::new();
    registry.register(
        PassthroughBackendKind::Simulated,
        Arc::new(SimulatedPassthrough::with_call_log(call_log)),
    );

    let config = RunConfig::from_settings(&settings);
    let passthrough = PassthroughController::select_with_fallback(
        config.passthrough_backend,
        PassthroughBackendKind::Simulated,
        &registry,
    );

    // Samplers
    let (sampler_tx, sampler_rx) = watch::channel(false);
    let resource_sampler = ResourceSampler::new(
        Arc::clone(&sink),
        Arc::new(ProcMemoryProbe::new()),
        settings.resource_sample_interval(),
    );
    let resource_cache = resource_sampler.cache();
    let mut sampler_tasks = vec![
        Heartbeat::new(Arc::clone(&sink), settings.heartbeat_interval()).spawn(sampler_rx.clone()),
        resource_sampler.spawn(sampler_rx.clone()),
        PoseGuard::new(
            Arc::clone(&classifier),
            Some(Arc::clone(&hands)),
            settings.tick_interval(),
        )
        .spawn(sampler_rx.clone()),
    ];

    if ingest_stdin {
        let ingest = LogIngest::new(Arc::clone(&sink), Arc::clone(&classifier));
        let cancel = sampler_rx.clone();
        sampler_tasks.push(tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            if let Err(e) = ingest.ingest_reader(stdin, cancel).await {
                tracing::warn!("Stdin ingestion stopped: {:#}", e);
            }
        }));
    }

    // Orchestrator
    let runner = Arc::new(
        SoakRunner::new(config, Arc::clone(&sink), Arc::clone(&classifier))
            .with_hand_tracking(Arc::clone(&hands))
            .with_passthrough(passthrough)
            .with_clock(Arc::clone(&clock))
            .with_tick(settings.tick_interval()),
    );
    let mut aggregator = SummaryAggregator::new(
        runner.state().clone(),
        Arc::clone(&classifier),
        Arc::clone(&clock),
        settings.summary_refresh_interval(),
    )
    .with_resources(resource_cache)
    .with_hand_tracking(hands);

    let handle = Arc::clone(&runner).start();
    let mut refresh = Ticker::new(settings.summary_refresh_interval());
    let mut interrupted = false;

    while !handle.is_finished() {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!("Ctrl-C handler unavailable: {}", e);
                } else if interrupted {
                    tracing::warn!("Second Ctrl-C, aborting run");
                    handle.abort();
                } else {
                    tracing::info!("Ctrl-C received, cancelling run");
                    println!("Cancelling... (Ctrl-C again to abort)");
                    interrupted = true;
                    handle.cancel();
                }
            }
            _ = refresh.tick() => {
                if let Some(record) = aggregator.refresh() {
                    println!("{}", record);
                }
            }
        }
    }

    let outcome = handle.join().await;

    let _ = sampler_tx.send(true);
    for task in sampler_tasks {
        if let Err(e) = task.await {
            tracing::error!("Sampler task join error: {}", e);
        }
    }

    classifier.log_summary();
    println!("{}", aggregator.build());
    if let Some(path) = sink.current_path() {
        println!("Diagnostic log: {}", path);
    }

    Ok(outcome?)
}
