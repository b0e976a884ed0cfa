//! camlapse - interval snapshot capture and time-lapse creation
//!
//! # Usage
//!
//! ```bash
//! # Capture continuously (default)
//! camlapse --config /etc/camlapse/camlapse.toml
//!
//! # One capture round for every interval, then exit
//! camlapse once
//!
//! # Encode yesterday's videos now
//! camlapse timelapse --days-ago 1
//!
//! # Validate and print the effective configuration
//! camlapse check-config
//! ```
//!
//! # Environment Variables
//!
//! - `CAMLAPSE_CONFIG`: Path to the TOML config file
//! - `CAMLAPSE_PROTECT_API_KEY`: Protect integration API key
//! - `CAMLAPSE_PROTECT_HOST`: Protect console host
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use camlapse::background::{DiscoveryHealthCheck, DiskHealthCheck, HealthCheck, HealthMonitor, LimiterHealthCheck};
use camlapse::config::{self, defaults, validation, LapseConfig};
use camlapse::protect::{CameraDirectory, CameraSource, ProtectClient, SnapshotClient};
use camlapse::scheduling::{clock::unix_now, IntervalRunner, RatePlan, RunnerContext, TickClock};
use camlapse::storage::{ImageStore, ProcessLock};
use camlapse::timelapse::{FfmpegEncoder, TimelapseService};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "camlapse")]
#[command(about = "Interval snapshot capture and daily time-lapse creation")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "CAMLAPSE_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Capture continuously until interrupted (default)
    Run,
    /// Run one capture batch for every interval and exit
    Once,
    /// Create time-lapse videos now and exit
    Timelapse {
        /// Which day to encode, counted back from today
        #[arg(long)]
        days_ago: Option<u32>,
    },
    /// Validate the configuration and print it
    CheckConfig,
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    Clock,
    Runner(u64),
    RegistryPurger,
    CameraRefresh,
    Summary,
    Timelapse,
    HealthMonitor,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::Clock => write!(f, "Clock"),
            TaskName::Runner(period) => write!(f, "Runner[{period}s]"),
            TaskName::RegistryPurger => write!(f, "RegistryPurger"),
            TaskName::CameraRefresh => write!(f, "CameraRefresh"),
            TaskName::Summary => write!(f, "Summary"),
            TaskName::Timelapse => write!(f, "Timelapse"),
            TaskName::HealthMonitor => write!(f, "HealthMonitor"),
        }
    }
}

// ============================================================================
// Setup
// ============================================================================

fn load_config(args: &CliArgs) -> Result<LapseConfig> {
    let config = match &args.config {
        Some(path) => {
            let mut cfg = LapseConfig::load_from_file(path)?;
            cfg.apply_env_overrides();
            cfg.validate()?;
            cfg
        }
        None => LapseConfig::load()?,
    };
    for warning in validation::plausibility_warnings(&config) {
        warn!(field = %warning.field, "{}", warning);
    }
    Ok(config)
}

struct Core {
    client: Arc<ProtectClient>,
    directory: Arc<CameraDirectory>,
    ctx: Arc<RunnerContext>,
    plan: RatePlan,
}

async fn init_core(config: &LapseConfig) -> Result<Core> {
    let client = Arc::new(ProtectClient::new(&config.protect).context("Failed to build Protect HTTP client")?);
    info!("📡 Protect: {}", client.base_url());

    let directory = Arc::new(CameraDirectory::new(config.cameras.clone()));
    match directory.refresh(client.as_ref()).await {
        Ok(count) => info!("📷 Cameras: {} selected", count),
        Err(e) => warn!("📷 Initial camera discovery failed, will retry: {}", e),
    }

    let clock = TickClock::starting_now(config.capture.top_of_the_minute);
    let (ctx, plan) = RunnerContext::from_config(
        config,
        clock,
        Arc::clone(&client) as Arc<dyn SnapshotClient>,
        Arc::clone(&directory),
    );

    info!(
        cameras = plan.camera_count,
        budget = plan.budget,
        effective_rate = plan.effective_rate,
        simultaneous_intervals = plan.max_simultaneous_intervals,
        distribute = plan.distribute,
        "⚙️  Rate plan"
    );
    if plan.exceeds_limit {
        warn!(
            "Concurrency budget {} x {} intervals exceeds {} req/s",
            plan.budget, plan.max_simultaneous_intervals, config.rate_limit.requests_per_second
        );
    }
    if config.capture.optimize_interval_fetching {
        for (consumer, donor) in ctx.graph.pairs() {
            info!("♻️  {} reuses images from {}", consumer, donor);
        }
    }

    Ok(Core {
        client,
        directory,
        ctx,
        plan,
    })
}

fn timelapse_service(config: &LapseConfig) -> TimelapseService {
    TimelapseService::new(
        config.timelapse.clone(),
        ImageStore::new(&config.output.image_path),
        &config.output.video_path,
        Arc::new(FfmpegEncoder::new(config.timelapse.ffmpeg_binary.clone())),
    )
}

// ============================================================================
// Supervisor
// ============================================================================

async fn run_supervisor(task_set: &mut JoinSet<Result<TaskName>>, cancel_token: CancellationToken) -> Result<()> {
    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("🛑 Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("🔒 Supervisor: Task {} completed", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("🔒 Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("🔒 Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {e}"));
                    }
                    None => {
                        info!("🔒 Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let in-flight batches record their shutdown outcomes.
    let drain = async { while task_set.join_next().await.is_some() {} };
    if tokio::time::timeout(Duration::from_secs(10), drain).await.is_err() {
        warn!("🔒 Supervisor: Tasks still running after 10s, aborting");
        task_set.abort_all();
    }
    Ok(())
}

// ============================================================================
// Modes
// ============================================================================

async fn run_service(config: &LapseConfig, cancel_token: CancellationToken) -> Result<()> {
    let _lock = ProcessLock::acquire(&config.output.image_path)?;
    let core = init_core(config).await?;
    let ctx = Arc::clone(&core.ctx);

    info!("🚀 Starting capture for intervals: {:?}", config.capture.intervals);
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    let (tick_tx, _) = broadcast::channel(64);

    for &interval in ctx.graph.intervals() {
        let runner = IntervalRunner::new(interval, Arc::clone(&ctx));
        let ticks = tick_tx.subscribe();
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            runner.run(ticks, cancel).await;
            Ok(TaskName::Runner(interval.period_secs()))
        });
    }

    let clock = ctx.clock;
    let cancel = cancel_token.clone();
    task_set.spawn(async move {
        clock.run(tick_tx, cancel).await;
        Ok(TaskName::Clock)
    });

    let registry = Arc::clone(&ctx.registry);
    let cancel = cancel_token.clone();
    task_set.spawn(async move {
        registry.run_purger(cancel).await;
        Ok(TaskName::RegistryPurger)
    });

    let directory = Arc::clone(&core.directory);
    let source = Arc::clone(&core.client) as Arc<dyn CameraSource>;
    let refresh_every = Duration::from_secs(config.cameras.refresh_interval_secs);
    let cancel = cancel_token.clone();
    task_set.spawn(async move {
        directory.run(source, refresh_every, cancel).await;
        Ok(TaskName::CameraRefresh)
    });

    if config.summary.enabled {
        let summary = Arc::clone(&ctx.summary);
        let summary_config = config.summary.clone();
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            summary.run(summary_config, cancel).await;
            Ok(TaskName::Summary)
        });
    }

    if config.timelapse.enabled {
        let service = timelapse_service(config);
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            service.run(cancel).await;
            Ok(TaskName::Timelapse)
        });
    }

    let checks: Vec<Box<dyn HealthCheck>> = vec![
        Box::new(DiscoveryHealthCheck::new(
            Arc::clone(&core.directory),
            Arc::clone(&core.client) as Arc<dyn CameraSource>,
            refresh_every,
        )),
        Box::new(DiskHealthCheck::new(&config.output.image_path)),
        Box::new(LimiterHealthCheck::new(ctx.limiter.clone())),
    ];
    let monitor = HealthMonitor::new(checks, Duration::from_secs(defaults::HEALTH_CHECK_INTERVAL_SECS));
    let cancel = cancel_token.clone();
    task_set.spawn(async move {
        monitor.run(cancel).await;
        Ok(TaskName::HealthMonitor)
    });

    run_supervisor(&mut task_set, cancel_token).await
}

async fn run_once(config: &LapseConfig, cancel_token: CancellationToken) -> Result<()> {
    let _lock = ProcessLock::acquire(&config.output.image_path)?;
    let core = init_core(config).await?;
    if core.plan.camera_count == 0 {
        warn!("No cameras selected, nothing to capture");
        return Ok(());
    }

    let tick = core.ctx.clock.tick_at(unix_now());
    let mut runners: Vec<IntervalRunner> = core
        .ctx
        .graph
        .intervals()
        .iter()
        .map(|&interval| IntervalRunner::new(interval, Arc::clone(&core.ctx)))
        .collect();

    let reports = join_all(runners.iter_mut().map(|r| r.run_batch(tick, &cancel_token))).await;
    for report in &reports {
        info!(
            interval = %report.interval,
            successes = report.successes(),
            failures = report.failures(),
            skipped = report.skipped(),
            reused = report.reused(),
            elapsed_ms = report.elapsed.as_millis(),
            "Batch finished"
        );
    }
    core.ctx.summary.emit().log();
    Ok(())
}

async fn run_timelapse(config: &LapseConfig, days_ago: Option<u32>) -> Result<()> {
    let encoder = FfmpegEncoder::new(config.timelapse.ffmpeg_binary.clone());
    let version = encoder
        .version()
        .await
        .with_context(|| format!("ffmpeg not available at '{}'", config.timelapse.ffmpeg_binary))?;
    info!("🎞️  Encoder: {}", version);

    let summary = timelapse_service(config)
        .create_now(days_ago.unwrap_or(config.timelapse.days_ago))
        .await?;
    if summary.failed > 0 {
        anyhow::bail!("{} of {} time-lapse videos failed", summary.failed, summary.total());
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }

    let lapse_config = load_config(&args).context("Invalid configuration")?;

    if matches!(args.command, Some(SubCommand::CheckConfig)) {
        println!("{}", lapse_config.to_toml()?);
        println!("# configuration OK");
        return Ok(());
    }

    config::init(lapse_config);
    let config = config::get();

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  camlapse {}", env!("CARGO_PKG_VERSION"));
    info!("  Interval snapshots and daily time-lapse videos");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("📁 Images: {}", config.output.image_path.display());
    info!("📁 Videos: {}", config.output.video_path.display());

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    match args.command {
        None | Some(SubCommand::Run) => run_service(config, cancel_token).await?,
        Some(SubCommand::Once) => run_once(config, cancel_token).await?,
        Some(SubCommand::Timelapse { days_ago }) => run_timelapse(config, days_ago).await?,
        Some(SubCommand::CheckConfig) => {}
    }

    info!("✓ camlapse shutdown complete");
    Ok(())
}
