//! Interval runner
//!
//! One runner per configured interval. On every due tick it takes the current
//! camera set, plans slots, and starts one capture unit per camera. A unit
//! either reuses the donor interval's image for the same tick or captures
//! fresh through the concurrency limiter with bounded retries. Unit failures
//! stay local to the camera; a failed batch never stops the runner.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::clock::{self, unix_now, Tick, TickClock};
use super::limiter::ConcurrencyLimiter;
use super::planner::{self, RatePlan};
use super::registry::{RegistryKey, ReuseRegistry, WaitResult};
use super::slots::{self, SlotPlan};
use crate::config::{CaptureConfig, DistributionConfig, LapseConfig, RateLimitConfig};
use crate::protect::{CameraDirectory, CaptureError, SnapshotClient};
use crate::storage::ImageStore;
use crate::summary::SummaryAggregator;
use crate::types::{
    Camera, CaptureOutcome, CaptureRecord, ImageArtifact, IntervalGraph, IntervalSpec, Quality,
};

// ============================================================================
// Shared Context
// ============================================================================

/// Everything the runners share. Built once at startup.
pub struct RunnerContext {
    pub clock: TickClock,
    pub graph: Arc<IntervalGraph>,
    pub client: Arc<dyn SnapshotClient>,
    pub directory: Arc<CameraDirectory>,
    pub store: ImageStore,
    pub limiter: ConcurrencyLimiter,
    pub registry: Arc<ReuseRegistry>,
    pub summary: Arc<SummaryAggregator>,
    pub capture: CaptureConfig,
    pub rate_limit: RateLimitConfig,
    pub distribution: DistributionConfig,
    pub high_quality: bool,
}

impl RunnerContext {
    /// Wire up the shared state from configuration. The limiter is sized to
    /// the planner's budget, which does not depend on the camera count.
    pub fn from_config(
        config: &LapseConfig,
        clock: TickClock,
        client: Arc<dyn SnapshotClient>,
        directory: Arc<CameraDirectory>,
    ) -> (Arc<Self>, RatePlan) {
        let graph = Arc::new(IntervalGraph::new(&config.capture.intervals));
        let camera_count = directory.due_cameras().map_or(0, |c| c.len());
        let plan = planner::plan(
            camera_count,
            &config.rate_limit,
            &config.distribution,
            &graph,
        );

        let ctx = Self {
            clock,
            summary: Arc::new(SummaryAggregator::new(
                graph.intervals(),
                config.summary.reset_on_emit,
            )),
            graph,
            client,
            directory,
            store: ImageStore::new(&config.output.image_path),
            limiter: ConcurrencyLimiter::new(plan.budget),
            registry: Arc::new(ReuseRegistry::new(config.capture.registry_window())),
            capture: config.capture.clone(),
            rate_limit: config.rate_limit.clone(),
            distribution: config.distribution.clone(),
            high_quality: config.protect.high_quality_snapshots,
        };
        (Arc::new(ctx), plan)
    }

    fn reuse_enabled(&self) -> bool {
        self.capture.optimize_interval_fetching
    }
}

// ============================================================================
// Runner State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Due,
    /// Slots are being started.
    Dispatching,
    /// All units started; waiting for captures, reuse waits and retries.
    WaitingRetries,
    Settled,
}

impl std::fmt::Display for RunnerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerState::Idle => write!(f, "Idle"),
            RunnerState::Due => write!(f, "Due"),
            RunnerState::Dispatching => write!(f, "Dispatching"),
            RunnerState::WaitingRetries => write!(f, "WaitingRetries"),
            RunnerState::Settled => write!(f, "Settled"),
        }
    }
}

/// Result of one due batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub interval: IntervalSpec,
    pub tick: Tick,
    pub slot_plan: SlotPlan,
    pub records: Vec<CaptureRecord>,
    pub elapsed: Duration,
    /// Set when the batch could not run at all.
    pub error: Option<String>,
}

impl BatchReport {
    fn empty(interval: IntervalSpec, tick: Tick, error: Option<String>) -> Self {
        Self {
            interval,
            tick,
            slot_plan: SlotPlan::single(Vec::new()),
            records: Vec::new(),
            elapsed: Duration::ZERO,
            error,
        }
    }

    pub fn successes(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.records
            .iter()
            .filter(|r| !r.outcome.is_success() && !r.outcome.is_skipped())
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_skipped()).count()
    }

    pub fn reused(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_reused()).count()
    }

    pub fn outcome_for(&self, camera: &str) -> Option<&CaptureOutcome> {
        self.records
            .iter()
            .find(|r| r.camera.as_str() == camera)
            .map(|r| &r.outcome)
    }
}

// ============================================================================
// Interval Runner
// ============================================================================

pub struct IntervalRunner {
    interval: IntervalSpec,
    donor: Option<IntervalSpec>,
    is_donor: bool,
    ctx: Arc<RunnerContext>,
    state: RunnerState,
}

impl IntervalRunner {
    pub fn new(interval: IntervalSpec, ctx: Arc<RunnerContext>) -> Self {
        Self {
            donor: ctx.graph.donor_of(interval),
            is_donor: ctx.graph.is_donor(interval),
            interval,
            ctx,
            state: RunnerState::Idle,
        }
    }

    pub fn interval(&self) -> IntervalSpec {
        self.interval
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn is_due(&self, tick: u64) -> bool {
        self.ctx.clock.is_due(self.interval, tick)
    }

    fn transition(&mut self, next: RunnerState) {
        debug!(interval = %self.interval, from = %self.state, to = %next, "Runner state");
        self.state = next;
    }

    /// Consume ticks until cancelled or the tick channel closes.
    pub async fn run(mut self, mut ticks: broadcast::Receiver<Tick>, cancel: CancellationToken) {
        info!(
            interval = %self.interval,
            donor = ?self.donor.map(IntervalSpec::period_secs),
            is_donor = self.is_donor,
            timeout_secs = self.ctx.capture.capture_timeout(self.interval.period_secs()).as_secs(),
            "Interval runner started"
        );

        loop {
            let tick = tokio::select! {
                () = cancel.cancelled() => break,
                r = ticks.recv() => match r {
                    Ok(t) => t,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(interval = %self.interval, skipped = n, "Runner lagged behind tick source");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            if !self.is_due(tick.index) {
                continue;
            }

            let behind = unix_now().saturating_sub(tick.unix_secs);
            if clock::is_stale(behind, self.interval) {
                warn!(
                    interval = %self.interval,
                    tick = tick.index,
                    behind_secs = behind,
                    "Interval is running behind schedule, skipping stale tick"
                );
                continue;
            }

            self.run_batch(tick, &cancel).await;
        }

        self.state = RunnerState::Idle;
        info!(interval = %self.interval, "Interval runner stopped");
    }

    /// Run the batch for `tick` if this interval is due on it.
    pub async fn run_tick(&mut self, tick: Tick, cancel: &CancellationToken) -> Option<BatchReport> {
        if self.is_due(tick.index) {
            Some(self.run_batch(tick, cancel).await)
        } else {
            None
        }
    }

    /// Capture every due camera for `tick`, regardless of due-ness.
    pub async fn run_batch(&mut self, tick: Tick, cancel: &CancellationToken) -> BatchReport {
        let started = Instant::now();
        self.transition(RunnerState::Due);

        let Some(cameras) = self.ctx.directory.due_cameras() else {
            warn!(interval = %self.interval, tick = tick.index, "No camera list yet, skipping batch");
            self.transition(RunnerState::Idle);
            return BatchReport::empty(self.interval, tick, Some("no camera list".to_string()));
        };

        let ids: Vec<_> = cameras.iter().map(|c| c.id.clone()).collect();
        let rate_plan = planner::plan(
            cameras.len(),
            &self.ctx.rate_limit,
            &self.ctx.distribution,
            &self.ctx.graph,
        );
        let slot_plan = slots::assign(&ids, &rate_plan, &self.ctx.distribution);
        if slot_plan.slot_count() > 1 {
            info!(
                interval = %self.interval,
                cameras = cameras.len(),
                slots = slot_plan.slot_count(),
                offset_ms = slot_plan.offset().as_millis(),
                spread_ms = slot_plan.spread().as_millis(),
                "Distributing captures"
            );
        } else {
            debug!(interval = %self.interval, cameras = cameras.len(), "Single-slot batch");
        }

        let reuse_from = self
            .donor
            .filter(|&d| self.ctx.reuse_enabled() && self.ctx.clock.is_due(d, tick.index));
        let publish_as = (self.is_donor && self.ctx.reuse_enabled()).then_some(self.interval);

        if let Some(donor) = publish_as {
            for cam in &cameras {
                self.ctx
                    .registry
                    .begin(&RegistryKey::new(cam.id.clone(), tick.index, donor));
            }
        }

        self.transition(RunnerState::Dispatching);
        let deadline = started + Duration::from_secs(self.interval.period_secs());
        let mut units: JoinSet<CaptureRecord> = JoinSet::new();
        let mut records = Vec::with_capacity(cameras.len());

        'slots: for (slot_index, slot) in slot_plan.slots().iter().enumerate() {
            let slot_start = started + slot_plan.start_offset(slot_index);
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    for id in slot_plan.slots()[slot_index..].iter().flatten() {
                        if let Some(donor) = publish_as {
                            self.ctx.registry.publish_failed(
                                &RegistryKey::new(id.clone(), tick.index, donor),
                                "shutdown",
                            );
                        }
                        let record = CaptureRecord {
                            camera: id.clone(),
                            interval: self.interval,
                            tick: tick.index,
                            outcome: CaptureOutcome::Skipped { reason: "shutdown".to_string() },
                            elapsed: Duration::ZERO,
                        };
                        self.ctx.summary.record(&record);
                        records.push(record);
                    }
                    break 'slots;
                }
                () = tokio::time::sleep_until(slot_start) => {}
            }

            for id in slot {
                let Some(camera) = cameras.iter().find(|c| &c.id == id).cloned() else {
                    continue;
                };
                let job = UnitJob {
                    camera,
                    interval: self.interval,
                    tick,
                    reuse_from,
                    publish_as,
                    deadline,
                };
                let ctx = Arc::clone(&self.ctx);
                let cancel = cancel.clone();
                units.spawn(async move { run_unit(ctx, job, cancel).await });
            }
        }

        self.transition(RunnerState::WaitingRetries);
        while let Some(res) = units.join_next().await {
            match res {
                Ok(record) => records.push(record),
                Err(e) => warn!(interval = %self.interval, error = %e, "Capture unit panicked"),
            }
        }

        self.transition(RunnerState::Settled);
        records.sort_by(|a, b| a.camera.cmp(&b.camera));
        let report = BatchReport {
            interval: self.interval,
            tick,
            slot_plan,
            records,
            elapsed: started.elapsed(),
            error: None,
        };

        let failures = report.failures();
        if failures > 0 && failures == report.records.len() {
            warn!(
                interval = %self.interval,
                tick = tick.index,
                cameras = report.records.len(),
                "Every capture in the batch failed"
            );
        }
        info!(
            interval = %self.interval,
            tick = tick.index,
            cameras = report.records.len(),
            ok = report.successes(),
            failed = failures,
            skipped = report.skipped(),
            reused = report.reused(),
            elapsed_ms = report.elapsed.as_millis(),
            "Batch settled"
        );

        self.transition(RunnerState::Idle);
        report
    }
}

// ============================================================================
// Capture Unit
// ============================================================================

struct UnitJob {
    camera: Camera,
    interval: IntervalSpec,
    tick: Tick,
    /// Donor interval to wait for on this tick.
    reuse_from: Option<IntervalSpec>,
    /// Publish this unit's result under this donor interval.
    publish_as: Option<IntervalSpec>,
    /// No new request or retry starts after this instant.
    deadline: Instant,
}

enum FreshResult {
    Captured { artifact: ImageArtifact, attempts: u32 },
    Failed { attempts: u32, reason: String },
}

/// Retry bookkeeping for one fresh capture.
#[derive(Debug)]
struct Attempt {
    requests: u32,
    retries_used: u32,
    quality: Quality,
    downgraded: bool,
}

async fn run_unit(ctx: Arc<RunnerContext>, job: UnitJob, cancel: CancellationToken) -> CaptureRecord {
    let started = Instant::now();
    let outcome = unit_outcome(&ctx, &job, &cancel).await;

    if let Some(donor) = job.publish_as {
        let key = RegistryKey::new(job.camera.id.clone(), job.tick.index, donor);
        match outcome.artifact() {
            Some(artifact) => ctx.registry.publish_ready(&key, artifact.clone()),
            None => ctx.registry.publish_failed(&key, outcome.label()),
        };
    }

    let record = CaptureRecord {
        camera: job.camera.id.clone(),
        interval: job.interval,
        tick: job.tick.index,
        outcome,
        elapsed: started.elapsed(),
    };
    ctx.summary.record(&record);

    match &record.outcome {
        CaptureOutcome::FreshFailure { attempts, reason }
        | CaptureOutcome::ReusedFallbackFailure { attempts, reason } => warn!(
            camera = %record.camera,
            interval = %record.interval,
            attempts,
            reason = %reason,
            "✗ Capture failed"
        ),
        other => debug!(
            camera = %record.camera,
            interval = %record.interval,
            outcome = other.label(),
            elapsed_ms = record.elapsed.as_millis(),
            "✓ Capture"
        ),
    }
    record
}

async fn unit_outcome(ctx: &RunnerContext, job: &UnitJob, cancel: &CancellationToken) -> CaptureOutcome {
    let camera = match ctx.directory.get(&job.camera.id) {
        Some(c) if c.connected => c,
        Some(_) => {
            return CaptureOutcome::Skipped {
                reason: "camera went offline".to_string(),
            }
        }
        None => {
            return CaptureOutcome::Skipped {
                reason: "camera no longer discovered".to_string(),
            }
        }
    };

    let Some(donor) = job.reuse_from else {
        return match capture_fresh(ctx, &camera, job, cancel).await {
            FreshResult::Captured { artifact, attempts } => {
                CaptureOutcome::FreshSuccess { artifact, attempts }
            }
            FreshResult::Failed { attempts, reason } => {
                CaptureOutcome::FreshFailure { attempts, reason }
            }
        };
    };

    let key = RegistryKey::new(camera.id.clone(), job.tick.index, donor);
    let wait = ctx
        .capture
        .reuse_wait_timeout()
        .min(job.deadline.saturating_duration_since(Instant::now()));

    let fallback_reason = match ctx.registry.await_ready(&key, wait, cancel).await {
        WaitResult::Ready(source) => {
            match ctx
                .store
                .copy_from(&source, &camera.id, job.interval, job.tick.unix_secs)
                .await
            {
                Ok(artifact) => return CaptureOutcome::ReusedSuccess { artifact },
                Err(e) => format!("copy from donor failed: {e}"),
            }
        }
        WaitResult::Failed(reason) => format!("donor failed: {reason}"),
        WaitResult::TimedOut => "donor wait timed out".to_string(),
        WaitResult::Cancelled => {
            return CaptureOutcome::Skipped {
                reason: "shutdown".to_string(),
            }
        }
    };

    debug!(
        camera = %camera.id,
        interval = %job.interval,
        donor = %donor,
        reason = %fallback_reason,
        "Reuse unavailable, capturing fresh"
    );

    match capture_fresh(ctx, &camera, job, cancel).await {
        FreshResult::Captured { artifact, attempts } => {
            CaptureOutcome::ReusedFallbackSuccess { artifact, attempts }
        }
        FreshResult::Failed { attempts, reason } => CaptureOutcome::ReusedFallbackFailure {
            attempts,
            reason: format!("{reason} ({fallback_reason})"),
        },
    }
}

/// Request a snapshot through the limiter, retrying transient errors.
///
/// A quality rejection drops to standard quality once and does not use up a
/// retry. Every wait is bounded by the unit deadline and by `cancel`.
async fn capture_fresh(
    ctx: &RunnerContext,
    camera: &Camera,
    job: &UnitJob,
    cancel: &CancellationToken,
) -> FreshResult {
    let per_request = ctx.capture.capture_timeout(job.interval.period_secs());
    let mut attempt = Attempt {
        requests: 0,
        retries_used: 0,
        quality: camera.preferred_quality(ctx.high_quality),
        downgraded: false,
    };

    loop {
        let permit = match tokio::time::timeout_at(job.deadline, ctx.limiter.acquire(cancel)).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                return FreshResult::Failed {
                    attempts: attempt.requests,
                    reason: "shutdown".to_string(),
                }
            }
            Err(_) => {
                return FreshResult::Failed {
                    attempts: attempt.requests,
                    reason: "no request slot before deadline".to_string(),
                }
            }
        };

        attempt.requests += 1;
        let request_deadline = (Instant::now() + per_request).min(job.deadline);
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return FreshResult::Failed {
                    attempts: attempt.requests,
                    reason: "shutdown".to_string(),
                };
            }
            r = tokio::time::timeout_at(request_deadline, ctx.client.capture(camera, attempt.quality)) => {
                r.unwrap_or(Err(CaptureError::Timeout))
            }
        };
        drop(permit);

        let error = match result {
            Ok(bytes) => {
                return match ctx
                    .store
                    .save(&camera.id, job.interval, job.tick.unix_secs, &bytes)
                    .await
                {
                    Ok(artifact) => FreshResult::Captured {
                        artifact,
                        attempts: attempt.requests,
                    },
                    Err(e) => FreshResult::Failed {
                        attempts: attempt.requests,
                        reason: e.to_string(),
                    },
                };
            }
            Err(CaptureError::UnsupportedQuality(q)) if q == Quality::High && !attempt.downgraded => {
                warn!(camera = %camera.id, "High-quality snapshot rejected, using standard quality");
                attempt.quality = Quality::Standard;
                attempt.downgraded = true;
                continue;
            }
            Err(e) => e,
        };

        if !error.is_transient() || attempt.retries_used >= ctx.capture.max_retries {
            return FreshResult::Failed {
                attempts: attempt.requests,
                reason: error.to_string(),
            };
        }

        let resume_at = Instant::now() + ctx.capture.retry_delay();
        if resume_at >= job.deadline {
            return FreshResult::Failed {
                attempts: attempt.requests,
                reason: format!("{error} (no time left to retry)"),
            };
        }

        attempt.retries_used += 1;
        debug!(
            camera = %camera.id,
            interval = %job.interval,
            retry = attempt.retries_used,
            max_retries = ctx.capture.max_retries,
            error = %error,
            "Retrying capture"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return FreshResult::Failed {
                    attempts: attempt.requests,
                    reason: "shutdown".to_string(),
                };
            }
            () = tokio::time::sleep_until(resume_at) => {}
        }
    }
}
