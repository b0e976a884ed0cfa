//! Capture statistics
//!
//! Every capture unit records its outcome here; a periodic task turns the
//! counters into a per-interval, per-camera success report.

use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::SummaryConfig;
use crate::types::{CameraId, CaptureRecord, IntervalSpec};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counters {
    /// Units that ran (one per camera per due tick); skips excluded.
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    /// Shutdown or camera gone before capture.
    pub skipped: u64,
    pub reused: u64,
    pub fallbacks: u64,
    /// Requests actually sent to the console.
    pub requests: u64,
    pub total_time: Duration,
    pub last_success: Option<DateTime<Local>>,
}

impl Counters {
    fn add(&mut self, record: &CaptureRecord, at: DateTime<Local>) {
        if record.outcome.is_skipped() {
            self.skipped += 1;
            return;
        }
        self.attempts += 1;
        if record.outcome.is_success() {
            self.successes += 1;
            self.last_success = Some(self.last_success.map_or(at, |prev| prev.max(at)));
        } else {
            self.failures += 1;
        }
        if record.outcome.is_reused() {
            self.reused += 1;
        }
        if record.outcome.is_fallback() {
            self.fallbacks += 1;
        }
        self.requests += u64::from(record.outcome.requests());
        self.total_time += record.elapsed;
    }

    fn merge(&mut self, other: &Counters) {
        self.attempts += other.attempts;
        self.successes += other.successes;
        self.failures += other.failures;
        self.skipped += other.skipped;
        self.reused += other.reused;
        self.fallbacks += other.fallbacks;
        self.requests += other.requests;
        self.total_time += other.total_time;
        self.last_success = match (self.last_success, other.last_success) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64 * 100.0
        }
    }

    pub fn average_time(&self) -> Duration {
        u32::try_from(self.attempts)
            .ok()
            .filter(|&n| n > 0)
            .map_or(Duration::ZERO, |n| self.total_time / n)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntervalSummary {
    pub interval: IntervalSpec,
    pub totals: Counters,
    pub cameras: BTreeMap<CameraId, Counters>,
}

/// One emitted report.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryReport {
    /// Time covered by the counters.
    pub window: Duration,
    pub intervals: Vec<IntervalSummary>,
}

impl SummaryReport {
    pub fn interval(&self, interval: IntervalSpec) -> Option<&IntervalSummary> {
        self.intervals.iter().find(|s| s.interval == interval)
    }

    /// Write the report as info lines.
    pub fn log(&self) {
        #[allow(clippy::cast_precision_loss)]
        let minutes = self.window.as_secs_f64() / 60.0;
        info!("━━━ Capture summary (last {:.1} minutes) ━━━", minutes);
        for s in &self.intervals {
            let t = &s.totals;
            if t.attempts == 0 {
                info!(interval = %s.interval, skipped = t.skipped, "No captures");
                continue;
            }
            let last = t
                .last_success
                .map_or_else(|| "never".to_string(), |d| d.format("%H:%M:%S").to_string());
            info!(
                interval = %s.interval,
                successes = t.successes,
                attempts = t.attempts,
                skipped = t.skipped,
                success_pct = %format!("{:.1}", t.success_rate()),
                reused = t.reused,
                fallbacks = t.fallbacks,
                requests = t.requests,
                avg_ms = t.average_time().as_millis(),
                last_success = %last,
                "Interval summary"
            );
            for (camera, c) in &s.cameras {
                if c.failures > 0 {
                    info!(
                        interval = %s.interval,
                        camera = %camera,
                        successes = c.successes,
                        attempts = c.attempts,
                        success_pct = %format!("{:.1}", c.success_rate()),
                        "Camera with failures"
                    );
                }
            }
        }
    }
}

#[derive(Debug)]
struct Window {
    counters: BTreeMap<(IntervalSpec, CameraId), Counters>,
    started: Instant,
}

/// Thread-safe counter table. `record` only takes a short lock.
#[derive(Debug)]
pub struct SummaryAggregator {
    window: Mutex<Window>,
    intervals: Vec<IntervalSpec>,
    reset_on_emit: bool,
}

impl SummaryAggregator {
    /// `intervals` fixes the report order and lists intervals with no data.
    pub fn new(intervals: &[IntervalSpec], reset_on_emit: bool) -> Self {
        let mut intervals = intervals.to_vec();
        intervals.sort_unstable();
        intervals.dedup();
        Self {
            window: Mutex::new(Window {
                counters: BTreeMap::new(),
                started: Instant::now(),
            }),
            intervals,
            reset_on_emit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        self.window
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn record(&self, record: &CaptureRecord) {
        let at = Local::now();
        let mut window = self.lock();
        window
            .counters
            .entry((record.interval, record.camera.clone()))
            .or_default()
            .add(record, at);
    }

    /// Counters for one camera and interval in the current window.
    pub fn counters(&self, interval: IntervalSpec, camera: &CameraId) -> Option<Counters> {
        self.lock()
            .counters
            .get(&(interval, camera.clone()))
            .cloned()
    }

    /// Build a report of the current window, resetting it if configured.
    pub fn emit(&self) -> SummaryReport {
        let now = Instant::now();
        let (counters, started) = {
            let mut window = self.lock();
            let started = window.started;
            if self.reset_on_emit {
                window.started = now;
                (std::mem::take(&mut window.counters), started)
            } else {
                (window.counters.clone(), started)
            }
        };

        let mut by_interval: BTreeMap<IntervalSpec, IntervalSummary> = self
            .intervals
            .iter()
            .map(|&i| {
                (
                    i,
                    IntervalSummary {
                        interval: i,
                        totals: Counters::default(),
                        cameras: BTreeMap::new(),
                    },
                )
            })
            .collect();

        for ((interval, camera), c) in counters {
            let entry = by_interval
                .entry(interval)
                .or_insert_with(|| IntervalSummary {
                    interval,
                    totals: Counters::default(),
                    cameras: BTreeMap::new(),
                });
            entry.totals.merge(&c);
            entry.cameras.insert(camera, c);
        }

        SummaryReport {
            window: now.saturating_duration_since(started),
            intervals: by_interval.into_values().collect(),
        }
    }

    /// Emit and log a report every `interval_secs` until cancelled.
    pub async fn run(&self, config: SummaryConfig, cancel: CancellationToken) {
        let period = Duration::from_secs(config.interval_secs.max(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = config.interval_secs, "Summary reporter started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    self.emit().log();
                    return;
                }
                _ = ticker.tick() => self.emit().log(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CaptureOutcome, ImageArtifact};
    use std::path::PathBuf;

    fn iv(p: u64) -> IntervalSpec {
        IntervalSpec::new(p).unwrap()
    }

    fn rec(camera: &str, interval: u64, outcome: CaptureOutcome) -> CaptureRecord {
        CaptureRecord {
            camera: CameraId::new(camera),
            interval: iv(interval),
            tick: 60,
            outcome,
            elapsed: Duration::from_millis(200),
        }
    }

    fn ok() -> CaptureOutcome {
        CaptureOutcome::FreshSuccess {
            artifact: ImageArtifact {
                path: PathBuf::from("x.jpg"),
                bytes: 5000,
            },
            attempts: 1,
        }
    }

    #[tokio::test]
    async fn test_success_rate_per_interval_and_camera() {
        let agg = SummaryAggregator::new(&[iv(60), iv(180)], true);
        agg.record(&rec("A", 60, ok()));
        agg.record(&rec("A", 60, ok()));
        agg.record(&rec(
            "B",
            60,
            CaptureOutcome::FreshFailure {
                attempts: 4,
                reason: "timeout".into(),
            },
        ));
        agg.record(&rec(
            "A",
            180,
            CaptureOutcome::ReusedSuccess {
                artifact: ImageArtifact {
                    path: PathBuf::from("y.jpg"),
                    bytes: 5000,
                },
            },
        ));

        let report = agg.emit();
        let s60 = report.interval(iv(60)).unwrap();
        assert_eq!(s60.totals.attempts, 3);
        assert_eq!(s60.totals.successes, 2);
        assert_eq!(s60.totals.requests, 6);
        assert!((s60.totals.success_rate() - 66.666).abs() < 0.01);
        assert_eq!(s60.cameras[&CameraId::new("B")].failures, 1);

        let s180 = report.interval(iv(180)).unwrap();
        assert_eq!(s180.totals.reused, 1);
        assert_eq!(s180.totals.requests, 0);
        assert_eq!(s180.totals.average_time(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_skips_do_not_lower_success_rate() {
        let agg = SummaryAggregator::new(&[iv(60)], true);
        agg.record(&rec("A", 60, ok()));
        agg.record(&rec(
            "A",
            60,
            CaptureOutcome::Skipped {
                reason: "shutdown".into(),
            },
        ));
        agg.record(&rec(
            "B",
            60,
            CaptureOutcome::Skipped {
                reason: "camera no longer discovered".into(),
            },
        ));

        let totals = agg.emit().interval(iv(60)).unwrap().totals.clone();
        assert_eq!(totals.attempts, 1);
        assert_eq!(totals.successes, 1);
        assert_eq!(totals.failures, 0);
        assert_eq!(totals.skipped, 2);
        assert_eq!(totals.success_rate(), 100.0);
        assert_eq!(totals.average_time(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_reset_on_emit() {
        let agg = SummaryAggregator::new(&[iv(60)], true);
        agg.record(&rec("A", 60, ok()));
        assert_eq!(agg.emit().interval(iv(60)).unwrap().totals.attempts, 1);
        assert_eq!(agg.emit().interval(iv(60)).unwrap().totals.attempts, 0);
    }

    #[tokio::test]
    async fn test_keep_counters_without_reset() {
        let agg = SummaryAggregator::new(&[iv(60)], false);
        agg.record(&rec("A", 60, ok()));
        agg.emit();
        agg.record(&rec("A", 60, ok()));
        assert_eq!(agg.emit().interval(iv(60)).unwrap().totals.attempts, 2);
    }

    #[tokio::test]
    async fn test_empty_interval_listed() {
        let agg = SummaryAggregator::new(&[iv(60), iv(3600)], true);
        let report = agg.emit();
        assert_eq!(report.intervals.len(), 2);
        assert_eq!(report.interval(iv(3600)).unwrap().totals.success_rate(), 0.0);
    }
}
