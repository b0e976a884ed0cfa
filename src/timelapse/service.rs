//! Daily time-lapse creation
//!
//! At the configured local time the service walks the image tree for the
//! target day (`days_ago` days back) and encodes one video per camera and
//! interval. Jobs run with bounded concurrency; a failed job never stops
//! the others.

use chrono::{Days, Local, NaiveDate, NaiveDateTime, NaiveTime};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{format_duration, format_file_size, EncodeJob, QualitySettings, VideoEncoder};
use crate::config::TimelapseConfig;
use crate::storage::{ImageStore, StorageError};
use crate::types::IntervalSpec;

/// Longest single sleep while waiting for the creation time. The remaining
/// wait is recomputed from the wall clock after each one.
const MAX_WAIT_CHUNK: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Created { path: PathBuf, bytes: u64 },
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CreationSummary {
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl CreationSummary {
    fn add(&mut self, result: &JobResult) {
        match result {
            JobResult::Created { .. } => self.successful += 1,
            JobResult::Failed(_) => self.failed += 1,
            JobResult::Skipped(_) => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.successful + self.failed + self.skipped
    }
}

pub struct TimelapseService {
    config: TimelapseConfig,
    images: ImageStore,
    video_root: PathBuf,
    encoder: Arc<dyn VideoEncoder>,
    quality: QualitySettings,
}

impl TimelapseService {
    pub fn new(
        config: TimelapseConfig,
        images: ImageStore,
        video_root: impl Into<PathBuf>,
        encoder: Arc<dyn VideoEncoder>,
    ) -> Self {
        let quality = QualitySettings::from_config(&config);
        Self {
            config,
            images,
            video_root: video_root.into(),
            encoder,
            quality,
        }
    }

    /// `<video>/YYYY/MM/<camera>/<period>s/<camera>_YYYYMMDD_<period>s.mp4`
    pub fn video_path(&self, camera: &str, interval: IntervalSpec, date: NaiveDate) -> PathBuf {
        let period = interval.period_secs();
        self.video_root
            .join(date.format("%Y").to_string())
            .join(date.format("%m").to_string())
            .join(camera)
            .join(format!("{period}s"))
            .join(format!("{camera}_{}_{period}s.mp4", date.format("%Y%m%d")))
    }

    /// Create the videos for `days_ago` days before today.
    pub async fn create_now(&self, days_ago: u32) -> Result<CreationSummary, StorageError> {
        let date = Local::now()
            .date_naive()
            .checked_sub_days(Days::new(u64::from(days_ago)))
            .unwrap_or_else(|| Local::now().date_naive());
        self.create_for_date(date).await
    }

    /// Encode every camera/interval that has images for `date`.
    pub async fn create_for_date(&self, date: NaiveDate) -> Result<CreationSummary, StorageError> {
        let started = tokio::time::Instant::now();
        info!(%date, "Starting time-lapse creation");

        let mut targets = Vec::new();
        for camera in self.images.camera_dirs().await? {
            for interval in self.images.intervals_for(&camera).await? {
                targets.push((camera.clone(), interval));
            }
        }

        let permits = Arc::new(Semaphore::new(self.config.concurrent_creation.max(1)));
        let jobs = targets.iter().map(|(camera, interval)| {
            let permits = Arc::clone(&permits);
            async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                let result = self.create_one(camera, *interval, date).await;
                (camera, *interval, result)
            }
        });

        let mut summary = CreationSummary::default();
        for (camera, interval, result) in join_all(jobs).await {
            match &result {
                JobResult::Created { path, bytes } => info!(
                    camera = %camera,
                    interval = %interval,
                    path = %path.display(),
                    size = %format_file_size(*bytes),
                    "Time-lapse created"
                ),
                JobResult::Failed(reason) => {
                    error!(camera = %camera, interval = %interval, %reason, "Time-lapse failed");
                }
                JobResult::Skipped(reason) => {
                    debug!(camera = %camera, interval = %interval, %reason, "Time-lapse skipped");
                }
            }
            summary.add(&result);
        }

        info!(
            %date,
            successful = summary.successful,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed = %format_duration(started.elapsed()),
            "Time-lapse creation finished"
        );
        Ok(summary)
    }

    async fn create_one(&self, camera: &str, interval: IntervalSpec, date: NaiveDate) -> JobResult {
        let images_dir = self.images.day_dir(camera, interval, date);
        let prefix = format!("{camera}_");

        match count_images(&images_dir, &prefix).await {
            Ok(0) | Err(_) => return JobResult::Skipped("no images".to_string()),
            Ok(n) => debug!(camera, interval = %interval, images = n, "Encoding"),
        }

        let output = self.video_path(camera, interval, date);
        if !self.config.overwrite && tokio::fs::try_exists(&output).await.unwrap_or(false) {
            return JobResult::Skipped("video exists".to_string());
        }
        if let Some(parent) = output.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return JobResult::Failed(format!("{}: {e}", parent.display()));
            }
        }

        let job = EncodeJob {
            images_dir: images_dir.clone(),
            image_prefix: prefix,
            output,
            frame_rate: self.config.frame_rate,
            quality: self.quality.clone(),
            overwrite: self.config.overwrite,
        };

        match self.encoder.encode(&job).await {
            Ok(video) => {
                if self.config.delete_images_after_success {
                    if let Err(e) = tokio::fs::remove_dir_all(&images_dir).await {
                        warn!(dir = %images_dir.display(), error = %e, "Failed to delete encoded images");
                    }
                }
                JobResult::Created {
                    path: video.path,
                    bytes: video.bytes,
                }
            }
            Err(e) => JobResult::Failed(e.to_string()),
        }
    }

    /// Run once a day at `creation_time` until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let Some(at) = self.config.creation_time() else {
            error!(value = %self.config.creation_time, "Invalid time-lapse creation time, service disabled");
            return;
        };
        info!(at = %at, days_ago = self.config.days_ago, "Time-lapse service started");

        loop {
            let target = next_occurrence(Local::now().naive_local(), at);
            debug!(target = %target, "Waiting for next time-lapse run");
            if !sleep_until_wall(target, || Local::now().naive_local(), &cancel).await {
                break;
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = self.create_now(self.config.days_ago) => {
                    if let Err(e) = result {
                        error!(error = %e, "Time-lapse run failed");
                    }
                }
            }
        }
        info!("Time-lapse service stopped");
    }
}

/// First local occurrence of `at` strictly after `now`.
fn next_occurrence(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let next = now.date().and_time(at);
    if next <= now {
        next + chrono::Duration::days(1)
    } else {
        next
    }
}

/// Sleep until the wall clock reaches `target`, re-reading `now` after every
/// chunk so DST changes and clock steps are honoured. Returns `false` when
/// cancelled.
async fn sleep_until_wall(
    target: NaiveDateTime,
    now: impl Fn() -> NaiveDateTime,
    cancel: &CancellationToken,
) -> bool {
    loop {
        let Ok(remaining) = (target - now()).to_std() else {
            return true;
        };
        if remaining.is_zero() {
            return true;
        }
        tokio::select! {
            () = cancel.cancelled() => return false,
            () = tokio::time::sleep(remaining.min(MAX_WAIT_CHUNK)) => {}
        }
    }
}

async fn count_images(dir: &std::path::Path, prefix: &str) -> std::io::Result<usize> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(prefix) && name.ends_with(".jpg") {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timelapse::{EncodeError, EncodedVideo};
    use crate::types::CameraId;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeEncoder {
        jobs: Mutex<Vec<EncodeJob>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl VideoEncoder for FakeEncoder {
        async fn encode(&self, job: &EncodeJob) -> Result<EncodedVideo, EncodeError> {
            self.jobs.lock().unwrap().push(job.clone());
            if self.fail_for.as_deref() == Some(job.image_prefix.as_str()) {
                return Err(EncodeError::Failed {
                    status: "exit status: 1".into(),
                    stderr: "boom".into(),
                });
            }
            tokio::fs::write(&job.output, b"mp4").await?;
            Ok(EncodedVideo {
                path: job.output.clone(),
                bytes: 3,
                elapsed: Duration::from_millis(1),
            })
        }
    }

    fn iv(p: u64) -> IntervalSpec {
        IntervalSpec::new(p).unwrap()
    }

    async fn seed(store: &ImageStore, camera: &str, interval: u64, ts: u64) -> NaiveDate {
        store
            .save(&CameraId::new(camera), iv(interval), ts, &vec![1u8; 2048])
            .await
            .unwrap();
        crate::storage::local_time(ts).date_naive()
    }

    #[test]
    fn test_video_path_layout() {
        let service = TimelapseService::new(
            TimelapseConfig::default(),
            ImageStore::new("/img"),
            "/vid",
            Arc::new(FakeEncoder::default()),
        );
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(
            service.video_path("Front", iv(60), date),
            PathBuf::from("/vid/2026/03/Front/60s/Front_20260309_60s.mp4")
        );
    }

    #[tokio::test]
    async fn test_creates_one_video_per_camera_interval() {
        let dir = tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("img"));
        let ts = 1_700_000_000;
        let date = seed(&store, "A", 60, ts).await;
        seed(&store, "A", 180, ts).await;
        seed(&store, "B", 60, ts).await;

        let encoder = Arc::new(FakeEncoder::default());
        let service = TimelapseService::new(
            TimelapseConfig::default(),
            store,
            dir.path().join("vid"),
            encoder.clone(),
        );
        let summary = service.create_for_date(date).await.unwrap();
        assert_eq!(summary.successful, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(encoder.jobs.lock().unwrap().len(), 3);
        assert!(service.video_path("A", iv(180), date).exists());
    }

    #[tokio::test]
    async fn test_existing_video_is_skipped_and_failure_isolated() {
        let dir = tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("img"));
        let ts = 1_700_000_000;
        let date = seed(&store, "A", 60, ts).await;
        seed(&store, "B", 60, ts).await;

        let encoder = Arc::new(FakeEncoder {
            fail_for: Some("B_".into()),
            ..Default::default()
        });
        let service = TimelapseService::new(
            TimelapseConfig::default(),
            store,
            dir.path().join("vid"),
            encoder,
        );
        let existing = service.video_path("A", iv(60), date);
        std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
        std::fs::write(&existing, b"old").unwrap();

        let summary = service.create_for_date(date).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.successful, 0);
    }

    #[tokio::test]
    async fn test_delete_images_after_success() {
        let dir = tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("img"));
        let ts = 1_700_000_000;
        let date = seed(&store, "A", 60, ts).await;
        let day_dir = store.day_dir("A", iv(60), date);

        let config = TimelapseConfig {
            delete_images_after_success: true,
            ..Default::default()
        };
        let service = TimelapseService::new(
            config,
            store,
            dir.path().join("vid"),
            Arc::new(FakeEncoder::default()),
        );
        let summary = service.create_for_date(date).await.unwrap();
        assert_eq!(summary.successful, 1);
        assert!(!day_dir.exists());
    }

    #[tokio::test]
    async fn test_empty_tree_creates_nothing() {
        let dir = tempdir().unwrap();
        let service = TimelapseService::new(
            TimelapseConfig::default(),
            ImageStore::new(dir.path().join("missing")),
            dir.path().join("vid"),
            Arc::new(FakeEncoder::default()),
        );
        let summary = service
            .create_for_date(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(summary.total(), 0);
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 29)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_next_occurrence() {
        let one = NaiveTime::from_hms_opt(1, 0, 0).unwrap();
        assert_eq!(next_occurrence(at(0, 30), one), at(1, 0));
        assert_eq!(next_occurrence(at(1, 0), one), at(1, 0) + chrono::Duration::days(1));
        assert_eq!(next_occurrence(at(23, 0), one), at(1, 0) + chrono::Duration::days(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_jump_shortens_wait() {
        let start = tokio::time::Instant::now();
        let base = at(0, 0);
        // Wall clock steps forward 50 minutes once the first chunk has passed.
        let now = move || {
            let elapsed = start.elapsed();
            let jump = if elapsed >= MAX_WAIT_CHUNK {
                chrono::Duration::minutes(50)
            } else {
                chrono::Duration::zero()
            };
            base + chrono::Duration::from_std(elapsed).unwrap() + jump
        };

        let cancel = CancellationToken::new();
        assert!(sleep_until_wall(at(1, 0), now, &cancel).await);
        assert_eq!(start.elapsed(), Duration::from_secs(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_wait_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!sleep_until_wall(at(1, 0), || at(0, 0), &cancel).await);
    }
}
