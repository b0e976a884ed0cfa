//! camlapse: interval snapshot capture for UniFi Protect cameras
//!
//! Captures still images from every selected camera at several fixed
//! intervals and assembles them into daily time-lapse videos.
//!
//! ## Architecture
//!
//! - **Tick clock**: one logical tick per second, broadcast to all runners
//! - **Interval runners**: one per configured interval; dispatch due batches
//!   in staggered slots under a shared request limiter
//! - **Reuse registry**: lets a longer interval reuse the image a shorter,
//!   dividing interval captured for the same tick
//! - **Summary aggregator**: per-interval, per-camera success statistics
//! - **Time-lapse service**: daily ffmpeg encoding of the captured images

pub mod background;
pub mod config;
pub mod protect;
pub mod scheduling;
pub mod storage;
pub mod summary;
pub mod timelapse;
pub mod types;

pub use config::LapseConfig;

pub use types::{
    Camera, CameraId, CaptureOutcome, CaptureRecord, ImageArtifact, IntervalGraph, IntervalSpec, Quality,
};

pub use scheduling::{
    BatchReport, ConcurrencyLimiter, IntervalRunner, RatePlan, ReuseRegistry, RunnerContext, SlotPlan,
    Tick, TickClock,
};

pub use protect::{CameraDirectory, CameraSource, CaptureError, ProtectClient, SnapshotClient};

pub use summary::{SummaryAggregator, SummaryReport};

pub use timelapse::{FfmpegEncoder, TimelapseService, VideoEncoder};
