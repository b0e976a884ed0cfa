//! System-wide default constants.
//!
//! Values used when a config file omits a key, plus fixed limits that are not
//! worth exposing as configuration. Grouped by subsystem.

// ============================================================================
// Protect API
// ============================================================================

/// Default Protect console host.
pub const PROTECT_HOST: &str = "unifi.local";

/// Default HTTPS port of the Protect integration API.
pub const PROTECT_PORT: u16 = 443;

/// Path prefix of the Protect integration API.
pub const PROTECT_API_PATH: &str = "/proxy/protect/integration/v1";

/// Upper bound for a single HTTP request to the console (seconds).
pub const PROTECT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Snapshots smaller than this are treated as corrupt (bytes).
pub const MIN_SNAPSHOT_BYTES: usize = 1_000;

// ============================================================================
// Cameras
// ============================================================================

/// How often the camera list is re-discovered (seconds).
pub const CAMERA_REFRESH_INTERVAL_SECS: u64 = 300;

// ============================================================================
// Capture
// ============================================================================

/// Default capture intervals (seconds).
pub const CAPTURE_INTERVALS_SECS: &[u64] = &[60, 180, 900, 3_600, 86_400];

/// Retries after the first failed capture attempt.
pub const MAX_RETRIES: u32 = 3;

/// Pause between capture retries (seconds).
pub const RETRY_DELAY_SECS: u64 = 2;

/// Share of an interval a capture may take before it is abandoned.
pub const TIMEOUT_PERCENTAGE: f64 = 0.8;

/// Lower bound for the per-capture deadline (seconds).
pub const MIN_CAPTURE_TIMEOUT_SECS: u64 = 5;

/// How long a consumer interval waits for its donor's image (seconds).
pub const REUSE_WAIT_TIMEOUT_SECS: u64 = 30;

/// Retention window of reuse registry entries (seconds).
pub const REGISTRY_WINDOW_SECS: u64 = 120;

// ============================================================================
// Rate Limit & Distribution
// ============================================================================

/// External rate limit of the Protect API (requests per second).
pub const REQUESTS_PER_SECOND: f64 = 10.0;

/// Fraction of the external limit the scheduler plans against.
pub const SAFETY_BUFFER: f64 = 0.8;

/// Camera count above which distribution is considered.
pub const DISTRIBUTION_MIN_CAMERAS: usize = 10;

/// Window across which adaptive distribution spreads slots (seconds).
pub const DISTRIBUTION_WINDOW_SECS: f64 = 1.0;

/// Smallest adaptive slot offset (seconds).
pub const DISTRIBUTION_MIN_OFFSET_SECS: f64 = 0.05;

/// Largest adaptive slot offset (seconds).
pub const DISTRIBUTION_MAX_OFFSET_SECS: f64 = 0.5;

/// Offset used by the fixed strategy (seconds).
pub const DISTRIBUTION_FIXED_OFFSET_SECS: f64 = 0.1;

// ============================================================================
// Summary
// ============================================================================

/// Interval between capture summaries (seconds). 3 600 = 1 hour.
pub const SUMMARY_INTERVAL_SECS: u64 = 3_600;

// ============================================================================
// Output
// ============================================================================

/// Root directory for captured images.
pub const IMAGE_OUTPUT_PATH: &str = "output/images";

/// Root directory for encoded videos.
pub const VIDEO_OUTPUT_PATH: &str = "output/videos";

// ============================================================================
// Timelapse
// ============================================================================

/// Local time of day at which the daily videos are created.
pub const TIMELAPSE_CREATION_TIME: &str = "01:00";

/// Which day back the daily run encodes.
pub const TIMELAPSE_DAYS_AGO: u32 = 1;

/// Output frame rate of encoded videos.
pub const TIMELAPSE_FRAME_RATE: u32 = 30;

/// Parallel ffmpeg processes during the daily run.
pub const TIMELAPSE_CONCURRENT_CREATION: usize = 1;

/// ffmpeg executable.
pub const FFMPEG_BINARY: &str = "ffmpeg";

// ============================================================================
// Health Monitoring
// ============================================================================

/// Interval between health checks (seconds).
pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

/// Free space below which the output disk is reported degraded (bytes).
pub const DISK_WARNING_FREE_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// Free space below which the output disk is reported unhealthy (bytes).
pub const DISK_CRITICAL_FREE_BYTES: u64 = 1024 * 1024 * 1024;
