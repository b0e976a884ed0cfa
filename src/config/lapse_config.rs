use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

/// Environment variable holding the path of the config file.
pub const CONFIG_ENV_VAR: &str = "CAMLAPSE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "camlapse.toml";

/// Top-level configuration.
///
/// Every section is optional in the TOML file; missing keys take the values
/// from [`super::defaults`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LapseConfig {
    #[serde(default)]
    pub protect: ProtectConfig,

    #[serde(default)]
    pub cameras: CameraSelectionConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub distribution: DistributionConfig,

    #[serde(default)]
    pub summary: SummaryConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub timelapse: TimelapseConfig,
}

impl LapseConfig {
    /// Load configuration using the standard search order:
    ///
    /// 1. `$CAMLAPSE_CONFIG`
    /// 2. `./camlapse.toml`
    /// 3. Built-in defaults
    ///
    /// A file that exists but fails to parse or validate is an error; the
    /// caller treats that as fatal. Environment overrides are applied last.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if !p.exists() {
                return Err(ConfigError::Io(
                    p,
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("{CONFIG_ENV_VAR} points to a non-existent file"),
                    ),
                ));
            }
            let config = Self::load_from_file(&p)?;
            info!(path = %p.display(), "Loaded config from {}", CONFIG_ENV_VAR);
            config
        } else {
            let local = PathBuf::from(LOCAL_CONFIG_FILE);
            if local.exists() {
                let config = Self::load_from_file(&local)?;
                info!("Loaded config from ./{}", LOCAL_CONFIG_FILE);
                config
            } else {
                info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys are logged as warnings.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CAMLAPSE_PROTECT_API_KEY` / `CAMLAPSE_PROTECT_HOST` if set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("CAMLAPSE_PROTECT_API_KEY") {
            if !key.is_empty() {
                self.protect.api_key = key;
            }
        }
        if let Ok(host) = std::env::var("CAMLAPSE_PROTECT_HOST") {
            if !host.is_empty() {
                info!(host = %host, "Protect host overridden from environment");
                self.protect.host = host;
            }
        }
    }

    /// Serialize the current config to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate the configuration for internal consistency.
    ///
    /// All problems are collected so the operator sees them at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let c = &self.capture;
        if c.intervals.is_empty() {
            errors.push("capture.intervals must contain at least one interval".to_string());
        }
        if c.intervals.iter().any(|&i| i == 0) {
            errors.push("capture.intervals must all be positive".to_string());
        }
        let mut seen = HashSet::new();
        for &i in &c.intervals {
            if !seen.insert(i) {
                errors.push(format!("capture.intervals contains {i} more than once"));
            }
        }
        if !(c.timeout_percentage > 0.0 && c.timeout_percentage <= 1.0) {
            errors.push(format!(
                "capture.timeout_percentage ({}) must be in (0, 1]",
                c.timeout_percentage
            ));
        }
        if c.reuse_wait_timeout_secs == 0 {
            errors.push("capture.reuse_wait_timeout_secs must be positive".to_string());
        }
        if c.registry_window_secs < c.reuse_wait_timeout_secs {
            errors.push(format!(
                "capture.registry_window_secs ({}) must be >= reuse_wait_timeout_secs ({})",
                c.registry_window_secs, c.reuse_wait_timeout_secs
            ));
        }

        let r = &self.rate_limit;
        if !(r.requests_per_second.is_finite() && r.requests_per_second > 0.0) {
            errors.push(format!(
                "rate_limit.requests_per_second ({}) must be a positive number",
                r.requests_per_second
            ));
        }
        if !(r.safety_buffer > 0.0 && r.safety_buffer <= 1.0) {
            errors.push(format!(
                "rate_limit.safety_buffer ({}) must be in (0, 1]",
                r.safety_buffer
            ));
        }
        if r.max_concurrent_override == Some(0) {
            errors.push("rate_limit.max_concurrent_override must be at least 1".to_string());
        }

        let d = &self.distribution;
        for (name, value) in [
            ("window_secs", d.window_secs),
            ("min_offset_secs", d.min_offset_secs),
            ("max_offset_secs", d.max_offset_secs),
            ("fixed_offset_secs", d.fixed_offset_secs),
        ] {
            if !value.is_finite() {
                errors.push(format!("distribution.{name} ({value}) must be a finite number"));
            }
        }
        if d.window_secs <= 0.0 {
            errors.push("distribution.window_secs must be positive".to_string());
        }
        if d.min_offset_secs < 0.0 || d.fixed_offset_secs < 0.0 {
            errors.push("distribution offsets must not be negative".to_string());
        }
        if d.min_offset_secs > d.max_offset_secs {
            errors.push(format!(
                "distribution.min_offset_secs ({}) must be <= max_offset_secs ({})",
                d.min_offset_secs, d.max_offset_secs
            ));
        }

        if self.summary.interval_secs == 0 {
            errors.push("summary.interval_secs must be positive".to_string());
        }
        if self.cameras.refresh_interval_secs == 0 {
            errors.push("cameras.refresh_interval_secs must be positive".to_string());
        }

        let t = &self.timelapse;
        if t.creation_time().is_none() {
            errors.push(format!(
                "timelapse.creation_time ({}) must be HH:MM",
                t.creation_time
            ));
        }
        if t.frame_rate == 0 {
            errors.push("timelapse.frame_rate must be positive".to_string());
        }
        if t.concurrent_creation == 0 {
            errors.push("timelapse.concurrent_creation must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Protect
// ============================================================================

/// Connection to the Protect console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Sent as `X-API-KEY`. Usually supplied through `CAMLAPSE_PROTECT_API_KEY`.
    #[serde(default)]
    pub api_key: String,

    /// Consoles ship self-signed certificates, so this defaults to off.
    #[serde(default)]
    pub verify_ssl: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Ask for full-HD snapshots from cameras that support them.
    #[serde(default = "default_true")]
    pub high_quality_snapshots: bool,
}

fn default_host() -> String {
    defaults::PROTECT_HOST.to_string()
}
fn default_port() -> u16 {
    defaults::PROTECT_PORT
}
fn default_request_timeout() -> u64 {
    defaults::PROTECT_REQUEST_TIMEOUT_SECS
}
fn default_true() -> bool {
    true
}

impl Default for ProtectConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: String::new(),
            verify_ssl: false,
            request_timeout_secs: default_request_timeout(),
            high_quality_snapshots: true,
        }
    }
}

impl ProtectConfig {
    /// Base URL of the integration API, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!(
            "https://{}:{}{}",
            self.host,
            self.port,
            defaults::PROTECT_API_PATH
        )
    }
}

// ============================================================================
// Camera Selection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    All,
    Whitelist,
    Blacklist,
}

/// Which discovered cameras are captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSelectionConfig {
    #[serde(default)]
    pub selection_mode: SelectionMode,

    /// Camera names captured in whitelist mode.
    #[serde(default)]
    pub whitelist: Vec<String>,

    /// Camera names skipped in blacklist mode.
    #[serde(default)]
    pub blacklist: Vec<String>,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

fn default_refresh_interval() -> u64 {
    defaults::CAMERA_REFRESH_INTERVAL_SECS
}

impl Default for CameraSelectionConfig {
    fn default() -> Self {
        Self {
            selection_mode: SelectionMode::All,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl CameraSelectionConfig {
    /// Whether a camera with this name passes the selection filter.
    pub fn is_selected(&self, name: &str) -> bool {
        match self.selection_mode {
            SelectionMode::All => true,
            SelectionMode::Whitelist => self.whitelist.iter().any(|n| n == name),
            SelectionMode::Blacklist => !self.blacklist.iter().any(|n| n == name),
        }
    }
}

// ============================================================================
// Capture
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Capture periods in seconds.
    #[serde(default = "default_intervals")]
    pub intervals: Vec<u64>,

    /// Align ticks to wall-clock boundaries (every minute interval fires on :00).
    #[serde(default = "default_true")]
    pub top_of_the_minute: bool,

    /// Reuse images from aligned faster intervals instead of fetching again.
    #[serde(default = "default_true")]
    pub optimize_interval_fetching: bool,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_timeout_percentage")]
    pub timeout_percentage: f64,

    #[serde(default = "default_reuse_wait_timeout")]
    pub reuse_wait_timeout_secs: u64,

    #[serde(default = "default_registry_window")]
    pub registry_window_secs: u64,
}

fn default_intervals() -> Vec<u64> {
    defaults::CAPTURE_INTERVALS_SECS.to_vec()
}
fn default_max_retries() -> u32 {
    defaults::MAX_RETRIES
}
fn default_retry_delay() -> u64 {
    defaults::RETRY_DELAY_SECS
}
fn default_timeout_percentage() -> f64 {
    defaults::TIMEOUT_PERCENTAGE
}
fn default_reuse_wait_timeout() -> u64 {
    defaults::REUSE_WAIT_TIMEOUT_SECS
}
fn default_registry_window() -> u64 {
    defaults::REGISTRY_WINDOW_SECS
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            intervals: default_intervals(),
            top_of_the_minute: true,
            optimize_interval_fetching: true,
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            timeout_percentage: default_timeout_percentage(),
            reuse_wait_timeout_secs: default_reuse_wait_timeout(),
            registry_window_secs: default_registry_window(),
        }
    }
}

impl CaptureConfig {
    /// Deadline for one capture attempt of an interval.
    ///
    /// `max(min(period * timeout_percentage, period - 1), 5)` seconds.
    pub fn capture_timeout(&self, period_secs: u64) -> Duration {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let scaled = (period_secs as f64 * self.timeout_percentage).floor() as u64;
        let secs = scaled
            .min(period_secs.saturating_sub(1))
            .max(defaults::MIN_CAPTURE_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn reuse_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.reuse_wait_timeout_secs)
    }

    pub fn registry_window(&self) -> Duration {
        Duration::from_secs(self.registry_window_secs)
    }
}

// ============================================================================
// Rate Limit
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// External API limit.
    #[serde(default = "default_rps")]
    pub requests_per_second: f64,

    #[serde(default = "default_safety_buffer")]
    pub safety_buffer: f64,

    /// Lower the computed concurrency budget. Values above it are ignored.
    #[serde(default)]
    pub max_concurrent_override: Option<usize>,
}

fn default_rps() -> f64 {
    defaults::REQUESTS_PER_SECOND
}
fn default_safety_buffer() -> f64 {
    defaults::SAFETY_BUFFER
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rps(),
            safety_buffer: default_safety_buffer(),
            max_concurrent_override: None,
        }
    }
}

// ============================================================================
// Distribution
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionStrategy {
    #[default]
    Adaptive,
    Fixed,
}

/// Spreading of large camera sets across sub-second slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub strategy: DistributionStrategy,

    #[serde(default = "default_min_cameras")]
    pub min_cameras: usize,

    #[serde(default = "default_window")]
    pub window_secs: f64,

    #[serde(default = "default_min_offset")]
    pub min_offset_secs: f64,

    #[serde(default = "default_max_offset")]
    pub max_offset_secs: f64,

    #[serde(default = "default_fixed_offset")]
    pub fixed_offset_secs: f64,
}

fn default_min_cameras() -> usize {
    defaults::DISTRIBUTION_MIN_CAMERAS
}
fn default_window() -> f64 {
    defaults::DISTRIBUTION_WINDOW_SECS
}
fn default_min_offset() -> f64 {
    defaults::DISTRIBUTION_MIN_OFFSET_SECS
}
fn default_max_offset() -> f64 {
    defaults::DISTRIBUTION_MAX_OFFSET_SECS
}
fn default_fixed_offset() -> f64 {
    defaults::DISTRIBUTION_FIXED_OFFSET_SECS
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: DistributionStrategy::Adaptive,
            min_cameras: default_min_cameras(),
            window_secs: default_window(),
            min_offset_secs: default_min_offset(),
            max_offset_secs: default_max_offset(),
            fixed_offset_secs: default_fixed_offset(),
        }
    }
}

// ============================================================================
// Summary
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_summary_interval")]
    pub interval_secs: u64,

    /// Clear the counters after each report.
    #[serde(default = "default_true")]
    pub reset_on_emit: bool,
}

fn default_summary_interval() -> u64 {
    defaults::SUMMARY_INTERVAL_SECS
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_summary_interval(),
            reset_on_emit: true,
        }
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_image_path")]
    pub image_path: PathBuf,

    #[serde(default = "default_video_path")]
    pub video_path: PathBuf,
}

fn default_image_path() -> PathBuf {
    PathBuf::from(defaults::IMAGE_OUTPUT_PATH)
}
fn default_video_path() -> PathBuf {
    PathBuf::from(defaults::VIDEO_OUTPUT_PATH)
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            image_path: default_image_path(),
            video_path: default_video_path(),
        }
    }
}

// ============================================================================
// Timelapse
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    #[default]
    Medium,
    High,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelapseConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Local time (`HH:MM`) at which the daily run starts.
    #[serde(default = "default_creation_time")]
    pub creation_time: String,

    #[serde(default = "default_days_ago")]
    pub days_ago: u32,

    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    #[serde(default)]
    pub quality_preset: QualityPreset,

    /// Used with the `custom` preset.
    #[serde(default = "default_custom_crf")]
    pub custom_crf: u8,

    #[serde(default = "default_custom_preset")]
    pub custom_preset: String,

    #[serde(default = "default_custom_pix_fmt")]
    pub custom_pix_fmt: String,

    /// Tag the custom output as BT.709.
    #[serde(default)]
    pub custom_color_settings: bool,

    #[serde(default)]
    pub overwrite: bool,

    #[serde(default)]
    pub delete_images_after_success: bool,

    #[serde(default = "default_concurrent_creation")]
    pub concurrent_creation: usize,

    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_binary: String,
}

fn default_creation_time() -> String {
    defaults::TIMELAPSE_CREATION_TIME.to_string()
}
fn default_days_ago() -> u32 {
    defaults::TIMELAPSE_DAYS_AGO
}
fn default_frame_rate() -> u32 {
    defaults::TIMELAPSE_FRAME_RATE
}
fn default_custom_crf() -> u8 {
    23
}
fn default_custom_preset() -> String {
    "medium".to_string()
}
fn default_custom_pix_fmt() -> String {
    "yuv420p".to_string()
}
fn default_concurrent_creation() -> usize {
    defaults::TIMELAPSE_CONCURRENT_CREATION
}
fn default_ffmpeg() -> String {
    defaults::FFMPEG_BINARY.to_string()
}

impl Default for TimelapseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            creation_time: default_creation_time(),
            days_ago: default_days_ago(),
            frame_rate: default_frame_rate(),
            quality_preset: QualityPreset::Medium,
            custom_crf: default_custom_crf(),
            custom_preset: default_custom_preset(),
            custom_pix_fmt: default_custom_pix_fmt(),
            custom_color_settings: false,
            overwrite: false,
            delete_images_after_success: false,
            concurrent_creation: default_concurrent_creation(),
            ffmpeg_binary: default_ffmpeg(),
        }
    }
}

impl TimelapseConfig {
    /// Parsed `creation_time`, or `None` if it is not a valid `HH:MM`.
    pub fn creation_time(&self) -> Option<chrono::NaiveTime> {
        chrono::NaiveTime::parse_from_str(&self.creation_time, "%H:%M").ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = LapseConfig::default();
        assert!(config.validate().is_ok(), "Default config must be valid");
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = LapseConfig::from_toml_str("").unwrap();
        assert_eq!(config.capture.intervals, vec![60, 180, 900, 3_600, 86_400]);
        assert_eq!(config.rate_limit.requests_per_second, 10.0);
        assert_eq!(config.cameras.selection_mode, SelectionMode::All);
    }

    #[test]
    fn test_partial_override() {
        let config = LapseConfig::from_toml_str(
            r#"
[capture]
intervals = [60, 180]

[distribution]
strategy = "fixed"
"#,
        )
        .unwrap();
        assert_eq!(config.capture.intervals, vec![60, 180]);
        assert_eq!(config.capture.max_retries, 3);
        assert_eq!(config.distribution.strategy, DistributionStrategy::Fixed);
        assert!(config.distribution.enabled);
    }

    #[test]
    fn test_duplicate_and_zero_intervals_rejected() {
        let err = LapseConfig::from_toml_str("[capture]\nintervals = [60, 0, 60]\n").unwrap_err();
        match err {
            ConfigError::Validation(errors) => {
                assert!(errors.iter().any(|e| e.contains("positive")));
                assert!(errors.iter().any(|e| e.contains("more than once")));
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_safety_buffer_out_of_range_rejected() {
        let mut config = LapseConfig::default();
        config.rate_limit.safety_buffer = 1.5;
        assert!(config.validate().is_err());
        config.rate_limit.safety_buffer = 0.0;
        assert!(config.validate().is_err());
        config.rate_limit.safety_buffer = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_capture_timeout_formula() {
        let c = CaptureConfig::default();
        assert_eq!(c.capture_timeout(60), Duration::from_secs(48));
        assert_eq!(c.capture_timeout(3), Duration::from_secs(5));
        assert_eq!(c.capture_timeout(10), Duration::from_secs(8));

        let c = CaptureConfig {
            timeout_percentage: 1.0,
            ..CaptureConfig::default()
        };
        assert_eq!(c.capture_timeout(60), Duration::from_secs(59));
    }

    #[test]
    fn test_selection_modes() {
        let mut sel = CameraSelectionConfig {
            whitelist: vec!["Front".into()],
            blacklist: vec!["Garage".into()],
            ..CameraSelectionConfig::default()
        };
        assert!(sel.is_selected("Garage"));

        sel.selection_mode = SelectionMode::Whitelist;
        assert!(sel.is_selected("Front"));
        assert!(!sel.is_selected("Garage"));

        sel.selection_mode = SelectionMode::Blacklist;
        assert!(sel.is_selected("Front"));
        assert!(!sel.is_selected("Garage"));
    }

    #[test]
    fn test_bad_creation_time_rejected() {
        let err = LapseConfig::from_toml_str("[timelapse]\ncreation_time = \"25:99\"\n");
        assert!(matches!(err, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_roundtrip_to_toml() {
        let config = LapseConfig::default();
        let text = config.to_toml().unwrap();
        let back = LapseConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.capture.intervals, config.capture.intervals);
    }
}
