//! Time-lapse video creation
//!
//! Once a day the captured images of each camera and interval are encoded
//! into one video per day. Encoding is delegated to a [`VideoEncoder`];
//! [`FfmpegEncoder`] shells out to ffmpeg.

mod ffmpeg;
mod service;

pub use ffmpeg::FfmpegEncoder;
pub use service::{CreationSummary, JobResult, TimelapseService};

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{QualityPreset, TimelapseConfig};

/// Encoder settings derived from the configured preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualitySettings {
    pub crf: u8,
    pub preset: String,
    pub pix_fmt: String,
    /// Tag the output as BT.709.
    pub color_settings: bool,
}

impl QualitySettings {
    pub fn from_config(config: &TimelapseConfig) -> Self {
        match config.quality_preset {
            QualityPreset::Medium => Self {
                crf: 25,
                preset: "medium".to_string(),
                pix_fmt: "yuv420p".to_string(),
                color_settings: false,
            },
            QualityPreset::High => Self {
                crf: 18,
                preset: "slow".to_string(),
                pix_fmt: "yuv444p".to_string(),
                color_settings: true,
            },
            QualityPreset::Custom => Self {
                crf: config.custom_crf,
                preset: config.custom_preset.clone(),
                pix_fmt: config.custom_pix_fmt.clone(),
                color_settings: config.custom_color_settings,
            },
        }
    }
}

/// One video to produce.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    /// Directory holding the day's images.
    pub images_dir: PathBuf,
    /// File name prefix of the images (`<camera>_`).
    pub image_prefix: String,
    pub output: PathBuf,
    pub frame_rate: u32,
    pub quality: QualitySettings,
    pub overwrite: bool,
}

#[derive(Debug, Clone)]
pub struct EncodedVideo {
    pub path: PathBuf,
    pub bytes: u64,
    pub elapsed: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Failed to start encoder: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Encoder exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("Encoder produced no output at {0}")]
    EmptyOutput(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait VideoEncoder: Send + Sync {
    async fn encode(&self, job: &EncodeJob) -> Result<EncodedVideo, EncodeError>;
}

/// `1.5 MB` style size.
#[allow(clippy::cast_precision_loss)]
pub fn format_file_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}

/// `1h 2m 3s` style duration.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (hours, rem) = (secs / 3600, secs % 3600);
    let (minutes, secs) = (rem / 60, rem % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512.0 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 2m 3s");
    }

    #[test]
    fn test_presets() {
        let mut cfg = TimelapseConfig::default();
        assert_eq!(QualitySettings::from_config(&cfg).crf, 25);

        cfg.quality_preset = QualityPreset::High;
        let high = QualitySettings::from_config(&cfg);
        assert_eq!(high.pix_fmt, "yuv444p");
        assert!(high.color_settings);

        cfg.quality_preset = QualityPreset::Custom;
        cfg.custom_crf = 30;
        assert_eq!(QualitySettings::from_config(&cfg).crf, 30);
    }
}
