//! ffmpeg-backed encoder

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::debug;

use super::{EncodeError, EncodeJob, EncodedVideo, VideoEncoder};

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: String,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Command-line arguments for `job`.
    pub fn args(job: &EncodeJob) -> Vec<String> {
        let pattern = job
            .images_dir
            .join(format!("{}*.jpg", job.image_prefix))
            .to_string_lossy()
            .into_owned();

        let mut args: Vec<String> = vec![
            if job.overwrite { "-y" } else { "-n" }.to_string(),
            "-loglevel".into(),
            "error".into(),
            "-nostats".into(),
            "-framerate".into(),
            job.frame_rate.to_string(),
            "-pattern_type".into(),
            "glob".into(),
            "-i".into(),
            pattern,
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            job.quality.preset.clone(),
            "-crf".into(),
            job.quality.crf.to_string(),
            "-pix_fmt".into(),
            job.quality.pix_fmt.clone(),
        ];
        if job.quality.color_settings {
            for flag in ["-color_primaries", "-color_trc", "-colorspace"] {
                args.push(flag.into());
                args.push("bt709".into());
            }
        }
        args.push("-movflags".into());
        args.push("+faststart".into());
        args.push(job.output.to_string_lossy().into_owned());
        args
    }

    /// First line of `ffmpeg -version`.
    pub async fn version(&self) -> Result<String, EncodeError> {
        let output = Command::new(&self.binary)
            .arg("-version")
            .output()
            .await
            .map_err(EncodeError::Spawn)?;
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text.lines().next().unwrap_or("unknown").to_string())
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(&self, job: &EncodeJob) -> Result<EncodedVideo, EncodeError> {
        let started = Instant::now();
        let args = Self::args(job);
        debug!(binary = %self.binary, args = %args.join(" "), "Running encoder");

        // Dropping the future (shutdown) kills the child.
        let output = Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(EncodeError::Spawn)?
            .wait_with_output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EncodeError::Failed {
                status: output.status.to_string(),
                stderr: stderr.trim().chars().take(200).collect(),
            });
        }

        let bytes = tokio::fs::metadata(&job.output)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if bytes == 0 {
            return Err(EncodeError::EmptyOutput(job.output.clone()));
        }

        Ok(EncodedVideo {
            path: job.output.clone(),
            bytes,
            elapsed: started.elapsed(),
        })
    }
}
