//! Capture results

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::{CameraId, IntervalSpec};

/// A stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageArtifact {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Result of one camera's unit of work for one interval tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureOutcome {
    FreshSuccess { artifact: ImageArtifact, attempts: u32 },
    FreshFailure { attempts: u32, reason: String },
    /// Copied from the donor interval's image, no request issued.
    ReusedSuccess { artifact: ImageArtifact },
    /// Donor failed or timed out; fresh capture succeeded.
    ReusedFallbackSuccess { artifact: ImageArtifact, attempts: u32 },
    ReusedFallbackFailure { attempts: u32, reason: String },
    /// Camera disappeared or went offline between discovery and dispatch.
    Skipped { reason: String },
}

impl CaptureOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::FreshSuccess { .. } | Self::ReusedSuccess { .. } | Self::ReusedFallbackSuccess { .. }
        )
    }

    /// Not attempted, so neither a success nor a failure.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub fn is_reused(&self) -> bool {
        matches!(self, Self::ReusedSuccess { .. })
    }

    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            Self::ReusedFallbackSuccess { .. } | Self::ReusedFallbackFailure { .. }
        )
    }

    pub fn artifact(&self) -> Option<&ImageArtifact> {
        match self {
            Self::FreshSuccess { artifact, .. }
            | Self::ReusedSuccess { artifact }
            | Self::ReusedFallbackSuccess { artifact, .. } => Some(artifact),
            _ => None,
        }
    }

    /// Requests sent to the console for this unit.
    pub fn requests(&self) -> u32 {
        match self {
            Self::FreshSuccess { attempts, .. }
            | Self::FreshFailure { attempts, .. }
            | Self::ReusedFallbackSuccess { attempts, .. }
            | Self::ReusedFallbackFailure { attempts, .. } => *attempts,
            Self::ReusedSuccess { .. } | Self::Skipped { .. } => 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::FreshSuccess { .. } => "fresh_success",
            Self::FreshFailure { .. } => "fresh_failure",
            Self::ReusedSuccess { .. } => "reused_success",
            Self::ReusedFallbackSuccess { .. } => "reused_fallback_success",
            Self::ReusedFallbackFailure { .. } => "reused_fallback_failure",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// One outcome together with where and when it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    pub camera: CameraId,
    pub interval: IntervalSpec,
    pub tick: u64,
    pub outcome: CaptureOutcome,
    pub elapsed: Duration,
}
