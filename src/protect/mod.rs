//! UniFi Protect integration
//!
//! The scheduler only sees the two traits below; [`ProtectClient`] implements
//! both against the console's integration API.

mod client;
mod directory;

pub use client::ProtectClient;
pub use directory::{CameraDirectory, CameraSnapshot};

use async_trait::async_trait;

use crate::types::{Camera, Quality};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("Snapshot request timed out")]
    Timeout,
    #[error("Connection error: {0}")]
    Connection(String),
    /// The camera rejected the requested quality.
    #[error("Camera does not support {0} snapshots")]
    UnsupportedQuality(Quality),
    #[error("Console returned status {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Invalid image: {0}")]
    InvalidImage(String),
}

impl CaptureError {
    /// Whether a retry might succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, CaptureError::UnsupportedQuality(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Console returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("Unexpected camera list payload: {0}")]
    Payload(String),
}

// ============================================================================
// Traits
// ============================================================================

/// Fetches one still image from a camera.
#[async_trait]
pub trait SnapshotClient: Send + Sync {
    async fn capture(&self, camera: &Camera, quality: Quality) -> Result<Vec<u8>, CaptureError>;
}

/// Lists the cameras known to the console.
#[async_trait]
pub trait CameraSource: Send + Sync {
    async fn discover(&self) -> Result<Vec<Camera>, DiscoveryError>;
}
