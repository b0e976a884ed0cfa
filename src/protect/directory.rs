//! Discovered camera set
//!
//! The camera list is replaced as a whole on each refresh; runners read a
//! consistent snapshot without locking.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{CameraSource, DiscoveryError};
use crate::config::CameraSelectionConfig;
use crate::types::{Camera, CameraId};

/// One discovery result.
#[derive(Debug, Clone)]
pub struct CameraSnapshot {
    pub cameras: Vec<Camera>,
    pub refreshed_at: DateTime<Local>,
    refreshed_instant: Instant,
}

impl CameraSnapshot {
    pub fn new(mut cameras: Vec<Camera>) -> Self {
        cameras.sort_by(|a, b| a.id.cmp(&b.id));
        // `b` is the kept entry, `a` the later duplicate being removed.
        cameras.dedup_by(|a, b| {
            let duplicate = a.id == b.id;
            if duplicate && a.api_id != b.api_id {
                warn!(
                    camera = %b.id,
                    kept = %b.api_id,
                    dropped = %a.api_id,
                    "Two cameras share a name, only the first is captured"
                );
            }
            duplicate
        });
        Self {
            cameras,
            refreshed_at: Local::now(),
            refreshed_instant: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.refreshed_instant.elapsed()
    }
}

#[derive(Debug)]
pub struct CameraDirectory {
    current: ArcSwapOption<CameraSnapshot>,
    selection: CameraSelectionConfig,
}

impl CameraDirectory {
    pub fn new(selection: CameraSelectionConfig) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            selection,
        }
    }

    /// Directory pre-filled with a fixed camera list.
    pub fn with_cameras(selection: CameraSelectionConfig, cameras: Vec<Camera>) -> Self {
        let dir = Self::new(selection);
        dir.replace(cameras);
        dir
    }

    pub fn replace(&self, cameras: Vec<Camera>) {
        self.current.store(Some(Arc::new(CameraSnapshot::new(cameras))));
    }

    pub fn snapshot(&self) -> Option<Arc<CameraSnapshot>> {
        self.current.load_full()
    }

    /// Connected cameras passing the selection filter, sorted by id.
    ///
    /// `None` before the first successful discovery.
    pub fn due_cameras(&self) -> Option<Vec<Camera>> {
        let snap = self.snapshot()?;
        Some(
            snap.cameras
                .iter()
                .filter(|c| c.connected && self.selection.is_selected(c.id.as_str()))
                .cloned()
                .collect(),
        )
    }

    /// Latest state of one camera.
    pub fn get(&self, id: &CameraId) -> Option<Camera> {
        self.snapshot()?.cameras.iter().find(|c| &c.id == id).cloned()
    }

    /// Time since the last successful discovery.
    pub fn age(&self) -> Option<Duration> {
        self.snapshot().map(|s| s.age())
    }

    /// Query the source and swap in the result. On error the previous
    /// snapshot stays in place.
    pub async fn refresh(&self, source: &dyn CameraSource) -> Result<usize, DiscoveryError> {
        let cameras = source.discover().await?;
        let total = cameras.len();
        let connected = cameras.iter().filter(|c| c.connected).count();
        let selected: Vec<&Camera> = cameras
            .iter()
            .filter(|c| self.selection.is_selected(c.id.as_str()))
            .collect();

        info!(
            total,
            connected,
            selected = selected.len(),
            mode = ?self.selection.selection_mode,
            "Camera discovery complete"
        );
        for cam in &selected {
            info!(
                camera = %cam.id,
                connected = cam.connected,
                full_hd = cam.supports_full_hd,
                "  {} {}",
                if cam.connected { "✓" } else { "✗" },
                cam.id
            );
        }
        if selected.is_empty() {
            warn!(
                whitelist = ?self.selection.whitelist,
                blacklist = ?self.selection.blacklist,
                "No cameras match the current selection"
            );
        }

        self.replace(cameras);
        Ok(total)
    }

    /// Refresh every `interval` until cancelled. The first refresh runs
    /// immediately.
    pub async fn run(&self, source: Arc<dyn CameraSource>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh(source.as_ref()).await {
                        warn!(error = %e, "Camera discovery failed, keeping previous list");
                    }
                }
            }
        }
    }
}
