//! Health monitor: periodic checks with automatic recovery
//!
//! - Camera discovery: a stale camera list triggers an immediate refresh
//! - Disk space: warns below the warning threshold, errors below critical
//! - Request limiter: reports saturation

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::defaults::{DISK_CRITICAL_FREE_BYTES, DISK_WARNING_FREE_BYTES};
use crate::protect::{CameraDirectory, CameraSource};
use crate::scheduling::ConcurrencyLimiter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// Running with reduced capability
    Degraded { reason: String },
    Unhealthy { reason: String },
}

impl HealthStatus {
    fn severity(&self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Degraded { .. } => 1,
            Self::Unhealthy { .. } => 2,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "HEALTHY"),
            Self::Degraded { reason } => write!(f, "DEGRADED: {reason}"),
            Self::Unhealthy { reason } => write!(f, "UNHEALTHY: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealAction {
    /// The component was restored
    Recovered,
    NoActionNeeded,
    ManualInterventionRequired { reason: String },
}

impl std::fmt::Display for HealAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recovered => write!(f, "recovered"),
            Self::NoActionNeeded => write!(f, "no action needed"),
            Self::ManualInterventionRequired { reason } => {
                write!(f, "manual intervention required: {reason}")
            }
        }
    }
}

/// A monitored component. `heal` is only called when `check` reports
/// [`HealthStatus::Unhealthy`].
#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn component_name(&self) -> &str;

    async fn check(&self) -> HealthStatus;

    async fn heal(&self) -> HealAction {
        HealAction::NoActionNeeded
    }
}

#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_checked: Instant,
    pub last_action: Option<HealAction>,
}

#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub components: Vec<ComponentHealth>,
    /// Worst status of all components
    pub overall: HealthStatus,
    pub check_cycles: u64,
}

impl Default for SystemHealth {
    fn default() -> Self {
        Self {
            components: Vec::new(),
            overall: HealthStatus::Healthy,
            check_cycles: 0,
        }
    }
}

// ============================================================================
// Camera discovery
// ============================================================================

/// Flags a camera list that has not been refreshed for three refresh periods.
pub struct DiscoveryHealthCheck {
    directory: Arc<CameraDirectory>,
    source: Arc<dyn CameraSource>,
    max_age: Duration,
}

impl DiscoveryHealthCheck {
    pub fn new(directory: Arc<CameraDirectory>, source: Arc<dyn CameraSource>, refresh_interval: Duration) -> Self {
        Self {
            directory,
            source,
            max_age: refresh_interval * 3,
        }
    }
}

#[async_trait]
impl HealthCheck for DiscoveryHealthCheck {
    fn component_name(&self) -> &str {
        "Camera Discovery"
    }

    async fn check(&self) -> HealthStatus {
        match self.directory.age() {
            None => HealthStatus::Unhealthy {
                reason: "No camera list loaded".to_string(),
            },
            Some(age) if age > self.max_age => HealthStatus::Unhealthy {
                reason: format!("Camera list is {}s old", age.as_secs()),
            },
            Some(_) => match self.directory.snapshot() {
                Some(snap) if snap.cameras.iter().all(|c| !c.connected) && !snap.cameras.is_empty() => {
                    HealthStatus::Degraded {
                        reason: "All cameras are offline".to_string(),
                    }
                }
                _ => HealthStatus::Healthy,
            },
        }
    }

    async fn heal(&self) -> HealAction {
        match self.directory.refresh(self.source.as_ref()).await {
            Ok(count) => {
                info!(cameras = count, "Camera list refreshed by health monitor");
                HealAction::Recovered
            }
            Err(e) => HealAction::ManualInterventionRequired {
                reason: format!("camera discovery failed: {e}"),
            },
        }
    }
}

// ============================================================================
// Disk space
// ============================================================================

pub struct DiskHealthCheck {
    path: PathBuf,
    warning_free_bytes: u64,
    critical_free_bytes: u64,
}

impl DiskHealthCheck {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_thresholds(path, DISK_WARNING_FREE_BYTES, DISK_CRITICAL_FREE_BYTES)
    }

    pub fn with_thresholds(path: impl Into<PathBuf>, warning_free_bytes: u64, critical_free_bytes: u64) -> Self {
        Self {
            path: path.into(),
            warning_free_bytes,
            critical_free_bytes,
        }
    }
}

#[async_trait]
impl HealthCheck for DiskHealthCheck {
    fn component_name(&self) -> &str {
        "Disk Space"
    }

    #[allow(clippy::cast_precision_loss)]
    async fn check(&self) -> HealthStatus {
        let gib = |b: u64| b as f64 / 1_073_741_824.0;
        match free_bytes(&self.path) {
            Ok(free) if free < self.critical_free_bytes => HealthStatus::Unhealthy {
                reason: format!("Only {:.1} GB free on {}", gib(free), self.path.display()),
            },
            Ok(free) if free < self.warning_free_bytes => HealthStatus::Degraded {
                reason: format!("{:.1} GB free on {}", gib(free), self.path.display()),
            },
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Degraded {
                reason: format!("Could not check disk space: {e}"),
            },
        }
    }

    async fn heal(&self) -> HealAction {
        HealAction::ManualInterventionRequired {
            reason: "free disk space or enable delete_images_after_success".to_string(),
        }
    }
}

/// Free bytes available to unprivileged users on the filesystem holding
/// `path`. Walks up to the nearest existing ancestor.
#[allow(unsafe_code, clippy::unnecessary_cast)]
pub fn free_bytes(path: &Path) -> Result<u64, String> {
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let existing = path
        .ancestors()
        .find(|p| p.exists())
        .ok_or_else(|| format!("no existing ancestor of {}", path.display()))?;
    let c_path = std::ffi::CString::new(existing.as_os_str().as_bytes()).map_err(|e| e.to_string())?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();

    // SAFETY: c_path is NUL-terminated and stat is only read after success.
    let result = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if result == 0 {
        let stat = unsafe { stat.assume_init() };
        Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
    } else {
        Err(format!("statvfs failed for {}", existing.display()))
    }
}

// ============================================================================
// Request limiter
// ============================================================================

/// Reports when every request slot has been busy for two consecutive checks.
pub struct LimiterHealthCheck {
    limiter: ConcurrencyLimiter,
    saturated_before: std::sync::atomic::AtomicBool,
}

impl LimiterHealthCheck {
    pub fn new(limiter: ConcurrencyLimiter) -> Self {
        Self {
            limiter,
            saturated_before: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl HealthCheck for LimiterHealthCheck {
    fn component_name(&self) -> &str {
        "Request Limiter"
    }

    async fn check(&self) -> HealthStatus {
        use std::sync::atomic::Ordering;

        let saturated = self.limiter.available() == 0;
        let was = self.saturated_before.swap(saturated, Ordering::Relaxed);
        if saturated && was {
            HealthStatus::Degraded {
                reason: format!("All {} request slots busy", self.limiter.capacity()),
            }
        } else {
            HealthStatus::Healthy
        }
    }
}

// ============================================================================
// Monitor
// ============================================================================

pub struct HealthMonitor {
    checks: Vec<Box<dyn HealthCheck>>,
    health: Arc<RwLock<SystemHealth>>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(checks: Vec<Box<dyn HealthCheck>>, interval: Duration) -> Self {
        Self {
            checks,
            health: Arc::new(RwLock::new(SystemHealth::default())),
            interval,
        }
    }

    pub fn health_handle(&self) -> Arc<RwLock<SystemHealth>> {
        Arc::clone(&self.health)
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(
            checks = self.checks.len(),
            interval_secs = self.interval.as_secs(),
            "Health monitor started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => self.run_cycle().await,
            }
        }
        info!("Health monitor stopped");
    }

    /// One pass over every check.
    pub async fn run_cycle(&self) {
        let mut components = Vec::with_capacity(self.checks.len());
        let mut worst = HealthStatus::Healthy;

        for check in &self.checks {
            let status = check.check().await;
            let action = match &status {
                HealthStatus::Unhealthy { .. } => {
                    error!(component = check.component_name(), status = %status, "Component unhealthy, attempting recovery");
                    let action = check.heal().await;
                    info!(component = check.component_name(), action = %action, "Recovery action taken");
                    Some(action)
                }
                HealthStatus::Degraded { .. } => {
                    warn!(component = check.component_name(), status = %status, "Component degraded");
                    None
                }
                HealthStatus::Healthy => {
                    debug!(component = check.component_name(), "Component healthy");
                    None
                }
            };

            if status.severity() > worst.severity() {
                worst = status.clone();
            }
            components.push(ComponentHealth {
                name: check.component_name().to_string(),
                status,
                last_checked: Instant::now(),
                last_action: action,
            });
        }

        let mut health = self.health.write().await;
        health.components = components;
        health.overall = worst;
        health.check_cycles += 1;
    }
}
