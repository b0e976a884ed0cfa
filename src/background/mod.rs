//! Background services: health checks and recovery
//!
//! Runs as a tokio task that checks component health every 30 seconds and
//! recovers automatically where possible.

pub mod health;

pub use health::{
    ComponentHealth, DiscoveryHealthCheck, DiskHealthCheck, HealAction, HealthCheck, HealthMonitor,
    HealthStatus, LimiterHealthCheck, SystemHealth,
};
