//! Capture scheduling
//!
//! - [`clock`]: one logical tick per second, broadcast to every runner
//! - [`planner`]: concurrency budget from the external rate limit
//! - [`slots`]: staggered start groups for large camera sets
//! - [`limiter`]: system-wide in-flight request bound
//! - [`registry`]: cross-interval image reuse
//! - [`runner`]: per-interval due batches, retries and outcomes

pub mod clock;
pub mod limiter;
pub mod planner;
pub mod registry;
pub mod runner;
pub mod slots;

pub use clock::{Tick, TickClock};
pub use limiter::{ConcurrencyLimiter, LimiterPermit};
pub use planner::RatePlan;
pub use registry::{EntryState, PublishResult, RegistryKey, ReuseRegistry, WaitResult};
pub use runner::{BatchReport, IntervalRunner, RunnerContext, RunnerState};
pub use slots::SlotPlan;
