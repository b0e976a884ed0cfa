//! Rate-limit planner
//!
//! Pure function from camera count, external rate limit and the configured
//! intervals to a concurrency budget and a distribution recommendation.

use crate::config::{DistributionConfig, RateLimitConfig};
use crate::types::IntervalGraph;

/// Planner output. Logged at startup and recomputed per batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatePlan {
    pub camera_count: usize,
    /// Maximum concurrent in-flight captures across all runners.
    pub budget: usize,
    /// `requests_per_second * safety_buffer`.
    pub effective_rate: f64,
    pub max_simultaneous_intervals: usize,
    /// Spread the batch over several slots.
    pub distribute: bool,
    /// The budget times the simultaneous intervals exceeds the external limit.
    pub exceeds_limit: bool,
}

/// Number of intervals that can be due on the same tick.
///
/// All intervals share one tick origin, so every one of them is due on tick 0
/// and again on every common multiple of their periods: they all coincide.
pub fn max_simultaneous_intervals(graph: &IntervalGraph) -> usize {
    graph.intervals().len().max(1)
}

pub fn plan(
    camera_count: usize,
    rate: &RateLimitConfig,
    distribution: &DistributionConfig,
    graph: &IntervalGraph,
) -> RatePlan {
    let max_simultaneous = max_simultaneous_intervals(graph);
    let effective_rate = rate.requests_per_second * rate.safety_buffer;

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let computed = (effective_rate / max_simultaneous as f64).floor().max(0.0) as usize;
    let mut budget = computed.max(1);
    if let Some(cap) = rate.max_concurrent_override {
        budget = budget.min(cap.max(1));
    }

    #[allow(clippy::cast_precision_loss)]
    let exceeds_limit = (budget * max_simultaneous) as f64 > rate.requests_per_second;

    let distribute =
        distribution.enabled && camera_count > distribution.min_cameras && camera_count > budget;

    RatePlan {
        camera_count,
        budget,
        effective_rate,
        max_simultaneous_intervals: max_simultaneous,
        distribute,
        exceeds_limit,
    }
}
