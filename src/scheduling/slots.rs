//! Camera slot assignment
//!
//! Splits a due batch into groups started at staggered sub-second offsets so
//! that a large camera set does not hit the console in one burst.

use std::time::Duration;

use super::planner::RatePlan;
use crate::config::{DistributionConfig, DistributionStrategy};
use crate::types::CameraId;

/// Deterministic grouping of cameras into time slots.
///
/// Cameras are sorted by id and chunked contiguously; when the count does not
/// divide evenly, the first slots carry one extra camera.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotPlan {
    slots: Vec<Vec<CameraId>>,
    offset: Duration,
}

impl SlotPlan {
    /// Everything in slot 0.
    pub fn single(mut cameras: Vec<CameraId>) -> Self {
        cameras.sort();
        cameras.dedup();
        let slots = if cameras.is_empty() {
            Vec::new()
        } else {
            vec![cameras]
        };
        Self {
            slots,
            offset: Duration::ZERO,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Delay between the start of consecutive slots.
    pub fn offset(&self) -> Duration {
        self.offset
    }

    pub fn slots(&self) -> &[Vec<CameraId>] {
        &self.slots
    }

    /// Delay of slot `index` relative to the batch start.
    pub fn start_offset(&self, index: usize) -> Duration {
        self.offset * u32::try_from(index).unwrap_or(u32::MAX)
    }

    pub fn slot_of(&self, camera: &CameraId) -> Option<usize> {
        self.slots.iter().position(|s| s.contains(camera))
    }

    pub fn camera_count(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    /// Time from the first to the last slot start.
    pub fn spread(&self) -> Duration {
        self.start_offset(self.slot_count().saturating_sub(1))
    }
}

/// Build the slot plan for one batch.
pub fn assign(cameras: &[CameraId], plan: &RatePlan, config: &DistributionConfig) -> SlotPlan {
    let mut sorted = cameras.to_vec();
    sorted.sort();
    sorted.dedup();

    if !plan.distribute || sorted.len() <= plan.budget {
        return SlotPlan::single(sorted);
    }

    let n = sorted.len();
    let budget = plan.budget.max(1);
    let slot_count = n.div_ceil(budget);

    #[allow(clippy::cast_precision_loss)]
    let offset_secs = match config.strategy {
        // Unlike clamp, tolerates unordered or NaN bounds.
        DistributionStrategy::Adaptive => (config.window_secs / slot_count as f64)
            .max(config.min_offset_secs)
            .min(config.max_offset_secs),
        DistributionStrategy::Fixed => config.fixed_offset_secs,
    };

    let base = n / slot_count;
    let remainder = n % slot_count;
    let mut slots = Vec::with_capacity(slot_count);
    let mut rest = sorted.as_slice();
    for i in 0..slot_count {
        let size = base + usize::from(i < remainder);
        let (head, tail) = rest.split_at(size);
        slots.push(head.to_vec());
        rest = tail;
    }

    SlotPlan {
        slots,
        offset: Duration::try_from_secs_f64(offset_secs.max(0.0)).unwrap_or(Duration::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cams(n: usize) -> Vec<CameraId> {
        (0..n).map(|i| CameraId::new(format!("cam-{i:02}"))).collect()
    }

    fn rate_plan(camera_count: usize, budget: usize, distribute: bool) -> RatePlan {
        RatePlan {
            camera_count,
            budget,
            effective_rate: 8.0,
            max_simultaneous_intervals: 2,
            distribute,
            exceeds_limit: false,
        }
    }

    #[test]
    fn test_twelve_cameras_budget_four() {
        let plan = assign(&cams(12), &rate_plan(12, 4, true), &DistributionConfig::default());
        assert_eq!(plan.slot_count(), 3);
        assert!(plan.slots().iter().all(|s| s.len() == 4));
        // window 1.0 / 3 slots, inside [0.05, 0.5]
        assert!((plan.offset().as_secs_f64() - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_remainder_goes_to_first_slots() {
        let plan = assign(&cams(10), &rate_plan(10, 4, true), &DistributionConfig::default());
        let sizes: Vec<usize> = plan.slots().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(plan.camera_count(), 10);
    }

    #[test]
    fn test_deterministic_regardless_of_input_order() {
        let mut shuffled = cams(12);
        shuffled.reverse();
        shuffled.swap(2, 7);
        let cfg = DistributionConfig::default();
        let a = assign(&cams(12), &rate_plan(12, 4, true), &cfg);
        let b = assign(&shuffled, &rate_plan(12, 4, true), &cfg);
        assert_eq!(a, b);
        assert_eq!(a.slot_of(&CameraId::new("cam-00")), Some(0));
        assert_eq!(a.slot_of(&CameraId::new("cam-11")), Some(2));
    }

    #[test]
    fn test_adaptive_offset_clamped() {
        let cfg = DistributionConfig::default();
        let plan = assign(&cams(100), &rate_plan(100, 2, true), &cfg);
        assert_eq!(plan.slot_count(), 50);
        assert_eq!(plan.offset(), Duration::from_secs_f64(0.05));

        let plan = assign(&cams(12), &rate_plan(12, 6, true), &cfg);
        assert_eq!(plan.offset(), Duration::from_secs_f64(0.5));
    }

    #[test]
    fn test_fixed_strategy() {
        let cfg = DistributionConfig {
            strategy: DistributionStrategy::Fixed,
            fixed_offset_secs: 0.2,
            ..DistributionConfig::default()
        };
        let plan = assign(&cams(12), &rate_plan(12, 4, true), &cfg);
        assert_eq!(plan.start_offset(2), Duration::from_secs_f64(0.2) * 2);
    }

    #[test]
    fn test_non_finite_offsets_do_not_panic() {
        let cfg = DistributionConfig {
            max_offset_secs: f64::NAN,
            ..DistributionConfig::default()
        };
        let plan = assign(&cams(40), &rate_plan(40, 8, true), &cfg);
        assert_eq!(plan.slot_count(), 5);
        assert_eq!(plan.offset(), Duration::from_secs_f64(0.2));

        let cfg = DistributionConfig {
            strategy: DistributionStrategy::Fixed,
            fixed_offset_secs: f64::INFINITY,
            ..DistributionConfig::default()
        };
        let plan = assign(&cams(40), &rate_plan(40, 8, true), &cfg);
        assert_eq!(plan.offset(), Duration::ZERO);
    }

    #[test]
    fn test_no_distribution_single_slot() {
        let plan = assign(&cams(12), &rate_plan(12, 4, false), &DistributionConfig::default());
        assert_eq!(plan.slot_count(), 1);
        assert_eq!(plan.offset(), Duration::ZERO);
    }

    #[test]
    fn test_empty_batch() {
        let plan = assign(&[], &rate_plan(0, 4, true), &DistributionConfig::default());
        assert_eq!(plan.slot_count(), 0);
        assert_eq!(plan.spread(), Duration::ZERO);
    }
}
