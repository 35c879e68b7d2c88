pub mod plan;
pub mod refine;
pub mod timeline;

pub use plan::{
    build_advanced_plan, build_binary_plan, ClassHandling, PlanEntry, SegmentAction, SegmentClass,
    SegmentPlan,
};
pub use refine::{
    enforce_min_duration, merge_overlaps, pair_boundaries, refine, snap_to_keyframes,
};
pub use timeline::{format_timestamp, parse_detector_output, parse_timestamp, Timeline};

use serde::{Deserialize, Serialize};

/// Boundaries closer than this are treated as equal.
pub const TIME_EPSILON: f64 = 1e-6;

/// A span of source media in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Length of this interval in seconds, zero if inverted.
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// True when the interval covers no time at all.
    pub fn is_empty(&self) -> bool {
        self.duration() <= TIME_EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_duration() {
        assert_eq!(Interval::new(2.0, 5.5).duration(), 3.5);
        assert_eq!(Interval::new(5.0, 2.0).duration(), 0.0);
        assert!(Interval::new(3.0, 3.0).is_empty());
        assert!(!Interval::new(3.0, 3.5).is_empty());
    }
}
