use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AutotrimError, Result};
use crate::media::Transform;

use super::{Interval, TIME_EPSILON};

/// Classification of a plan entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentClass {
    Keep,
    Drop,
    /// Gap positions in the alternating timeline (silence in silence removal).
    Even,
    /// Interval positions in the alternating timeline (non-silence).
    Odd,
}

impl std::fmt::Display for SegmentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentClass::Keep => write!(f, "keep"),
            SegmentClass::Drop => write!(f, "drop"),
            SegmentClass::Even => write!(f, "even"),
            SegmentClass::Odd => write!(f, "odd"),
        }
    }
}

/// What to do with every segment of one class.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentAction {
    /// Leave the segment out of the output.
    #[default]
    Drop,
    /// Copy the segment through unchanged.
    Keep,
    /// Keep the segment after applying a transform to it.
    Transform(Transform),
}

impl std::fmt::Display for SegmentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentAction::Drop => write!(f, "drop"),
            SegmentAction::Keep => write!(f, "keep"),
            SegmentAction::Transform(transform) => write!(f, "{}", transform),
        }
    }
}

impl std::str::FromStr for SegmentAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drop" => Ok(SegmentAction::Drop),
            "keep" => Ok(SegmentAction::Keep),
            _ => s.parse::<Transform>().map(SegmentAction::Transform).map_err(|e| {
                format!(
                    "{}. Use 'drop', 'keep', 'speed:<factor>' or 'jumpcut:<interval>,<lasting>'",
                    e
                )
            }),
        }
    }
}

impl SegmentAction {
    /// Collapse transforms that would not change anything into `Keep`.
    pub fn normalized(self) -> Self {
        match self {
            SegmentAction::Transform(t) if t.is_identity() => SegmentAction::Keep,
            other => other,
        }
    }

    pub fn is_drop(&self) -> bool {
        matches!(self, SegmentAction::Drop)
    }

    pub fn transform(&self) -> Option<&Transform> {
        match self {
            SegmentAction::Transform(t) => Some(t),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            SegmentAction::Transform(t) => t.validate(),
            _ => Ok(()),
        }
    }
}

/// Per-class handling for the alternating (even/odd) plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassHandling {
    /// Gaps between canonical intervals.
    pub even: SegmentAction,
    /// The canonical intervals themselves.
    pub odd: SegmentAction,
}

impl Default for ClassHandling {
    fn default() -> Self {
        Self {
            even: SegmentAction::Drop,
            odd: SegmentAction::Keep,
        }
    }
}

impl ClassHandling {
    pub fn validate(&self) -> Result<()> {
        self.even.validate()?;
        self.odd.validate()?;
        if self.even.is_drop() && self.odd.is_drop() {
            return Err(AutotrimError::Config(
                "Both segment classes are dropped, the output would be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// One scheduled span of the final timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEntry {
    /// Position in concatenation order.
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub class: SegmentClass,
    pub action: SegmentAction,
}

impl PlanEntry {
    pub fn interval(&self) -> Interval {
        Interval::new(self.start, self.end)
    }

    pub fn duration(&self) -> f64 {
        self.interval().duration()
    }

    /// Whether this entry produces output (and therefore a job).
    pub fn is_kept(&self) -> bool {
        !self.action.is_drop()
    }

    pub fn transform(&self) -> Option<&Transform> {
        self.action.transform()
    }
}

/// Ordered entries covering `[0, duration]` without gaps or overlaps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentPlan {
    pub entries: Vec<PlanEntry>,
    pub duration: f64,
}

impl SegmentPlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn kept(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.is_kept())
    }

    pub fn kept_indices(&self) -> Vec<usize> {
        self.kept().map(|e| e.index).collect()
    }

    pub fn kept_duration(&self) -> f64 {
        self.kept().map(PlanEntry::duration).sum()
    }

    /// Check that entries tile `[0, duration]` exactly, in index order.
    pub fn is_contiguous(&self) -> bool {
        let mut cursor = 0.0;
        for (position, entry) in self.entries.iter().enumerate() {
            if entry.index != position
                || (entry.start - cursor).abs() > TIME_EPSILON
                || entry.end < entry.start
            {
                return false;
            }
            cursor = entry.end;
        }
        (cursor - self.duration).abs() <= TIME_EPSILON
    }
}

/// Build a keep/drop plan from canonical intervals.
///
/// With `keep_handle` the intervals are kept and the gaps around them
/// dropped; without it the roles swap, so the leading and trailing gaps
/// become the kept class.
pub fn build_binary_plan(intervals: &[Interval], duration: f64, keep_handle: bool) -> SegmentPlan {
    let (canonical, complement) = if keep_handle {
        (SegmentClass::Keep, SegmentClass::Drop)
    } else {
        (SegmentClass::Drop, SegmentClass::Keep)
    };

    let mut spans = Vec::with_capacity(intervals.len() * 2 + 1);
    let mut cursor = 0.0_f64;
    for interval in intervals {
        let start = interval.start.clamp(cursor, duration);
        let end = interval.end.clamp(start, duration);
        if start > cursor {
            spans.push((Interval::new(cursor, start), complement));
        }
        spans.push((Interval::new(start, end), canonical));
        cursor = end;
    }
    if cursor < duration {
        spans.push((Interval::new(cursor, duration), complement));
    }

    let spans = spans.into_iter().map(|(interval, class)| {
        let action = match class {
            SegmentClass::Drop => SegmentAction::Drop,
            _ => SegmentAction::Keep,
        };
        (interval, class, action)
    });

    finish_plan(spans, duration)
}

/// Build an alternating even/odd plan from canonical intervals.
///
/// Every boundary is doubled and the list is bracketed with `0` and
/// `duration`, so consecutive pairs alternate gap, interval, gap, ... and
/// are classified by position parity. Each class takes its action from
/// `handling`; zero-length entries are discarded.
pub fn build_advanced_plan(
    intervals: &[Interval],
    duration: f64,
    handling: &ClassHandling,
) -> SegmentPlan {
    let mut points = Vec::with_capacity(intervals.len() * 4 + 2);
    points.push(0.0);
    let mut floor = 0.0_f64;
    for interval in intervals {
        for boundary in [interval.start, interval.end] {
            let boundary = boundary.clamp(floor, duration);
            points.push(boundary);
            points.push(boundary);
            floor = boundary;
        }
    }
    points.push(duration.max(floor));

    let spans = points.chunks_exact(2).enumerate().map(|(position, pair)| {
        let (class, action) = if position % 2 == 0 {
            (SegmentClass::Even, handling.even.clone())
        } else {
            (SegmentClass::Odd, handling.odd.clone())
        };
        (Interval::new(pair[0], pair[1]), class, action.normalized())
    });

    finish_plan(spans, duration)
}

fn finish_plan(
    spans: impl Iterator<Item = (Interval, SegmentClass, SegmentAction)>,
    duration: f64,
) -> SegmentPlan {
    let entries: Vec<PlanEntry> = spans
        .filter(|(interval, _, _)| !interval.is_empty())
        .enumerate()
        .map(|(index, (interval, class, action))| PlanEntry {
            index,
            start: interval.start,
            end: interval.end,
            class,
            action,
        })
        .collect();

    let plan = SegmentPlan { entries, duration };
    debug!(
        "Planned {} segments ({} kept, {:.3}s of {:.3}s)",
        plan.len(),
        plan.kept().count(),
        plan.kept_duration(),
        duration
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: f64, end: f64) -> Interval {
        Interval::new(start, end)
    }

    fn spans(plan: &SegmentPlan) -> Vec<(f64, f64, SegmentClass)> {
        plan.entries.iter().map(|e| (e.start, e.end, e.class)).collect()
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("drop".parse::<SegmentAction>().unwrap(), SegmentAction::Drop);
        assert_eq!("KEEP".parse::<SegmentAction>().unwrap(), SegmentAction::Keep);
        assert_eq!(
            "speed:2.5".parse::<SegmentAction>().unwrap(),
            SegmentAction::Transform(Transform::Speed(2.5))
        );
        assert_eq!(
            "8x".parse::<SegmentAction>().unwrap(),
            SegmentAction::Transform(Transform::Speed(8.0))
        );
        assert_eq!(
            "speed:2x".parse::<SegmentAction>().unwrap(),
            SegmentAction::Transform(Transform::Speed(2.0))
        );
        assert!(matches!(
            "jumpcut:1,0.5".parse::<SegmentAction>().unwrap(),
            SegmentAction::Transform(Transform::JumpCut { .. })
        ));
        assert!("fast".parse::<SegmentAction>().is_err());
        assert!("speed:abc".parse::<SegmentAction>().is_err());
    }

    #[test]
    fn test_action_normalized() {
        assert_eq!(
            SegmentAction::Transform(Transform::Speed(1.0)).normalized(),
            SegmentAction::Keep
        );
        assert_eq!(SegmentAction::Drop.normalized(), SegmentAction::Drop);
    }

    #[test]
    fn test_class_handling_validation() {
        assert!(ClassHandling::default().validate().is_ok());
        let both_dropped = ClassHandling {
            even: SegmentAction::Drop,
            odd: SegmentAction::Drop,
        };
        assert!(both_dropped.validate().is_err());
        let bad_speed = ClassHandling {
            even: SegmentAction::Transform(Transform::Speed(0.0)),
            odd: SegmentAction::Keep,
        };
        assert!(bad_speed.validate().is_err());
    }

    #[test]
    fn test_binary_plan_keep() {
        let plan = build_binary_plan(&[iv(2.0, 4.0), iv(6.0, 8.0)], 10.0, true);
        assert_eq!(
            spans(&plan),
            vec![
                (0.0, 2.0, SegmentClass::Drop),
                (2.0, 4.0, SegmentClass::Keep),
                (4.0, 6.0, SegmentClass::Drop),
                (6.0, 8.0, SegmentClass::Keep),
                (8.0, 10.0, SegmentClass::Drop),
            ]
        );
        assert_eq!(plan.kept_indices(), vec![1, 3]);
        assert!(plan.is_contiguous());
    }

    #[test]
    fn test_binary_plan_inverted() {
        let plan = build_binary_plan(&[iv(2.0, 4.0), iv(6.0, 8.0)], 10.0, false);
        assert_eq!(plan.entries.first().unwrap().class, SegmentClass::Keep);
        assert_eq!(plan.entries.last().unwrap().class, SegmentClass::Keep);
        assert_eq!(plan.kept_indices(), vec![0, 2, 4]);
        assert_eq!(plan.kept_duration(), 6.0);
        assert!(plan.is_contiguous());
    }

    #[test]
    fn test_binary_plan_touching_edges() {
        let plan = build_binary_plan(&[iv(0.0, 3.0), iv(7.0, 10.0)], 10.0, true);
        assert_eq!(
            spans(&plan),
            vec![
                (0.0, 3.0, SegmentClass::Keep),
                (3.0, 7.0, SegmentClass::Drop),
                (7.0, 10.0, SegmentClass::Keep),
            ]
        );
        assert!(plan.is_contiguous());
    }

    #[test]
    fn test_binary_plan_empty_intervals() {
        let plan = build_binary_plan(&[], 10.0, true);
        assert_eq!(spans(&plan), vec![(0.0, 10.0, SegmentClass::Drop)]);
        assert_eq!(plan.kept().count(), 0);
    }

    #[test]
    fn test_advanced_plan_alternates() {
        let plan = build_advanced_plan(
            &[iv(1.0, 3.0), iv(5.0, 9.0)],
            10.0,
            &ClassHandling::default(),
        );
        assert_eq!(
            spans(&plan),
            vec![
                (0.0, 1.0, SegmentClass::Even),
                (1.0, 3.0, SegmentClass::Odd),
                (3.0, 5.0, SegmentClass::Even),
                (5.0, 9.0, SegmentClass::Odd),
                (9.0, 10.0, SegmentClass::Even),
            ]
        );
        assert_eq!(plan.kept_indices(), vec![1, 3]);
        assert!(plan.is_contiguous());
    }

    #[test]
    fn test_advanced_plan_drops_degenerate_entries() {
        let plan = build_advanced_plan(
            &[iv(0.0, 10.0), iv(12.0, 100.0)],
            100.0,
            &ClassHandling::default(),
        );
        assert_eq!(
            spans(&plan),
            vec![
                (0.0, 10.0, SegmentClass::Odd),
                (10.0, 12.0, SegmentClass::Even),
                (12.0, 100.0, SegmentClass::Odd),
            ]
        );
        let indices: Vec<usize> = plan.entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(plan.is_contiguous());
    }

    #[test]
    fn test_advanced_plan_per_class_transforms() {
        let handling = ClassHandling {
            even: SegmentAction::Transform(Transform::Speed(8.0)),
            odd: SegmentAction::Transform(Transform::Speed(1.0)),
        };
        let plan = build_advanced_plan(&[iv(2.0, 4.0)], 6.0, &handling);
        assert_eq!(plan.kept().count(), 3);
        assert_eq!(plan.entries[0].transform(), Some(&Transform::Speed(8.0)));
        assert_eq!(plan.entries[1].action, SegmentAction::Keep);
        assert_eq!(plan.entries[2].transform(), Some(&Transform::Speed(8.0)));
    }

    #[test]
    fn test_advanced_plan_clamps_out_of_range_keyframes() {
        let plan = build_advanced_plan(
            &[iv(-0.02, 3.0), iv(8.0, 10.04)],
            10.0,
            &ClassHandling::default(),
        );
        assert_eq!(plan.entries.first().unwrap().start, 0.0);
        assert_eq!(plan.entries.last().unwrap().end, 10.0);
        assert!(plan.is_contiguous());
    }

    #[test]
    fn test_plan_coverage_for_many_intervals() {
        let intervals: Vec<Interval> = (0..25)
            .map(|n| iv(n as f64 * 4.0 + 0.5, n as f64 * 4.0 + 2.75))
            .collect();
        for keep in [true, false] {
            let plan = build_binary_plan(&intervals, 100.0, keep);
            assert!(plan.is_contiguous());
            let covered: f64 = plan.entries.iter().map(PlanEntry::duration).sum();
            assert!((covered - 100.0).abs() < 1e-9);
        }
        let plan = build_advanced_plan(&intervals, 100.0, &ClassHandling::default());
        assert!(plan.is_contiguous());
    }
}
