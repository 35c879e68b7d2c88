use tracing::debug;

use crate::error::{AutotrimError, Result};

use super::{Interval, TIME_EPSILON};

/// Turn a flat `[start, end, ...]` list into intervals.
pub fn pair_boundaries(boundaries: &[f64]) -> Result<Vec<Interval>> {
    if boundaries.len() % 2 != 0 {
        return Err(AutotrimError::OddIntervalList(boundaries.len()));
    }

    Ok(boundaries
        .chunks_exact(2)
        .map(|pair| Interval::new(pair[0], pair[1]))
        .collect())
}

/// Refine raw non-silent boundaries into a canonical interval list.
///
/// Zero-length intervals (a silence touching either end of the media) are
/// discarded first, then three passes run in a fixed order: minimum-duration
/// widening, keyframe snapping, overlap merging. Only snapping can introduce
/// overlaps, so the merge has to come last. An empty result means nothing
/// usable is left.
pub fn refine(
    boundaries: &[f64],
    min_duration: f64,
    duration: f64,
    keyframes: &[f64],
) -> Result<Vec<Interval>> {
    let intervals: Vec<Interval> = pair_boundaries(boundaries)?
        .into_iter()
        .filter(|interval| !interval.is_empty())
        .collect();
    let widened = enforce_min_duration(&intervals, min_duration, duration)?;
    let snapped = snap_to_keyframes(&widened, keyframes);
    let merged = merge_overlaps(&snapped);

    debug!(
        "Refined {} intervals -> {} widened -> {} after keyframe merge",
        intervals.len(),
        widened.len(),
        merged.len()
    );

    Ok(merged)
}

/// Widen every interval shorter than `min_duration`.
///
/// Short intervals grow by half the deficit on each side, clamped to
/// `[0, duration]`. The last interval has no right neighbour and grows
/// backward only. Returns an empty list when the overall span is still
/// shorter than `min_duration`.
pub fn enforce_min_duration(
    intervals: &[Interval],
    min_duration: f64,
    duration: f64,
) -> Result<Vec<Interval>> {
    if !min_duration.is_finite() || min_duration < 0.0 {
        return Err(AutotrimError::InvalidMinDuration(min_duration));
    }

    if min_duration == 0.0 || intervals.is_empty() {
        return Ok(intervals.to_vec());
    }

    let last_index = intervals.len() - 1;
    let mut widened = Vec::with_capacity(intervals.len());

    for (i, interval) in intervals.iter().enumerate() {
        if interval.duration() + TIME_EPSILON >= min_duration {
            widened.push(*interval);
            continue;
        }

        if i == last_index {
            let start = (interval.end - min_duration).max(0.0);
            widened.push(Interval::new(start, interval.end));
            continue;
        }

        let deficit = min_duration - interval.duration();
        let mut start = (interval.start - deficit / 2.0).max(0.0);
        let end = (start + min_duration).min(duration);
        // Clamped at the end of the media, give the remainder back on the left.
        if end - start + TIME_EPSILON < min_duration {
            start = (end - min_duration).max(0.0);
        }
        widened.push(Interval::new(start, end));
    }

    let span = match (widened.first(), widened.last()) {
        (Some(first), Some(last)) => last.end - first.start,
        _ => 0.0,
    };
    if span + TIME_EPSILON < min_duration {
        debug!(
            "Overall span {:.3}s is below the {:.3}s minimum, nothing usable",
            span, min_duration
        );
        return Ok(Vec::new());
    }

    Ok(widened)
}

/// Forward-only position in a sorted keyframe list.
///
/// Both boundaries and keyframes ascend, so the list is normally scanned
/// once. If a boundary moves backward (widening can cross a neighbour) the
/// cursor rewinds with a binary search.
struct KeyframeCursor<'a> {
    keyframes: &'a [f64],
    position: usize,
}

impl<'a> KeyframeCursor<'a> {
    fn new(keyframes: &'a [f64]) -> Self {
        Self {
            keyframes,
            position: 0,
        }
    }

    /// Latest keyframe at or before `time`, or `time` itself if none.
    fn floor(&mut self, time: f64) -> f64 {
        let kf = self.keyframes;
        while self.position < kf.len() && kf[self.position] <= time {
            self.position += 1;
        }
        if self.position > 0 && kf[self.position - 1] > time {
            self.position = kf.partition_point(|&k| k <= time);
        }
        if self.position > 0 {
            kf[self.position - 1]
        } else {
            time
        }
    }

    /// Earliest keyframe at or after `time`, or `time` itself if none.
    fn ceil(&mut self, time: f64) -> f64 {
        let kf = self.keyframes;
        while self.position < kf.len() && kf[self.position] < time {
            self.position += 1;
        }
        if self.position > 0 && kf[self.position - 1] >= time {
            self.position = kf.partition_point(|&k| k < time);
        }
        kf.get(self.position).copied().unwrap_or(time)
    }
}

/// Move starts back and ends forward onto the nearest keyframes.
///
/// Snapping only ever widens an interval. Adjacent intervals may overlap
/// afterwards; [`merge_overlaps`] resolves that.
pub fn snap_to_keyframes(intervals: &[Interval], keyframes: &[f64]) -> Vec<Interval> {
    if keyframes.is_empty() {
        return intervals.to_vec();
    }

    let mut cursor = KeyframeCursor::new(keyframes);
    intervals
        .iter()
        .map(|interval| {
            let start = cursor.floor(interval.start);
            let end = cursor.ceil(interval.end);
            Interval::new(start, end)
        })
        .collect()
}

/// Sort by start and merge anything that touches or overlaps.
pub fn merge_overlaps(intervals: &[Interval]) -> Vec<Interval> {
    let mut sorted = intervals.to_vec();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        if let Some(current) = merged.last_mut() {
            if interval.start <= current.end + TIME_EPSILON {
                current.end = current.end.max(interval.end);
                continue;
            }
        }
        merged.push(interval);
    }

    merged
}
