use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::error::{AutotrimError, Result};

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Duration: (.+?),").expect("Invalid regex"));

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"silence_(?:start|end): (-?[0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)")
        .expect("Invalid regex")
});

static SILENCE_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"silence_duration: ([0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)").expect("Invalid regex")
});

/// Non-silent boundaries extracted from one silence detector run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeline {
    /// Even-length `[start, end, start, end, ...]` list of non-silent spans.
    pub boundaries: Vec<f64>,
    /// Total source duration in seconds.
    pub duration: f64,
    /// Sum of all reported silence durations.
    pub silence_total: f64,
}

impl Timeline {
    /// Number of non-silent intervals described by the boundary list.
    pub fn interval_count(&self) -> usize {
        self.boundaries.len() / 2
    }
}

/// Parse `ffmpeg -af silencedetect` stderr into a [`Timeline`].
///
/// Markers are read as a flat list of cut points in the order they appear,
/// bracketed by `0.0` and the reported duration. A trailing silence that the
/// detector never closed is closed at `duration`.
pub fn parse_detector_output(raw: &str) -> Result<Timeline> {
    let duration_text = DURATION_RE
        .captures(raw)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim())
        .ok_or_else(|| {
            AutotrimError::MalformedProbeOutput("no 'Duration:' line in detector output".to_string())
        })?;

    let duration = parse_timestamp(duration_text).map_err(|_| {
        AutotrimError::MalformedProbeOutput(format!("unreadable duration '{duration_text}'"))
    })?;

    let mut markers = Vec::new();
    for cap in MARKER_RE.captures_iter(raw) {
        let text = &cap[1];
        let value: f64 = text.parse().map_err(|e| {
            AutotrimError::MalformedProbeOutput(format!("bad silence marker '{text}': {e}"))
        })?;
        markers.push(value.clamp(0.0, duration));
    }

    if markers.len() % 2 == 1 {
        debug!("Silence runs to end of input, closing it at {:.3}s", duration);
        markers.push(duration);
    }

    let silence_total = SILENCE_DURATION_RE
        .captures_iter(raw)
        .filter_map(|cap| cap[1].parse::<f64>().ok())
        .sum();

    let mut boundaries = Vec::with_capacity(markers.len() + 2);
    boundaries.push(0.0);
    boundaries.extend(markers);
    boundaries.push(duration);

    debug!(
        "Parsed {} non-silent intervals over {:.3}s ({:.3}s silent)",
        boundaries.len() / 2,
        duration,
        silence_total
    );

    Ok(Timeline {
        boundaries,
        duration,
        silence_total,
    })
}

/// Parse `HH:MM:SS(.fff)`, `MM:SS(.fff)` or plain seconds.
pub fn parse_timestamp(text: &str) -> Result<f64> {
    let text = text.trim();
    let invalid = || AutotrimError::Config(format!("Invalid timestamp: '{text}'"));

    let mut total = 0.0;
    for part in text.split(':') {
        let value: f64 = part.parse().map_err(|_| invalid())?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid());
        }
        total = total * 60.0 + value;
    }

    if text.split(':').count() > 3 {
        return Err(invalid());
    }

    Ok(total)
}

/// Format seconds as `HH:MM:SS.mmm`.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{hours:02}:{minutes:02}:{secs:02}.{millis:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSCRIPT: &str = "\
Input #0, matroska,webm, from 'talk.mkv':
  Duration: 00:01:40.00, start: 0.000000, bitrate: 1200 kb/s
  Stream #0:0: Video: h264 (High), yuv420p, 1920x1080
  Stream #0:1: Audio: aac (LC), 48000 Hz, stereo
[silencedetect @ 0x55d0c8a3c6c0] silence_start: 10
[silencedetect @ 0x55d0c8a3c6c0] silence_end: 12 | silence_duration: 2
size=N/A time=00:01:40.00 bitrate=N/A speed= 512x
";

    #[test]
    fn test_parse_basic_transcript() {
        let timeline = parse_detector_output(TRANSCRIPT).unwrap();
        assert_eq!(timeline.duration, 100.0);
        assert_eq!(timeline.boundaries, vec![0.0, 10.0, 12.0, 100.0]);
        assert_eq!(timeline.silence_total, 2.0);
        assert_eq!(timeline.interval_count(), 2);
    }

    #[test]
    fn test_parse_without_silence() {
        let raw = "  Duration: 00:00:30.50, start: 0.000000, bitrate: 96 kb/s\n";
        let timeline = parse_detector_output(raw).unwrap();
        assert_eq!(timeline.boundaries, vec![0.0, 30.5]);
        assert_eq!(timeline.silence_total, 0.0);
    }

    #[test]
    fn test_parse_missing_duration() {
        let raw = "[silencedetect @ 0x1] silence_start: 3.2\n";
        match parse_detector_output(raw) {
            Err(AutotrimError::MalformedProbeOutput(_)) => {}
            other => panic!("Expected MalformedProbeOutput, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_unavailable_duration() {
        let raw = "  Duration: N/A, start: 0.000000, bitrate: N/A\n";
        assert!(matches!(
            parse_detector_output(raw),
            Err(AutotrimError::MalformedProbeOutput(_))
        ));
    }

    #[test]
    fn test_parse_closes_trailing_silence() {
        let raw = "\
  Duration: 00:00:20.00, start: 0.000000
[silencedetect @ 0x1] silence_start: 4.5
[silencedetect @ 0x1] silence_end: 6 | silence_duration: 1.5
[silencedetect @ 0x1] silence_start: 18.25
";
        let timeline = parse_detector_output(raw).unwrap();
        assert_eq!(timeline.boundaries, vec![0.0, 4.5, 6.0, 18.25, 20.0, 20.0]);
        assert_eq!(timeline.boundaries.len() % 2, 0);
    }

    #[test]
    fn test_parse_clamps_negative_marker() {
        let raw = "\
  Duration: 00:00:08.00, start: 0.000000
[silencedetect @ 0x1] silence_start: -0.0213333
[silencedetect @ 0x1] silence_end: 1.25 | silence_duration: 1.27133
";
        let timeline = parse_detector_output(raw).unwrap();
        assert_eq!(timeline.boundaries, vec![0.0, 0.0, 1.25, 8.0]);
    }

    #[test]
    fn test_parse_is_even_and_bracketed() {
        let mut raw = String::from("  Duration: 00:10:00.00, start: 0.000000\n");
        for n in 0..7 {
            raw.push_str(&format!("[silencedetect @ 0x1] silence_start: {}\n", n * 60 + 10));
            if n != 6 {
                raw.push_str(&format!(
                    "[silencedetect @ 0x1] silence_end: {} | silence_duration: 5\n",
                    n * 60 + 15
                ));
            }
        }
        let timeline = parse_detector_output(&raw).unwrap();
        assert_eq!(timeline.boundaries.len() % 2, 0);
        assert!(timeline.boundaries.len() >= 2);
        assert_eq!(timeline.boundaries.first(), Some(&0.0));
        assert_eq!(timeline.boundaries.last(), Some(&600.0));
    }

    #[test]
    fn test_parse_timestamp_forms() {
        assert_eq!(parse_timestamp("00:01:40.00").unwrap(), 100.0);
        assert_eq!(parse_timestamp("01:03:46").unwrap(), 3826.0);
        assert_eq!(parse_timestamp("02:30").unwrap(), 150.0);
        assert_eq!(parse_timestamp("12.5").unwrap(), 12.5);
        assert!(parse_timestamp("N/A").is_err());
        assert!(parse_timestamp("1:2:3:4").is_err());
        assert!(parse_timestamp("-4").is_err());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00:00.000");
        assert_eq!(format_timestamp(100.25), "00:01:40.250");
        assert_eq!(format_timestamp(3826.0), "01:03:46.000");
    }
}
