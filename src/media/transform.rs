use serde::{Deserialize, Serialize};

use crate::error::{AutotrimError, Result};

/// Above this multiplier frames are decimated instead of retimed.
const SPEEDUP_METHOD_THRESHOLD: f64 = 4.0;

/// Smallest factor a single `atempo` filter accepts.
const ATEMPO_MIN: f64 = 0.5;

/// Keyframe interval forced into transformed segments, in seconds.
const FORCED_KEYFRAME_INTERVAL: u32 = 2;

/// A per-segment re-encode applied after the segment is cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    /// Play the segment `n` times faster (or slower when below 1).
    Speed(f64),
    /// Alternate two frame-selection rates in a repeating cycle.
    ///
    /// For the first `interval` seconds of every `interval + lasting` cycle
    /// only every `interval_multiple`-th frame is kept, for the remaining
    /// `lasting` seconds every `lasting_multiple`-th. A multiple of 0 drops
    /// that part of the cycle entirely.
    JumpCut {
        interval: f64,
        lasting: f64,
        interval_multiple: u32,
        lasting_multiple: u32,
    },
    /// Raw transcoder output arguments.
    Args(Vec<String>),
}

impl std::fmt::Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transform::Speed(multiple) => write!(f, "speed:{}", multiple),
            Transform::JumpCut {
                interval,
                lasting,
                interval_multiple,
                lasting_multiple,
            } => write!(
                f,
                "jumpcut:{},{},{},{}",
                interval, lasting, interval_multiple, lasting_multiple
            ),
            Transform::Args(args) => write!(f, "args:{}", args.join(" ")),
        }
    }
}

impl std::str::FromStr for Transform {
    type Err = String;

    /// Accepts `speed:<factor>`, `<factor>x`, `jumpcut:<interval>,<lasting>[,<m1>[,<m2>]]`
    /// and `args:<arg> <arg> ...`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let text = s.trim();
        let lower = text.to_lowercase();

        if let Some(rest) = lower.strip_prefix("jumpcut:") {
            return parse_jumpcut(rest).ok_or_else(|| {
                format!(
                    "Invalid jump cut '{}'. Use 'jumpcut:<interval>,<lasting>[,<multiple>,<multiple>]'",
                    s
                )
            });
        }

        if lower.starts_with("args:") {
            let args: Vec<String> = text["args:".len()..]
                .split_whitespace()
                .map(str::to_string)
                .collect();
            return Ok(Transform::Args(args));
        }

        let factor = match lower.strip_prefix("speed:") {
            Some(rest) => rest.strip_suffix('x').unwrap_or(rest),
            None => lower
                .strip_suffix('x')
                .ok_or_else(|| format!("Unknown transform: {}", s))?,
        };
        factor
            .trim()
            .parse::<f64>()
            .map(Transform::Speed)
            .map_err(|_| format!("Invalid speed factor in '{}'", s))
    }
}

/// Defaults match a plain jump cut: skip the interval, keep the lasting part.
fn parse_jumpcut(params: &str) -> Option<Transform> {
    let parts: Vec<&str> = params.split(',').map(str::trim).collect();
    if !(2..=4).contains(&parts.len()) {
        return None;
    }
    Some(Transform::JumpCut {
        interval: parts[0].parse().ok()?,
        lasting: parts[1].parse().ok()?,
        interval_multiple: parts.get(2).map_or(Some(0), |p| p.parse().ok())?,
        lasting_multiple: parts.get(3).map_or(Some(1), |p| p.parse().ok())?,
    })
}

impl Transform {
    pub fn validate(&self) -> Result<()> {
        match self {
            Transform::Speed(multiple) => {
                if !multiple.is_finite() || *multiple <= 0.0 {
                    return Err(AutotrimError::Config(format!(
                        "Speed factor must be greater than 0, got {}",
                        multiple
                    )));
                }
            }
            Transform::JumpCut {
                interval, lasting, ..
            } => {
                let positive = |v: &f64| v.is_finite() && *v > 0.0;
                if !positive(interval) || !positive(lasting) {
                    return Err(AutotrimError::Config(format!(
                        "Jump cut interval and lasting must be greater than 0, got {} and {}",
                        interval, lasting
                    )));
                }
            }
            Transform::Args(args) => {
                if args.is_empty() {
                    return Err(AutotrimError::Config(
                        "Transform arguments must not be empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// True when applying this transform would not change the segment.
    pub fn is_identity(&self) -> bool {
        matches!(self, Transform::Speed(multiple) if *multiple == 1.0)
    }

    /// Output arguments for an ffmpeg invocation applying this transform.
    pub fn ffmpeg_args(&self) -> Vec<String> {
        match self {
            Transform::Speed(multiple) => speed_args(*multiple),
            Transform::JumpCut {
                interval,
                lasting,
                interval_multiple,
                lasting_multiple,
            } => jumpcut_args(*interval, *lasting, *interval_multiple, *lasting_multiple),
            Transform::Args(args) => args.clone(),
        }
    }
}

fn forced_keyframe_args() -> [String; 2] {
    [
        "-force_key_frames".to_string(),
        format!("expr:gte(t,n_forced*{FORCED_KEYFRAME_INTERVAL})"),
    ]
}

fn speed_args(multiple: f64) -> Vec<String> {
    let (video, audio) = if multiple > SPEEDUP_METHOD_THRESHOLD {
        (
            format!("select='not(mod(n,{multiple}))',setpts=N/FRAME_RATE/TB"),
            format!("aselect='not(mod(n,{multiple}))',asetpts=N/SR/TB"),
        )
    } else {
        (format!("setpts={}*PTS", 1.0 / multiple), atempo_chain(multiple))
    };

    vec![
        "-vf".to_string(),
        video,
        "-af".to_string(),
        audio,
        "-map".to_string(),
        "0".to_string(),
        "-shortest".to_string(),
        "-fps_mode".to_string(),
        "vfr".to_string(),
    ]
    .into_iter()
    .chain(forced_keyframe_args())
    .collect()
}

/// Keep every `multiple`-th frame, or none at all for 0.
fn frame_filter(multiple: u32) -> String {
    if multiple == 0 {
        "0".to_string()
    } else {
        format!("not(mod(n,{multiple}))")
    }
}

fn jumpcut_args(
    interval: f64,
    lasting: f64,
    interval_multiple: u32,
    lasting_multiple: u32,
) -> Vec<String> {
    let select = format!(
        "if(lte(mod(t,{}),{}),{},{})",
        interval + lasting,
        interval,
        frame_filter(interval_multiple),
        frame_filter(lasting_multiple)
    );

    vec![
        "-vf".to_string(),
        format!("select='{select}',setpts=N/FRAME_RATE/TB"),
        "-af".to_string(),
        format!("aselect='{select}',asetpts=N/SR/TB"),
        "-map".to_string(),
        "0".to_string(),
        "-shortest".to_string(),
        "-fps_mode".to_string(),
        "vfr".to_string(),
        "-async".to_string(),
        "1".to_string(),
    ]
    .into_iter()
    .chain(forced_keyframe_args())
    .collect()
}

/// `atempo` only slows down to 0.5x per instance, so chain it.
fn atempo_chain(multiple: f64) -> String {
    let mut filters = Vec::new();
    let mut remaining = multiple;
    while remaining < ATEMPO_MIN {
        filters.push(format!("atempo={ATEMPO_MIN}"));
        remaining /= ATEMPO_MIN;
    }
    filters.push(format!("atempo={remaining}"));
    filters.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_retime_args() {
        let args = Transform::Speed(2.0).ffmpeg_args();
        assert_eq!(args[0], "-vf");
        assert_eq!(args[1], "setpts=0.5*PTS");
        assert_eq!(args[3], "atempo=2");
        assert!(args.contains(&"-shortest".to_string()));
        assert!(args.contains(&"expr:gte(t,n_forced*2)".to_string()));
    }

    #[test]
    fn test_speed_decimate_args() {
        let args = Transform::Speed(10.0).ffmpeg_args();
        assert_eq!(args[1], "select='not(mod(n,10))',setpts=N/FRAME_RATE/TB");
        assert_eq!(args[3], "aselect='not(mod(n,10))',asetpts=N/SR/TB");
    }

    #[test]
    fn test_jumpcut_args() {
        let args = Transform::JumpCut {
            interval: 1.0,
            lasting: 2.0,
            interval_multiple: 0,
            lasting_multiple: 3,
        }
        .ffmpeg_args();
        assert_eq!(
            args[1],
            "select='if(lte(mod(t,3),1),0,not(mod(n,3)))',setpts=N/FRAME_RATE/TB"
        );
        assert_eq!(
            args[3],
            "aselect='if(lte(mod(t,3),1),0,not(mod(n,3)))',asetpts=N/SR/TB"
        );
        assert!(args.windows(2).any(|w| w[0] == "-async" && w[1] == "1"));
        assert_eq!(args.last().unwrap(), "expr:gte(t,n_forced*2)");
    }

    #[test]
    fn test_parse_transforms() {
        assert_eq!("speed:2.5".parse::<Transform>().unwrap(), Transform::Speed(2.5));
        assert_eq!("8x".parse::<Transform>().unwrap(), Transform::Speed(8.0));
        assert_eq!("speed:2x".parse::<Transform>().unwrap(), Transform::Speed(2.0));
        assert_eq!("SPEED:3X".parse::<Transform>().unwrap(), Transform::Speed(3.0));
        assert_eq!(
            "jumpcut:1.5,0.5".parse::<Transform>().unwrap(),
            Transform::JumpCut {
                interval: 1.5,
                lasting: 0.5,
                interval_multiple: 0,
                lasting_multiple: 1,
            }
        );
        assert_eq!(
            "jumpcut:2, 1, 4, 2".parse::<Transform>().unwrap(),
            Transform::JumpCut {
                interval: 2.0,
                lasting: 1.0,
                interval_multiple: 4,
                lasting_multiple: 2,
            }
        );
        assert_eq!(
            "args:-an -c:v libx264".parse::<Transform>().unwrap(),
            Transform::Args(vec!["-an".into(), "-c:v".into(), "libx264".into()])
        );
        assert!("jumpcut:1".parse::<Transform>().is_err());
        assert!("jumpcut:1,2,-1".parse::<Transform>().is_err());
        assert!("speed:fast".parse::<Transform>().is_err());
        assert!("fast".parse::<Transform>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        let jumpcut = Transform::JumpCut {
            interval: 1.5,
            lasting: 0.25,
            interval_multiple: 2,
            lasting_multiple: 1,
        };
        assert_eq!(jumpcut.to_string(), "jumpcut:1.5,0.25,2,1");
        assert_eq!(jumpcut.to_string().parse::<Transform>().unwrap(), jumpcut);
    }

    #[test]
    fn test_slowdown_chains_atempo() {
        assert_eq!(atempo_chain(0.25), "atempo=0.5,atempo=0.5");
        assert_eq!(atempo_chain(1.5), "atempo=1.5");
    }

    #[test]
    fn test_validate() {
        assert!(Transform::Speed(1.5).validate().is_ok());
        assert!(Transform::Speed(0.0).validate().is_err());
        assert!(Transform::Speed(-2.0).validate().is_err());
        assert!(Transform::Speed(f64::NAN).validate().is_err());
        assert!(Transform::Args(vec![]).validate().is_err());
        let jumpcut = |interval, lasting| Transform::JumpCut {
            interval,
            lasting,
            interval_multiple: 0,
            lasting_multiple: 1,
        };
        assert!(jumpcut(1.0, 0.5).validate().is_ok());
        assert!(jumpcut(0.0, 0.5).validate().is_err());
        assert!(jumpcut(1.0, -0.5).validate().is_err());
        assert!(Transform::Args(vec!["-an".to_string()]).validate().is_ok());
    }

    #[test]
    fn test_identity() {
        assert!(Transform::Speed(1.0).is_identity());
        assert!(!Transform::Speed(1.01).is_identity());
        assert!(!Transform::Args(vec!["-an".to_string()]).is_identity());
    }

    #[test]
    fn test_display() {
        assert_eq!(Transform::Speed(2.5).to_string(), "speed:2.5");
        assert_eq!(
            Transform::Args(vec!["-an".to_string(), "-sn".to_string()]).to_string(),
            "args:-an -sn"
        );
    }
}
