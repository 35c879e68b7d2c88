use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;
use crate::error::{AutotrimError, Result};
use crate::segment::Interval;

use super::{ConcatManifest, Cutter, Merger, Prober, Transform, TransformRunner};

/// Lines of tool stderr kept in error messages.
const DIAGNOSTIC_TAIL_LINES: usize = 12;

/// Prober, cutter, transformer and merger backed by ffmpeg/ffprobe binaries.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    reencode: bool,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegTools {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            reencode: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.ffmpeg_path, &config.ffprobe_path).with_reencode(config.reencode)
    }

    /// Re-encode cut segments for frame-accurate boundaries instead of
    /// copying streams.
    pub fn with_reencode(mut self, reencode: bool) -> Self {
        self.reencode = reencode;
        self
    }

    /// Check that both executables run.
    pub async fn check(&self) -> Result<()> {
        for tool in [&self.ffmpeg, &self.ffprobe] {
            run_captured(tool, &["-version".to_string()])
                .await
                .map_err(|e| {
                    AutotrimError::Tool(format!(
                        "{} is not usable. Install FFmpeg or set AUTOTRIM_FFMPEG/AUTOTRIM_FFPROBE. {e}",
                        tool.display()
                    ))
                })?;
        }
        debug!("FFmpeg and FFprobe are available");
        Ok(())
    }

    fn cut_args(&self, source: &Path, range: Interval, output: &Path) -> Vec<String> {
        let mut args = quiet_args();
        args.extend([
            "-y".to_string(),
            "-i".to_string(),
            path_arg(source),
            "-ss".to_string(),
            format!("{:.6}", range.start),
            "-to".to_string(),
            format!("{:.6}", range.end),
            "-map".to_string(),
            "0".to_string(),
        ]);
        if !self.reencode {
            args.extend(["-c".to_string(), "copy".to_string()]);
        }
        args.push(path_arg(output));
        args
    }

    fn transform_args(&self, input: &Path, transform: &Transform, output: &Path) -> Vec<String> {
        let mut args = quiet_args();
        args.extend(["-y".to_string(), "-i".to_string(), path_arg(input)]);
        args.extend(transform.ffmpeg_args());
        args.push(path_arg(output));
        args
    }

    fn concat_args(&self, manifest: &Path, output: &Path) -> Vec<String> {
        let mut args = quiet_args();
        args.extend([
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            path_arg(manifest),
            "-map".to_string(),
            "0".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            path_arg(output),
        ]);
        args
    }
}

#[async_trait]
impl Prober for FfmpegTools {
    async fn probe_duration(&self, file: &Path) -> Result<f64> {
        ensure_exists(file)?;
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path_arg(file),
        ];
        let output = run_captured(&self.ffprobe, &args)
            .await
            .map_err(AutotrimError::Probe)?;

        let text = String::from_utf8_lossy(&output.stdout);
        text.trim().parse::<f64>().map_err(|e| {
            AutotrimError::MalformedProbeOutput(format!(
                "Failed to parse duration '{}': {e}",
                text.trim()
            ))
        })
    }

    async fn probe_silence(
        &self,
        file: &Path,
        threshold_db: f64,
        min_silence_duration: f64,
    ) -> Result<String> {
        ensure_exists(file)?;
        let args = vec![
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-i".to_string(),
            path_arg(file),
            "-af".to_string(),
            format!("silencedetect=n={threshold_db}dB:d={min_silence_duration}"),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];
        let output = run_captured(&self.ffmpeg, &args)
            .await
            .map_err(AutotrimError::Probe)?;

        // silencedetect reports on stderr
        Ok(String::from_utf8_lossy(&output.stderr).into_owned())
    }

    async fn probe_keyframes(&self, file: &Path) -> Result<Vec<f64>> {
        ensure_exists(file)?;
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            "v:0".to_string(),
            "-show_entries".to_string(),
            "packet=pts_time,flags".to_string(),
            "-of".to_string(),
            "json".to_string(),
            path_arg(file),
        ];
        let output = run_captured(&self.ffprobe, &args)
            .await
            .map_err(AutotrimError::Probe)?;

        let keyframes = parse_keyframes(&output.stdout)?;
        debug!("{} keyframes in {}", keyframes.len(), file.display());
        Ok(keyframes)
    }
}

#[async_trait]
impl Cutter for FfmpegTools {
    async fn cut(&self, source: &Path, range: Interval, output: &Path) -> Result<()> {
        run_captured(&self.ffmpeg, &self.cut_args(source, range, output))
            .await
            .map_err(AutotrimError::Tool)?;
        ensure_created(output)
    }
}

#[async_trait]
impl TransformRunner for FfmpegTools {
    async fn apply(&self, input: &Path, transform: &Transform, output: &Path) -> Result<()> {
        run_captured(&self.ffmpeg, &self.transform_args(input, transform, output))
            .await
            .map_err(AutotrimError::Tool)?;
        ensure_created(output)
    }
}

#[async_trait]
impl Merger for FfmpegTools {
    async fn concat(&self, manifest: &ConcatManifest, output: &Path) -> Result<()> {
        run_captured(&self.ffmpeg, &self.concat_args(&manifest.path, output))
            .await
            .map_err(AutotrimError::Tool)?;
        ensure_created(output)
    }
}

#[derive(Debug, Deserialize)]
struct PacketList {
    #[serde(default)]
    packets: Vec<Packet>,
}

#[derive(Debug, Deserialize)]
struct Packet {
    pts_time: Option<String>,
    #[serde(default)]
    flags: String,
}

/// Keyframe timestamps from `ffprobe -show_entries packet=pts_time,flags -of json`.
fn parse_keyframes(json: &[u8]) -> Result<Vec<f64>> {
    let list: PacketList = serde_json::from_slice(json)?;
    let mut keyframes: Vec<f64> = list
        .packets
        .iter()
        .filter(|p| p.flags.contains('K'))
        .filter_map(|p| p.pts_time.as_deref()?.parse::<f64>().ok())
        .collect();

    // packets arrive in decode order
    keyframes.sort_by(f64::total_cmp);
    keyframes.dedup();
    Ok(keyframes)
}

fn quiet_args() -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "warning".to_string(),
    ]
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn ensure_exists(file: &Path) -> Result<()> {
    if !file.exists() {
        return Err(AutotrimError::FileNotFound(file.display().to_string()));
    }
    Ok(())
}

fn ensure_created(output: &Path) -> Result<()> {
    if !output.exists() {
        return Err(AutotrimError::Tool(format!(
            "Output file was not created: {}",
            output.display()
        )));
    }
    Ok(())
}

/// Run a tool to completion, capturing its output.
///
/// The error string carries the exit status and the tail of stderr so a
/// failing segment can be diagnosed from the error alone.
async fn run_captured(program: &Path, args: &[String]) -> std::result::Result<Output, String> {
    debug!("Running: {} {}", program.display(), args.join(" "));

    let output = Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| format!("Failed to run {}: {e}", program.display()))?;

    if !output.status.success() {
        return Err(format!(
            "{} exited with {}: {}",
            program.display(),
            output.status,
            stderr_tail(&output.stderr)
        ));
    }

    Ok(output)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
    lines[start..].join(" | ")
}
