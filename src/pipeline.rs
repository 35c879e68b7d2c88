use crate::config::Config;
use crate::error::{AutotrimError, Result};
use crate::execute::{Assembler, ExecutionEngine, ExecutionStats};
use crate::media::{ConcatManifest, Merger, Prober, Toolchain};
use crate::segment::{
    build_advanced_plan, build_binary_plan, format_timestamp, merge_overlaps, pair_boundaries,
    parse_detector_output, refine, ClassHandling, Interval, SegmentPlan, Timeline,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Which user-facing operation a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CutSilence,
    KeepOrRemove,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::CutSilence => write!(f, "cut silence"),
            Operation::KeepOrRemove => write!(f, "keep or remove"),
        }
    }
}

impl Operation {
    /// Appended to the input file stem to name the default output.
    pub fn suffix(&self) -> &'static str {
        match self {
            Operation::CutSilence => "_cut_silence",
            Operation::KeepOrRemove => "_keep_or_remove",
        }
    }

    /// `<stem><suffix>.<ext>` next to `input`.
    pub fn default_output(&self, input: &Path) -> PathBuf {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        let name = match input.extension() {
            Some(ext) => format!("{}{}.{}", stem, self.suffix(), ext.to_string_lossy()),
            None => format!("{}{}", stem, self.suffix()),
        };
        input.with_file_name(name)
    }
}

/// Silence detection and per-class handling for [`remove_silence`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SilenceOptions {
    /// Silence threshold in dB.
    pub threshold_db: f64,
    /// Shortest pause counted as silence, in seconds.
    pub min_silence_duration: f64,
    /// Shortest kept interval, in seconds.
    pub min_segment_duration: f64,
    /// What happens to silent (even) and non-silent (odd) segments.
    pub handling: ClassHandling,
}

impl Default for SilenceOptions {
    fn default() -> Self {
        Self {
            threshold_db: -35.0,
            min_silence_duration: 0.2,
            min_segment_duration: 0.0,
            handling: ClassHandling::default(),
        }
    }
}

impl SilenceOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold_db: config.threshold_db,
            min_silence_duration: config.min_silence_duration,
            min_segment_duration: config.min_segment_duration,
            handling: ClassHandling::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.min_segment_duration.is_finite() || self.min_segment_duration < 0.0 {
            return Err(AutotrimError::InvalidMinDuration(self.min_segment_duration));
        }
        if !self.min_silence_duration.is_finite() || self.min_silence_duration <= 0.0 {
            return Err(AutotrimError::Config(format!(
                "Minimum silence duration must be greater than 0, got {}",
                self.min_silence_duration
            )));
        }
        if !self.threshold_db.is_finite() {
            return Err(AutotrimError::Config(format!(
                "Invalid silence threshold: {}",
                self.threshold_db
            )));
        }
        self.handling.validate()
    }
}

/// Execution settings shared by every operation.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of segments cut at once.
    pub concurrency: usize,
    /// Show progress bars.
    pub show_progress: bool,
    /// Where the per-run work directory is created. System temp if unset.
    pub work_root: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: Config::default().concurrency,
            show_progress: true,
            work_root: None,
        }
    }
}

/// A computed plan that has not been executed.
#[derive(Debug, Clone, Serialize)]
pub struct PlanPreview {
    pub timeline: Timeline,
    pub keyframe_count: usize,
    /// Canonical intervals after widening, snapping and merging.
    pub intervals: Vec<Interval>,
    pub plan: SegmentPlan,
}

#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub operation: Operation,
    pub total_time: Duration,
    pub planning_time: Duration,
    pub cutting_time: Duration,
    pub assembly_time: Duration,
    pub source_duration: f64,
    pub kept_duration: f64,
    /// Silence reported by the detector. Zero for keep-or-remove runs.
    pub silence_total: f64,
    pub segments_planned: usize,
    pub segments_cut: usize,
    pub execution: ExecutionStats,
}

#[derive(Debug)]
pub struct PipelineResult {
    pub output_path: PathBuf,
    pub plan: SegmentPlan,
    pub stats: PipelineStats,
}

/// Detect silence in `input` and compute the segment plan without cutting.
///
/// Options are validated before the prober is touched.
pub async fn plan_only(
    input: &Path,
    prober: &dyn Prober,
    options: &SilenceOptions,
) -> Result<PlanPreview> {
    options.validate()?;

    if !input.exists() {
        return Err(AutotrimError::FileNotFound(input.display().to_string()));
    }

    debug!(
        "Detecting silence below {}dB lasting at least {}s",
        options.threshold_db, options.min_silence_duration
    );
    let raw = prober
        .probe_silence(input, options.threshold_db, options.min_silence_duration)
        .await?;
    let timeline = parse_detector_output(&raw)?;
    info!(
        "Found {} non-silent intervals in {} ({:.1}s silent)",
        timeline.interval_count(),
        format_timestamp(timeline.duration),
        timeline.silence_total
    );

    let keyframes = prober.probe_keyframes(input).await?;
    let intervals = refine(
        &timeline.boundaries,
        options.min_segment_duration,
        timeline.duration,
        &keyframes,
    )?;
    if intervals.is_empty() {
        return Err(AutotrimError::EmptyPlan);
    }

    let plan = build_advanced_plan(&intervals, timeline.duration, &options.handling);
    if plan.kept().next().is_none() {
        return Err(AutotrimError::EmptyPlan);
    }

    Ok(PlanPreview {
        timeline,
        keyframe_count: keyframes.len(),
        intervals,
        plan,
    })
}

/// Remove (or transform) the silent parts of `input`.
///
/// Writes `output`, or `<stem>_cut_silence.<ext>` next to the input when no
/// output is given. Either a complete output file is produced or none is.
pub async fn remove_silence(
    input: &Path,
    output: Option<&Path>,
    toolchain: &Toolchain,
    options: &SilenceOptions,
    pipeline_config: &PipelineConfig,
    cancelled: Arc<AtomicBool>,
) -> Result<PipelineResult> {
    let start_time = Instant::now();
    let operation = Operation::CutSilence;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| operation.default_output(input));

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 1: Detection and planning
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 1/3: Planning segments for {:?}", input);
    let planning_start = Instant::now();
    let preview = plan_only(input, toolchain.prober.as_ref(), options).await?;
    let planning_time = planning_start.elapsed();
    info!(
        "Planned {} segments ({} kept) in {:.2}s",
        preview.plan.len(),
        preview.plan.kept().count(),
        planning_time.as_secs_f64()
    );

    check_cancelled(&cancelled)?;

    let run = execute_and_assemble(
        input,
        &output,
        &preview.plan,
        toolchain,
        pipeline_config,
        cancelled,
    )
    .await?;

    Ok(PipelineResult {
        output_path: output,
        stats: PipelineStats {
            operation,
            total_time: start_time.elapsed(),
            planning_time,
            cutting_time: run.cutting_time,
            assembly_time: run.assembly_time,
            source_duration: preview.timeline.duration,
            kept_duration: preview.plan.kept_duration(),
            silence_total: preview.timeline.silence_total,
            segments_planned: preview.plan.len(),
            segments_cut: run.execution.succeeded_jobs,
            execution: run.execution,
        },
        plan: preview.plan,
    })
}

/// Keep (or remove) user-chosen spans of `input`.
///
/// `cuts` is a flat `[start, end, start, end, ...]` list in seconds. With
/// `keep_handle` the listed spans are kept; otherwise they are removed and
/// everything around them is kept.
pub async fn keep_or_remove(
    input: &Path,
    output: Option<&Path>,
    cuts: &[f64],
    keep_handle: bool,
    toolchain: &Toolchain,
    pipeline_config: &PipelineConfig,
    cancelled: Arc<AtomicBool>,
) -> Result<PipelineResult> {
    let start_time = Instant::now();
    let operation = Operation::KeepOrRemove;
    let spans = pair_boundaries(cuts)?;

    if !input.exists() {
        return Err(AutotrimError::FileNotFound(input.display().to_string()));
    }
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| operation.default_output(input));

    info!("Stage 1/3: Planning {} for {:?}", operation, input);
    let planning_start = Instant::now();
    let duration = toolchain.prober.probe_duration(input).await?;
    let intervals = merge_overlaps(&spans);
    let plan = build_binary_plan(&intervals, duration, keep_handle);
    if plan.kept().next().is_none() {
        return Err(AutotrimError::EmptyPlan);
    }
    let planning_time = planning_start.elapsed();

    check_cancelled(&cancelled)?;

    let run = execute_and_assemble(input, &output, &plan, toolchain, pipeline_config, cancelled)
        .await?;

    Ok(PipelineResult {
        output_path: output,
        stats: PipelineStats {
            operation,
            total_time: start_time.elapsed(),
            planning_time,
            cutting_time: run.cutting_time,
            assembly_time: run.assembly_time,
            source_duration: duration,
            kept_duration: plan.kept_duration(),
            silence_total: 0.0,
            segments_planned: plan.len(),
            segments_cut: run.execution.succeeded_jobs,
            execution: run.execution,
        },
        plan,
    })
}

/// File extensions picked up when a directory is given to [`merge_files`].
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "mov", "avi", "webm", "flv", "m4v", "ts", "mts", "wmv", "mpg", "mpeg",
];

#[derive(Debug)]
pub struct MergeResult {
    pub output_path: PathBuf,
    /// Files joined, in output order.
    pub inputs: Vec<PathBuf>,
    pub total_time: Duration,
}

/// Join whole files into `output` in the order given.
///
/// A directory among `inputs` stands for the video files directly inside
/// it, sorted by name. The inputs are never modified and `output` is only
/// replaced once the merge has finished.
pub async fn merge_files(
    inputs: &[PathBuf],
    output: &Path,
    merger: Arc<dyn Merger>,
    pipeline_config: &PipelineConfig,
) -> Result<MergeResult> {
    let start_time = Instant::now();
    let files = collect_merge_inputs(inputs)?;
    if files.is_empty() {
        return Err(AutotrimError::Config("No video files to merge".to_string()));
    }
    info!("Merging {} files into {:?}", files.len(), output);

    let work_dir = create_work_dir(pipeline_config)?;
    let manifest = ConcatManifest::new(work_dir.path().join("merge.txt"), files);
    Assembler::new(merger)
        .merge_staged(&manifest, output)
        .await?;

    Ok(MergeResult {
        output_path: output.to_path_buf(),
        inputs: manifest.inputs,
        total_time: start_time.elapsed(),
    })
}

/// Expand directories and resolve every input to an absolute path, since
/// concat manifest entries are resolved relative to the manifest itself.
fn collect_merge_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let resolved = std::fs::canonicalize(input)
            .map_err(|_| AutotrimError::FileNotFound(input.display().to_string()))?;

        if !resolved.is_dir() {
            files.push(resolved);
            continue;
        }

        let mut found: Vec<PathBuf> = std::fs::read_dir(&resolved)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_video_file(path))
            .collect();
        found.sort();
        debug!("Found {} video files in {:?}", found.len(), resolved);
        files.extend(found);
    }
    Ok(files)
}

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

fn create_work_dir(pipeline_config: &PipelineConfig) -> Result<tempfile::TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("autotrim-");
    let work_dir = match &pipeline_config.work_root {
        Some(root) => builder.tempdir_in(root)?,
        None => builder.tempdir()?,
    };
    debug!("Using work directory: {:?}", work_dir.path());
    Ok(work_dir)
}

struct RunTimings {
    cutting_time: Duration,
    assembly_time: Duration,
    execution: ExecutionStats,
}

async fn execute_and_assemble(
    input: &Path,
    output: &Path,
    plan: &SegmentPlan,
    toolchain: &Toolchain,
    pipeline_config: &PipelineConfig,
    cancelled: Arc<AtomicBool>,
) -> Result<RunTimings> {
    let work_dir = create_work_dir(pipeline_config)?;

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 2: Cutting
    // ═══════════════════════════════════════════════════════════════════════
    info!(
        "Stage 2/3: Cutting {} segments (concurrency: {})",
        plan.kept().count(),
        pipeline_config.concurrency
    );
    let cutting_start = Instant::now();
    let engine = ExecutionEngine::new(
        toolchain.cutter.clone(),
        toolchain.transformer.clone(),
        pipeline_config.concurrency,
    )
    .with_progress(pipeline_config.show_progress)
    .with_cancel(cancelled.clone());
    let execution = engine.execute(input, plan, work_dir.path()).await;
    let cutting_time = cutting_start.elapsed();

    if cancelled.load(Ordering::Relaxed) {
        warn!("Pipeline cancelled, discarding {} segments", execution.outcomes.len());
        return Err(AutotrimError::Cancelled);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 3: Assembly
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 3/3: Assembling {:?}", output);
    let assembly_start = Instant::now();
    let assembler = Assembler::new(toolchain.merger.clone());
    if let Err(e) = assembler
        .assemble(&execution, &plan.kept_indices(), work_dir.path(), output)
        .await
    {
        let kept = work_dir.keep();
        warn!("Intermediate segments kept for inspection in {:?}", kept);
        return Err(e);
    }

    Ok(RunTimings {
        cutting_time,
        assembly_time: assembly_start.elapsed(),
        execution: execution.stats,
    })
}

fn check_cancelled(cancelled: &AtomicBool) -> Result<()> {
    if cancelled.load(Ordering::Relaxed) {
        return Err(AutotrimError::Cancelled);
    }
    Ok(())
}

/// Print a summary of the pipeline results.
pub fn print_summary(result: &PipelineResult) {
    let stats = &result.stats;
    let removed = (stats.source_duration - stats.kept_duration).max(0.0);

    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                      Trimming Complete ({})", stats.operation);
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Output:     {}", result.output_path.display());
    println!(
        "  Segments:   {} cut of {} planned",
        stats.segments_cut, stats.segments_planned
    );
    println!(
        "  Duration:   {} -> {} ({:.1}s removed)",
        format_timestamp(stats.source_duration),
        format_timestamp(stats.kept_duration),
        removed
    );
    if stats.silence_total > 0.0 {
        println!("  Silence:    {:.1}s detected", stats.silence_total);
    }
    println!();
    println!("  Timing:");
    println!("    Plan:        {:.2}s", stats.planning_time.as_secs_f64());
    println!(
        "    Cut:         {:.2}s (avg {:.2}s/segment)",
        stats.cutting_time.as_secs_f64(),
        stats.execution.avg_job_time.as_secs_f64()
    );
    println!("    Assemble:    {:.2}s", stats.assembly_time.as_secs_f64());
    println!("    Total:       {:.2}s", stats.total_time.as_secs_f64());
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Transform;
    use crate::segment::SegmentAction;
    use async_trait::async_trait;

    struct UnreachableProber;

    #[async_trait]
    impl Prober for UnreachableProber {
        async fn probe_duration(&self, _file: &Path) -> Result<f64> {
            panic!("prober must not be called");
        }

        async fn probe_silence(&self, _file: &Path, _db: f64, _min: f64) -> Result<String> {
            panic!("prober must not be called");
        }

        async fn probe_keyframes(&self, _file: &Path) -> Result<Vec<f64>> {
            panic!("prober must not be called");
        }
    }

    #[test]
    fn test_collect_merge_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let clips = dir.path().join("clips");
        std::fs::create_dir(&clips).unwrap();
        for name in ["b.mkv", "a.MP4", "notes.txt"] {
            std::fs::write(clips.join(name), name).unwrap();
        }
        let intro = dir.path().join("intro.mov");
        std::fs::write(&intro, "intro").unwrap();

        let files = collect_merge_inputs(&[intro.clone(), clips.clone()]).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["intro.mov", "a.MP4", "b.mkv"]);
        assert!(files.iter().all(|f| f.is_absolute()));

        let err = collect_merge_inputs(&[dir.path().join("missing.mp4")]).unwrap_err();
        assert!(matches!(err, AutotrimError::FileNotFound(_)));
    }

    #[test]
    fn test_default_output_names() {
        let input = Path::new("/videos/lecture.mp4");
        assert_eq!(
            Operation::CutSilence.default_output(input),
            PathBuf::from("/videos/lecture_cut_silence.mp4")
        );
        assert_eq!(
            Operation::KeepOrRemove.default_output(input),
            PathBuf::from("/videos/lecture_keep_or_remove.mp4")
        );
        assert_eq!(Operation::CutSilence.to_string(), "cut silence");
    }

    #[test]
    fn test_silence_options_validation() {
        assert!(SilenceOptions::default().validate().is_ok());

        let options = SilenceOptions {
            min_segment_duration: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(AutotrimError::InvalidMinDuration(_))
        ));

        let options = SilenceOptions {
            handling: ClassHandling {
                even: SegmentAction::Transform(Transform::Speed(-2.0)),
                odd: SegmentAction::Keep,
            },
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_options_from_config() {
        let config = Config {
            threshold_db: -40.0,
            min_segment_duration: 1.5,
            ..Default::default()
        };
        let options = SilenceOptions::from_config(&config);
        assert_eq!(options.threshold_db, -40.0);
        assert_eq!(options.min_segment_duration, 1.5);
        assert_eq!(options.handling, ClassHandling::default());
    }

    #[tokio::test]
    async fn test_negative_min_duration_fails_before_probing() {
        let options = SilenceOptions {
            min_segment_duration: -1.0,
            ..Default::default()
        };
        let err = plan_only(Path::new("/nonexistent.mp4"), &UnreachableProber, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, AutotrimError::InvalidMinDuration(d) if d == -1.0));
    }

    #[tokio::test]
    async fn test_missing_input() {
        let err = plan_only(
            Path::new("/nonexistent/input.mp4"),
            &UnreachableProber,
            &SilenceOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AutotrimError::FileNotFound(_)));
    }
}
