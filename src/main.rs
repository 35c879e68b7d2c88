use anyhow::{Context, Result};
use autotrim::config::Config;
use autotrim::pipeline::{
    keep_or_remove, merge_files, plan_only, print_summary, remove_silence, PipelineConfig,
    PlanPreview, SilenceOptions,
};
use autotrim::segment::{
    format_timestamp, pair_boundaries, parse_timestamp, ClassHandling, SegmentAction,
};
use autotrim::{FfmpegTools, Toolchain};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "autotrim")]
#[command(version, about = "Cut silence out of videos")]
#[command(long_about = "Detect silent stretches with FFmpeg, plan keyframe-safe cuts, extract segments in parallel and join them back into one file.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Remove or speed up silent parts of a video
    Silence {
        /// Input video file
        input: PathBuf,

        /// Output file (defaults to <input>_cut_silence.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        detection: DetectionArgs,

        /// Re-encode segments for exact cut points instead of copying streams
        #[arg(long)]
        reencode: bool,

        /// Number of segments cut in parallel
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Show the segment plan without cutting anything
    Plan {
        /// Input video file
        input: PathBuf,

        #[command(flatten)]
        detection: DetectionArgs,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Keep (or remove) explicit time ranges
    Cut {
        /// Input video file
        input: PathBuf,

        /// Start/end pairs as seconds, MM:SS or HH:MM:SS(.fff)
        #[arg(required = true, num_args = 2..)]
        timestamps: Vec<String>,

        /// Output file (defaults to <input>_keep_or_remove.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Remove the listed ranges instead of keeping them
        #[arg(long)]
        remove: bool,

        /// Number of segments cut in parallel
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Join video files (or every video in a directory) into one file
    Merge {
        /// Files or directories, joined in the order given
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct DetectionArgs {
    /// Silence threshold in dB
    #[arg(long, allow_hyphen_values = true)]
    threshold_db: Option<f64>,

    /// Shortest pause treated as silence, in seconds
    #[arg(long)]
    min_silence: Option<f64>,

    /// Shortest kept segment, in seconds
    #[arg(long, allow_hyphen_values = true)]
    min_segment: Option<f64>,

    /// What to do with silent parts: drop, keep, speed:<factor>, jumpcut:<interval>,<lasting>[,<m1>,<m2>]
    #[arg(long, default_value = "drop")]
    silent: String,

    /// What to do with audible parts: keep, drop, speed:<factor>, jumpcut:<interval>,<lasting>[,<m1>,<m2>]
    #[arg(long, default_value = "keep")]
    audible: String,
}

impl DetectionArgs {
    /// Merge flags over the config values and validate both.
    fn options(&self, config: &Config) -> Result<SilenceOptions> {
        config
            .validate()
            .context("Configuration validation failed")?;
        let silent: SegmentAction = self.silent.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        let audible: SegmentAction = self
            .audible
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let mut options = SilenceOptions::from_config(config);
        if let Some(db) = self.threshold_db {
            options.threshold_db = db;
        }
        if let Some(d) = self.min_silence {
            options.min_silence_duration = d;
        }
        if let Some(d) = self.min_segment {
            options.min_segment_duration = d;
        }
        options.handling = ClassHandling {
            even: silent,
            odd: audible,
        };
        options.validate()?;
        Ok(options)
    }
}

/// Parse `cut` timestamps into a flat boundary list of start/end pairs.
fn parse_cut_list(timestamps: &[String]) -> Result<Vec<f64>> {
    let cuts = timestamps
        .iter()
        .map(|t| parse_timestamp(t))
        .collect::<std::result::Result<Vec<f64>, _>>()?;
    pair_boundaries(&cuts)?;
    Ok(cuts)
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn install_cancel_handler() -> Arc<AtomicBool> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }
    cancelled
}

fn pipeline_config(config: &Config, concurrency: Option<usize>) -> PipelineConfig {
    PipelineConfig {
        concurrency: concurrency.unwrap_or(config.concurrency),
        show_progress: true,
        work_root: None,
    }
}

fn print_plan(preview: &PlanPreview) {
    println!(
        "Duration {}  silence {:.1}s  keyframes {}",
        format_timestamp(preview.timeline.duration),
        preview.timeline.silence_total,
        preview.keyframe_count
    );
    println!();
    println!("{:>5}  {:>12}  {:>12}  {:<5}  action", "index", "start", "end", "class");
    for entry in &preview.plan.entries {
        println!(
            "{:>5}  {:>12}  {:>12}  {:<5}  {}",
            entry.index,
            format_timestamp(entry.start),
            format_timestamp(entry.end),
            entry.class.to_string(),
            entry.action
        );
    }
    println!();
    println!(
        "{} of {} segments kept, {} of output",
        preview.plan.kept().count(),
        preview.plan.len(),
        format_timestamp(preview.plan.kept_duration())
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let mut config = Config::load().context("Failed to load configuration")?;

    match cli.command {
        Command::Silence {
            input,
            output,
            detection,
            reencode,
            concurrency,
        } => {
            config.reencode |= reencode;
            let options = detection.options(&config)?;
            let pipeline_config = pipeline_config(&config, concurrency);

            let tools = FfmpegTools::from_config(&config);
            tools.check().await?;
            let toolchain = Toolchain::ffmpeg(tools);

            info!("Input:    {}", input.display());
            info!(
                "Silence:  {} / audible: {}",
                options.handling.even, options.handling.odd
            );

            let cancelled = install_cancel_handler();
            let result = remove_silence(
                &input,
                output.as_deref(),
                &toolchain,
                &options,
                &pipeline_config,
                cancelled,
            )
            .await
            .context("Silence removal failed")?;

            print_summary(&result);
        }

        Command::Plan {
            input,
            detection,
            json,
        } => {
            let options = detection.options(&config)?;
            let tools = FfmpegTools::from_config(&config);
            tools.check().await?;
            let toolchain = Toolchain::ffmpeg(tools);

            let preview = plan_only(&input, toolchain.prober.as_ref(), &options)
                .await
                .context("Planning failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&preview)?);
            } else {
                print_plan(&preview);
            }
        }

        Command::Cut {
            input,
            timestamps,
            output,
            remove,
            concurrency,
        } => {
            let cuts = parse_cut_list(&timestamps)?;
            let pipeline_config = pipeline_config(&config, concurrency);
            config
                .validate()
                .context("Configuration validation failed")?;

            let tools = FfmpegTools::from_config(&config);
            tools.check().await?;
            let toolchain = Toolchain::ffmpeg(tools);

            let cancelled = install_cancel_handler();
            let result = keep_or_remove(
                &input,
                output.as_deref(),
                &cuts,
                !remove,
                &toolchain,
                &pipeline_config,
                cancelled,
            )
            .await
            .context("Cutting failed")?;

            print_summary(&result);
        }

        Command::Merge { inputs, output } => {
            config
                .validate()
                .context("Configuration validation failed")?;

            let tools = FfmpegTools::from_config(&config);
            tools.check().await?;
            let toolchain = Toolchain::ffmpeg(tools);

            let result = merge_files(
                &inputs,
                &output,
                toolchain.merger.clone(),
                &pipeline_config(&config, None),
            )
            .await
            .context("Merging failed")?;

            info!(
                "Merged {} files into {} in {:.2}s",
                result.inputs.len(),
                result.output_path.display(),
                result.total_time.as_secs_f64()
            );
        }
    }

    Ok(())
}
