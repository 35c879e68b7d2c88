pub mod config;
pub mod error;
pub mod execute;
pub mod media;
pub mod pipeline;
pub mod segment;

pub use config::Config;
pub use error::{AutotrimError, Result};
pub use media::{FfmpegTools, Toolchain};
pub use pipeline::{
    keep_or_remove, merge_files, plan_only, print_summary, remove_silence, MergeResult, Operation,
    PipelineConfig, PipelineResult, PipelineStats, PlanPreview, SilenceOptions,
};
