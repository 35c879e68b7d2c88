pub mod cache;
pub mod ffmpeg;
pub mod transform;

pub use cache::CachingProber;
pub use ffmpeg::FfmpegTools;
pub use transform::Transform;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::segment::Interval;

/// Inspects source media.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Container duration in seconds.
    async fn probe_duration(&self, file: &Path) -> Result<f64>;

    /// Raw silence detector transcript, including the `Duration:` line.
    async fn probe_silence(
        &self,
        file: &Path,
        threshold_db: f64,
        min_silence_duration: f64,
    ) -> Result<String>;

    /// Ascending timestamps where the first video stream can be cut cleanly.
    async fn probe_keyframes(&self, file: &Path) -> Result<Vec<f64>>;
}

/// Extracts one time range of a source into its own file.
#[async_trait]
pub trait Cutter: Send + Sync {
    async fn cut(&self, source: &Path, range: Interval, output: &Path) -> Result<()>;
}

/// Re-encodes a cut segment with a [`Transform`].
#[async_trait]
pub trait TransformRunner: Send + Sync {
    async fn apply(&self, input: &Path, transform: &Transform, output: &Path) -> Result<()>;
}

/// Concatenates segment files listed in a manifest.
#[async_trait]
pub trait Merger: Send + Sync {
    async fn concat(&self, manifest: &ConcatManifest, output: &Path) -> Result<()>;
}

/// Ordered list of segment files to concatenate.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcatManifest {
    /// Where the manifest is written on disk.
    pub path: PathBuf,
    /// Segment files in output order.
    pub inputs: Vec<PathBuf>,
}

impl ConcatManifest {
    pub fn new(path: PathBuf, inputs: Vec<PathBuf>) -> Self {
        Self { path, inputs }
    }

    /// Render in ffmpeg concat demuxer syntax.
    pub fn render(&self) -> String {
        self.inputs
            .iter()
            .map(|input| {
                let quoted = input.to_string_lossy().replace('\'', r"'\''");
                format!("file '{}'\n", quoted)
            })
            .collect()
    }

    pub fn write(&self) -> Result<()> {
        std::fs::write(&self.path, self.render())?;
        Ok(())
    }
}

/// The external services one pipeline run talks to.
#[derive(Clone)]
pub struct Toolchain {
    pub prober: Arc<dyn Prober>,
    pub cutter: Arc<dyn Cutter>,
    pub transformer: Arc<dyn TransformRunner>,
    pub merger: Arc<dyn Merger>,
}

impl Toolchain {
    /// Use one ffmpeg installation for everything. Durations and keyframes
    /// are cached for as long as this toolchain lives.
    pub fn ffmpeg(tools: FfmpegTools) -> Self {
        let tools = Arc::new(tools);
        Self {
            prober: Arc::new(CachingProber::new(tools.clone())),
            cutter: tools.clone(),
            transformer: tools.clone(),
            merger: tools,
        }
    }
}
