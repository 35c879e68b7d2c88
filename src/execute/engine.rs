use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::media::{Cutter, TransformRunner};
use crate::segment::{PlanEntry, SegmentPlan};

use super::{ExecutionResult, ExecutionStats, JobOutcome, JobStatus};

const CANCELLED_REASON: &str = "cancelled";

/// Runs one cut job per kept plan entry on a bounded pool.
pub struct ExecutionEngine {
    cutter: Arc<dyn Cutter>,
    transformer: Arc<dyn TransformRunner>,
    concurrency: usize,
    show_progress: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl ExecutionEngine {
    pub fn new(
        cutter: Arc<dyn Cutter>,
        transformer: Arc<dyn TransformRunner>,
        concurrency: usize,
    ) -> Self {
        Self {
            cutter,
            transformer,
            concurrency: concurrency.max(1),
            show_progress: true,
            cancel: None,
        }
    }

    /// Enable or disable progress bar display.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Stop dispatching new jobs once `flag` is set. Running jobs finish.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Artifact path for a plan entry. Distinct per index.
    pub fn artifact_path(source: &Path, work_dir: &Path, index: usize) -> PathBuf {
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mkv");
        work_dir.join(format!("segment_{index:05}.{ext}"))
    }

    /// Cut every kept entry of `plan` out of `source` into `work_dir`.
    ///
    /// Returns once every job has reached a terminal state. One failing
    /// job never stops the others.
    pub async fn execute(
        &self,
        source: &Path,
        plan: &SegmentPlan,
        work_dir: &Path,
    ) -> ExecutionResult {
        let jobs: Vec<&PlanEntry> = plan.kept().collect();
        if jobs.is_empty() {
            return ExecutionResult::default();
        }

        let total_jobs = jobs.len();
        let start_time = Instant::now();

        info!(
            "Cutting {} segments with {} parallel jobs",
            total_jobs, self.concurrency
        );

        let progress_bar = if self.show_progress {
            let pb = ProgressBar::new(total_jobs as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut futures = FuturesUnordered::new();

        for entry in jobs {
            let sem = semaphore.clone();
            let pb = progress_bar.clone();
            let artifact = Self::artifact_path(source, work_dir, entry.index);

            futures.push(async move {
                let permit = sem.acquire().await;
                let job_start = Instant::now();

                let status = if permit.is_err() {
                    JobStatus::Failed {
                        reason: "worker pool closed".to_string(),
                    }
                } else if self.is_cancelled() {
                    debug!("Skipping segment {}: cancelled", entry.index);
                    JobStatus::Failed {
                        reason: CANCELLED_REASON.to_string(),
                    }
                } else {
                    debug!(
                        "Starting segment {} ({:.3}s-{:.3}s)",
                        entry.index, entry.start, entry.end
                    );
                    match self.run_job(source, entry, &artifact).await {
                        Ok(()) => JobStatus::Succeeded,
                        Err(e) => JobStatus::Failed {
                            reason: e.to_string(),
                        },
                    }
                };
                drop(permit);

                let elapsed = job_start.elapsed();
                match &status {
                    JobStatus::Succeeded => {
                        debug!("Segment {} done in {}ms", entry.index, elapsed.as_millis())
                    }
                    JobStatus::Failed { reason } => {
                        warn!("Segment {} failed: {}", entry.index, reason)
                    }
                }

                if let Some(ref pb) = pb {
                    pb.inc(1);
                }

                JobOutcome {
                    index: entry.index,
                    range: entry.interval(),
                    artifact,
                    status,
                    elapsed,
                }
            });
        }

        let mut result = ExecutionResult::default();
        while let Some(outcome) = futures.next().await {
            result.outcomes.insert(outcome.index, outcome);
        }

        if let Some(pb) = progress_bar {
            pb.finish_with_message("Cutting complete");
        }

        result.stats = summarize(&result, total_jobs, start_time.elapsed());
        info!(
            "Cutting complete: {}/{} segments in {:.2}s (avg {:.2}s/segment)",
            result.stats.succeeded_jobs,
            total_jobs,
            result.stats.total_time.as_secs_f64(),
            result.stats.avg_job_time.as_secs_f64()
        );

        result
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Cut one entry, then transform it in place if it carries a transform.
    async fn run_job(&self, source: &Path, entry: &PlanEntry, artifact: &Path) -> Result<()> {
        self.cutter.cut(source, entry.interval(), artifact).await?;

        if let Some(transform) = entry.transform() {
            let staged = staging_path(artifact);
            debug!("Applying {} to segment {}", transform, entry.index);
            if let Err(e) = self.transformer.apply(artifact, transform, &staged).await {
                let _ = tokio::fs::remove_file(&staged).await;
                return Err(e);
            }
            tokio::fs::rename(&staged, artifact).await?;
        }

        Ok(())
    }
}

/// Sibling path for a transformed artifact before it replaces the original.
fn staging_path(artifact: &Path) -> PathBuf {
    let stem = artifact
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match artifact.extension() {
        Some(ext) => format!("{stem}_transformed.{}", ext.to_string_lossy()),
        None => format!("{stem}_transformed"),
    };
    artifact.with_file_name(name)
}

fn summarize(result: &ExecutionResult, total_jobs: usize, total_time: Duration) -> ExecutionStats {
    let succeeded_jobs = result.outcomes.values().filter(|o| o.succeeded()).count();
    let job_time: Duration = result.outcomes.values().map(|o| o.elapsed).sum();
    let avg_job_time = if result.outcomes.is_empty() {
        Duration::ZERO
    } else {
        job_time / result.outcomes.len() as u32
    };

    ExecutionStats {
        total_jobs,
        succeeded_jobs,
        failed_jobs: total_jobs - succeeded_jobs,
        total_time,
        avg_job_time,
    }
}
