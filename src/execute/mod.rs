pub mod assemble;
pub mod engine;

pub use assemble::Assembler;
pub use engine::ExecutionEngine;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AutotrimError;
use crate::segment::Interval;

/// Terminal state of one job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Succeeded,
    Failed { reason: String },
}

/// What happened to one plan entry.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub index: usize,
    pub range: Interval,
    /// Where the job writes its segment. Present on disk only if the job
    /// succeeded, or as a partial file if it failed midway.
    pub artifact: PathBuf,
    pub status: JobStatus,
    pub elapsed: Duration,
}

impl JobOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    /// The failure as a segment-addressable error.
    pub fn error(&self) -> Option<AutotrimError> {
        match &self.status {
            JobStatus::Succeeded => None,
            JobStatus::Failed { reason } => Some(AutotrimError::JobFailed {
                index: self.index,
                start: self.range.start,
                end: self.range.end,
                reason: reason.clone(),
            }),
        }
    }
}

/// Statistics from one execution run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    pub total_jobs: usize,
    pub succeeded_jobs: usize,
    pub failed_jobs: usize,
    pub total_time: Duration,
    pub avg_job_time: Duration,
}

/// Job outcomes addressed by plan index.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub outcomes: BTreeMap<usize, JobOutcome>,
    pub stats: ExecutionStats,
}

impl ExecutionResult {
    pub fn get(&self, index: usize) -> Option<&JobOutcome> {
        self.outcomes.get(&index)
    }

    /// Artifact path for a succeeded job.
    pub fn artifact(&self, index: usize) -> Option<&Path> {
        self.outcomes
            .get(&index)
            .filter(|o| o.succeeded())
            .map(|o| o.artifact.as_path())
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.values().all(JobOutcome::succeeded)
    }

    /// Every failed job, in index order.
    pub fn failures(&self) -> Vec<AutotrimError> {
        self.outcomes.values().filter_map(JobOutcome::error).collect()
    }

    /// Every path a job may have written, succeeded or not.
    pub fn artifact_paths(&self) -> impl Iterator<Item = &Path> {
        self.outcomes.values().map(|o| o.artifact.as_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(index: usize, status: JobStatus) -> JobOutcome {
        JobOutcome {
            index,
            range: Interval::new(index as f64, index as f64 + 1.0),
            artifact: PathBuf::from(format!("/work/segment_{index:05}.mp4")),
            status,
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_result_lookup() {
        let mut result = ExecutionResult::default();
        result.outcomes.insert(0, outcome(0, JobStatus::Succeeded));
        result.outcomes.insert(
            2,
            outcome(
                2,
                JobStatus::Failed {
                    reason: "exit status 1".to_string(),
                },
            ),
        );

        assert_eq!(
            result.artifact(0),
            Some(Path::new("/work/segment_00000.mp4"))
        );
        assert_eq!(result.artifact(2), None);
        assert_eq!(result.artifact(1), None);
        assert!(!result.all_succeeded());
        assert_eq!(result.artifact_paths().count(), 2);
    }

    #[test]
    fn test_failures_are_segment_addressable() {
        let mut result = ExecutionResult::default();
        result.outcomes.insert(
            3,
            outcome(
                3,
                JobStatus::Failed {
                    reason: "Invalid data found".to_string(),
                },
            ),
        );

        let failures = result.failures();
        assert_eq!(failures.len(), 1);
        match &failures[0] {
            AutotrimError::JobFailed {
                index, start, end, ..
            } => {
                assert_eq!(*index, 3);
                assert_eq!(*start, 3.0);
                assert_eq!(*end, 4.0);
            }
            other => panic!("Expected JobFailed, got {other:?}"),
        }
        assert_eq!(
            failures[0].to_string(),
            "Segment 3 (3.000s-4.000s) failed: Invalid data found"
        );
    }
}
