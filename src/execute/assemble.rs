use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{AutotrimError, Result};
use crate::media::{ConcatManifest, Merger};

use super::ExecutionResult;

const MANIFEST_NAME: &str = "concat.txt";

/// Joins finished segment artifacts into the final output.
pub struct Assembler {
    merger: Arc<dyn Merger>,
}

impl Assembler {
    pub fn new(merger: Arc<dyn Merger>) -> Self {
        Self { merger }
    }

    /// Temporary merge target next to `output`: `<stem>_processing.<ext>`.
    pub fn processing_path(output: &Path) -> PathBuf {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let name = match output.extension() {
            Some(ext) => format!("{stem}_processing.{}", ext.to_string_lossy()),
            None => format!("{stem}_processing"),
        };
        output.with_file_name(name)
    }

    /// Concatenate the artifacts of `kept` in ascending index order into
    /// `output`.
    ///
    /// Refuses to run if any kept index is missing or failed. `output` is
    /// only ever replaced by a complete merge result. Intermediate files are
    /// deleted on success and left in `work_dir` otherwise.
    pub async fn assemble(
        &self,
        result: &ExecutionResult,
        kept: &[usize],
        work_dir: &Path,
        output: &Path,
    ) -> Result<PathBuf> {
        let mut order = kept.to_vec();
        order.sort_unstable();
        order.dedup();

        if order.is_empty() {
            return Err(AutotrimError::EmptyPlan);
        }

        let missing: Vec<usize> = order
            .iter()
            .copied()
            .filter(|index| result.get(*index).is_none())
            .collect();
        let failures: Vec<AutotrimError> = order
            .iter()
            .filter_map(|index| result.get(*index))
            .filter_map(|outcome| outcome.error())
            .collect();

        if !missing.is_empty() || !failures.is_empty() {
            warn!(
                "Not assembling: {} missing, {} failed of {} segments",
                missing.len(),
                failures.len(),
                order.len()
            );
            return Err(AutotrimError::IncompleteSegments { missing, failures });
        }

        let inputs: Vec<PathBuf> = order
            .iter()
            .filter_map(|index| result.artifact(*index))
            .map(Path::to_path_buf)
            .collect();
        let manifest = ConcatManifest::new(work_dir.join(MANIFEST_NAME), inputs);
        self.merge_staged(&manifest, output).await?;
        info!(
            "Assembled {} segments into {}",
            manifest.inputs.len(),
            output.display()
        );

        cleanup(result, &manifest.path);
        Ok(output.to_path_buf())
    }

    /// Write `manifest`, merge its inputs into `<stem>_processing.<ext>` and
    /// rename that over `output`.
    ///
    /// The inputs and the manifest are left alone. On failure the staging
    /// file is removed and `output` is untouched.
    pub async fn merge_staged(&self, manifest: &ConcatManifest, output: &Path) -> Result<()> {
        manifest.write()?;
        debug!(
            "Wrote manifest with {} inputs to {}",
            manifest.inputs.len(),
            manifest.path.display()
        );

        let staging = Self::processing_path(output);
        remove_if_present(&staging)?;

        if let Err(e) = self.merger.concat(manifest, &staging).await {
            let _ = remove_if_present(&staging);
            return Err(AutotrimError::MergeFailed(e.to_string()));
        }
        if !staging.exists() {
            return Err(AutotrimError::MergeFailed(format!(
                "Merger reported success but {} does not exist",
                staging.display()
            )));
        }

        if let Err(e) = std::fs::rename(&staging, output) {
            let _ = remove_if_present(&staging);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Delete every artifact the run produced and the manifest.
fn cleanup(result: &ExecutionResult, manifest: &Path) {
    let paths = result.artifact_paths().chain(std::iter::once(manifest));
    for path in paths {
        if let Err(e) = remove_if_present(path) {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
