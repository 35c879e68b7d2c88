use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;

use super::Prober;

#[derive(Debug, Default)]
struct ProbeRecord {
    duration: Option<f64>,
    keyframes: Option<Arc<Vec<f64>>>,
}

/// Caller-scoped cache of probe results keyed by file path.
///
/// Durations and keyframe lists are remembered until the cache is dropped or
/// cleared. Silence detection depends on its thresholds and always passes
/// through.
pub struct CachingProber {
    inner: Arc<dyn Prober>,
    records: Mutex<HashMap<PathBuf, ProbeRecord>>,
}

impl CachingProber {
    pub fn new(inner: Arc<dyn Prober>) -> Self {
        Self {
            inner,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Number of files with at least one cached result.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }

    fn cached_duration(&self, file: &Path) -> Option<f64> {
        let records = self.records.lock().ok()?;
        records.get(file).and_then(|r| r.duration)
    }

    fn cached_keyframes(&self, file: &Path) -> Option<Arc<Vec<f64>>> {
        let records = self.records.lock().ok()?;
        records.get(file).and_then(|r| r.keyframes.clone())
    }

    fn update(&self, file: &Path, apply: impl FnOnce(&mut ProbeRecord)) {
        if let Ok(mut records) = self.records.lock() {
            apply(records.entry(file.to_path_buf()).or_default());
        }
    }
}

#[async_trait]
impl Prober for CachingProber {
    async fn probe_duration(&self, file: &Path) -> Result<f64> {
        if let Some(duration) = self.cached_duration(file) {
            debug!("Duration cache hit for {}", file.display());
            return Ok(duration);
        }

        let duration = self.inner.probe_duration(file).await?;
        self.update(file, |record| record.duration = Some(duration));
        Ok(duration)
    }

    async fn probe_silence(
        &self,
        file: &Path,
        threshold_db: f64,
        min_silence_duration: f64,
    ) -> Result<String> {
        self.inner
            .probe_silence(file, threshold_db, min_silence_duration)
            .await
    }

    async fn probe_keyframes(&self, file: &Path) -> Result<Vec<f64>> {
        if let Some(keyframes) = self.cached_keyframes(file) {
            debug!("Keyframe cache hit for {}", file.display());
            return Ok(keyframes.as_ref().clone());
        }

        let keyframes = Arc::new(self.inner.probe_keyframes(file).await?);
        self.update(file, |record| record.keyframes = Some(keyframes.clone()));
        Ok(keyframes.as_ref().clone())
    }
}
