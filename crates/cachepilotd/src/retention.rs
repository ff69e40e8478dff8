//! Maintenance log retention

use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::debug;

use crate::collaborators::{LogRetention, StepResult};

pub struct FileLogRetention {
    dir: PathBuf,
}

impl FileLogRetention {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl LogRetention for FileLogRetention {
    async fn cleanup_logs(&self, older_than_days: u32) -> StepResult<u64> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let max_age = Duration::from_secs(older_than_days as u64 * 86_400);
        let now = SystemTime::now();
        let mut removed = 0u64;

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let age = now
                .duration_since(meta.modified()?)
                .unwrap_or(Duration::ZERO);
            if age > max_age {
                fs::remove_file(&path)?;
                debug!("[RETENTION] removed {}", path.display());
                removed += 1;
            }
        }

        Ok(removed)
    }
}
