//! Global statistics report ({logs_dir}/stats.json)

use async_trait::async_trait;
use cachepilot_common::permissions::atomic_write;
use cachepilot_common::GuardedCommand;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::collaborators::{Reporter, StepResult};
use crate::config::Config;
use crate::steps::StepFailure;
use crate::tenants::list_tenants;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub timestamp: DateTime<Utc>,
    pub tenants_total: u64,
    /// `None` when the container runtime could not be queried
    pub tenants_running: Option<u64>,
    pub backups_total: u64,
}

/// Count `redis-*` names in `docker ps --format {{.Names}}` output
pub fn count_tenant_containers(names: &str) -> u64 {
    names
        .lines()
        .map(str::trim)
        .filter(|n| n.starts_with("redis-"))
        .count() as u64
}

fn count_backups(backups_dir: &Path) -> u64 {
    fs::read_dir(backups_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().ends_with(".tar.gz"))
                .count() as u64
        })
        .unwrap_or(0)
}

pub struct StatsReporter {
    tenants_dir: PathBuf,
    backups_dir: PathBuf,
    stats_file: PathBuf,
    timeout: Duration,
}

impl StatsReporter {
    pub fn new(config: &Config) -> Self {
        Self {
            tenants_dir: config.paths.tenants_dir.clone(),
            backups_dir: config.paths.backups_dir.clone(),
            stats_file: config.paths.stats_file(),
            timeout: config.maintenance.command_timeout(),
        }
    }

    async fn running_containers(&self) -> Option<u64> {
        let result = GuardedCommand::new("docker")
            .args(["ps", "--format", "{{.Names}}"])
            .timeout(self.timeout)
            .run_checked()
            .await;
        match result {
            Ok(output) => Some(count_tenant_containers(&output.stdout)),
            Err(e) => {
                warn!("[STATS] cannot list containers: {}", e);
                None
            }
        }
    }

    pub async fn collect(&self) -> StepResult<GlobalStats> {
        Ok(GlobalStats {
            timestamp: Utc::now(),
            tenants_total: list_tenants(&self.tenants_dir)?.len() as u64,
            tenants_running: self.running_containers().await,
            backups_total: count_backups(&self.backups_dir),
        })
    }
}

#[async_trait]
impl Reporter for StatsReporter {
    async fn generate_stats(&self) -> StepResult<()> {
        let stats = self.collect().await?;
        let json = serde_json::to_vec_pretty(&stats)
            .map_err(|e| StepFailure::collaborator(format!("serialize stats: {}", e)))?;
        atomic_write(&self.stats_file, &json, 0o644)?;
        info!(
            "[STATS] {} tenants, {:?} running, {} backups",
            stats.tenants_total, stats.tenants_running, stats.backups_total
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_count_tenant_containers() {
        let out = "redis-acme\nnginx-proxy\nredis-blog\n\n";
        assert_eq!(count_tenant_containers(out), 2);
        assert_eq!(count_tenant_containers(""), 0);
    }

    #[tokio::test]
    async fn test_generate_stats_writes_file() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.tenants_dir = temp.path().join("tenants");
        config.paths.backups_dir = temp.path().join("backups");
        config.paths.logs_dir = temp.path().join("logs");
        config.maintenance.command_timeout_secs = 5;
        fs::create_dir_all(config.paths.tenants_dir.join("acme")).unwrap();
        fs::create_dir_all(&config.paths.backups_dir).unwrap();
        fs::write(config.paths.backups_dir.join("acme_20260101_000000.tar.gz"), "x").unwrap();

        let reporter = StatsReporter::new(&config);
        reporter.generate_stats().await.unwrap();

        let stats: GlobalStats =
            serde_json::from_str(&fs::read_to_string(config.paths.stats_file()).unwrap()).unwrap();
        assert_eq!(stats.tenants_total, 1);
        assert_eq!(stats.backups_total, 1);
    }
}
