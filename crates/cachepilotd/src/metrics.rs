//! Per-tenant Redis metrics
//!
//! One JSON line per sample in {logs_dir}/metrics/<tenant>.jsonl.

use async_trait::async_trait;
use cachepilot_common::permissions::{append_line, atomic_write};
use cachepilot_common::GuardedCommand;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::collaborators::{MetricsCollector, StepResult};
use crate::config::Config;
use crate::steps::StepFailure;
use crate::tenants::{list_tenants, Tenant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSample {
    pub timestamp: DateTime<Utc>,
    pub tenant: String,
    pub used_memory: u64,
    pub connected_clients: u64,
    pub keys: u64,
}

/// Pull the fields we track out of `redis-cli INFO` output
pub fn parse_info(tenant: &str, output: &str) -> MetricsSample {
    let mut sample = MetricsSample {
        timestamp: Utc::now(),
        tenant: tenant.to_string(),
        used_memory: 0,
        connected_clients: 0,
        keys: 0,
    };

    for line in output.lines().map(str::trim) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key {
            "used_memory" => sample.used_memory = value.parse().unwrap_or(0),
            "connected_clients" => sample.connected_clients = value.parse().unwrap_or(0),
            // db0:keys=12,expires=0,avg_ttl=0
            k if k.starts_with("db") => {
                sample.keys += value
                    .split(',')
                    .find_map(|kv| kv.strip_prefix("keys="))
                    .and_then(|n| n.parse::<u64>().ok())
                    .unwrap_or(0);
            }
            _ => {}
        }
    }

    sample
}

pub struct TenantMetricsCollector {
    tenants_dir: PathBuf,
    metrics_dir: PathBuf,
    timeout: std::time::Duration,
}

impl TenantMetricsCollector {
    pub fn new(config: &Config) -> Self {
        Self {
            tenants_dir: config.paths.tenants_dir.clone(),
            metrics_dir: config.paths.metrics_dir(),
            timeout: config.maintenance.command_timeout(),
        }
    }

    fn info_command(&self, tenant: &Tenant) -> GuardedCommand {
        let mut cmd = GuardedCommand::new("docker")
            .arg("exec")
            .untrusted_arg(tenant.container_name())
            .arg("redis-cli");
        if let Some(password) = tenant.config.password() {
            cmd = cmd.arg("--no-auth-warning").arg("-a").secret_arg(password);
        }
        cmd.arg("INFO").timeout(self.timeout)
    }

    async fn sample(&self, tenant: &Tenant) -> StepResult<MetricsSample> {
        let output = self.info_command(tenant).run_checked().await?;
        let sample = parse_info(&tenant.name, &output.stdout);

        let line = serde_json::to_string(&sample)
            .map_err(|e| StepFailure::collaborator(format!("serialize sample: {}", e)))?;
        append_line(&self.metrics_dir.join(format!("{}.jsonl", tenant.name)), &line)?;
        Ok(sample)
    }
}

#[async_trait]
impl MetricsCollector for TenantMetricsCollector {
    async fn collect_all_metrics(&self) -> StepResult<u64> {
        let tenants = list_tenants(&self.tenants_dir)?;
        let mut sampled = 0u64;
        let mut failures = Vec::new();

        for tenant in &tenants {
            match self.sample(tenant).await {
                Ok(sample) => {
                    debug!(
                        "[METRICS] {} used_memory={} clients={} keys={}",
                        tenant.name, sample.used_memory, sample.connected_clients, sample.keys
                    );
                    sampled += 1;
                }
                Err(e) => {
                    warn!("[METRICS] {}: {}", tenant.name, e);
                    failures.push(tenant.name.clone());
                }
            }
        }

        if !tenants.is_empty() && sampled == 0 {
            return Err(StepFailure::collaborator(format!(
                "no tenant could be sampled ({})",
                failures.join(", ")
            )));
        }

        info!("[METRICS] Sampled {}/{} tenants", sampled, tenants.len());
        Ok(sampled)
    }

    async fn cleanup_old_metrics(&self, older_than_days: u32) -> StepResult<u64> {
        if !self.metrics_dir.exists() {
            return Ok(0);
        }
        let cutoff = Utc::now() - Duration::days(older_than_days as i64);
        let mut removed = 0u64;

        for entry in fs::read_dir(&self.metrics_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }

            let content = fs::read_to_string(&path)?;
            let total = content.lines().filter(|l| !l.trim().is_empty()).count();
            let kept: Vec<&str> = content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .filter(|l| {
                    // unparseable lines are left for an operator to look at
                    serde_json::from_str::<MetricsSample>(l)
                        .map(|s| s.timestamp >= cutoff)
                        .unwrap_or(true)
                })
                .collect();

            if kept.len() == total {
                continue;
            }
            removed += (total - kept.len()) as u64;

            let mut body = kept.join("\n");
            if !body.is_empty() {
                body.push('\n');
            }
            atomic_write(&path, body.as_bytes(), 0o640)?;
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const INFO: &str = "# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\n\
# Clients\r\nconnected_clients:7\r\n# Keyspace\r\ndb0:keys=12,expires=3,avg_ttl=0\r\n\
db1:keys=5,expires=0,avg_ttl=0\r\n";

    #[test]
    fn test_parse_info() {
        let sample = parse_info("acme", INFO);
        assert_eq!(sample.tenant, "acme");
        assert_eq!(sample.used_memory, 1_048_576);
        assert_eq!(sample.connected_clients, 7);
        assert_eq!(sample.keys, 17);
    }

    #[test]
    fn test_parse_empty_info() {
        let sample = parse_info("acme", "");
        assert_eq!(sample.used_memory, 0);
        assert_eq!(sample.keys, 0);
    }

    fn collector(temp: &TempDir) -> TenantMetricsCollector {
        let mut config = Config::default();
        config.paths.tenants_dir = temp.path().join("tenants");
        config.paths.logs_dir = temp.path().join("logs");
        TenantMetricsCollector::new(&config)
    }

    #[tokio::test]
    async fn test_no_tenants_is_not_a_failure() {
        let temp = TempDir::new().unwrap();
        let collector = collector(&temp);
        assert_eq!(collector.collect_all_metrics().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_old_metrics() {
        let temp = TempDir::new().unwrap();
        let collector = collector(&temp);
        fs::create_dir_all(&collector.metrics_dir).unwrap();

        let sample = |days_ago: i64| {
            let mut s = parse_info("acme", INFO);
            s.timestamp = Utc::now() - Duration::days(days_ago);
            serde_json::to_string(&s).unwrap()
        };
        let file = collector.metrics_dir.join("acme.jsonl");
        fs::write(
            &file,
            format!("{}\n{}\n{}\nnot-json\n", sample(10), sample(8), sample(1)),
        )
        .unwrap();

        assert_eq!(collector.cleanup_old_metrics(7).await.unwrap(), 2);
        let remaining = fs::read_to_string(&file).unwrap();
        assert_eq!(remaining.lines().count(), 2);
        assert!(remaining.contains("not-json"));

        // second pass has nothing to do
        assert_eq!(collector.cleanup_old_metrics(7).await.unwrap(), 0);
    }

    #[test]
    fn test_info_command_sanitizes_container() {
        let temp = TempDir::new().unwrap();
        let collector = collector(&temp);
        let tenant = Tenant {
            name: "acme".into(),
            dir: temp.path().to_path_buf(),
            config: crate::tenants::TenantConfig::parse("PASSWORD=pw$(id)\n"),
        };
        // a password with shell metacharacters never reaches docker
        assert!(collector.info_command(&tenant).validate().is_err());
    }
}
