//! Host health checks
//!
//! - system: worst of memory pressure and 1-minute load per core
//! - certificates: worst classification across the CA store
//! - disk: free space on the filesystem holding base_dir
//! - daemon: `docker info` exit status

use async_trait::async_trait;
use cachepilot_common::{CertificateInspector, GuardedCommand, TriStateCode};
use nix::sys::statvfs::statvfs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::System;
use tracing::{debug, warn};

use crate::certs::{classify_certificates, discover_certificates};
use crate::collaborators::{HealthChecks, StepResult};
use crate::config::{Config, MaintenanceConfig};
use crate::steps::StepFailure;

/// 1-minute load average per core
const LOAD_WARN_PER_CORE: f64 = 1.0;
const LOAD_CRITICAL_PER_CORE: f64 = 2.0;

/// Memory-percent and load-per-core classification combined
pub fn classify_system(
    memory_used_percent: f64,
    load_per_core: f64,
    thresholds: &MaintenanceConfig,
) -> TriStateCode {
    let memory = TriStateCode::from_ceiling(
        memory_used_percent,
        thresholds.memory_warn_percent,
        thresholds.memory_critical_percent,
    );
    let load = TriStateCode::from_ceiling(load_per_core, LOAD_WARN_PER_CORE, LOAD_CRITICAL_PER_CORE);
    TriStateCode::worst([memory, load])
}

/// Free-space percentage of the filesystem holding `path` (or its nearest
/// existing ancestor).
pub fn free_space_percent(path: &Path) -> StepResult<f64> {
    let existing = path
        .ancestors()
        .find(|p| p.exists())
        .unwrap_or_else(|| Path::new("/"));

    let stat = statvfs(existing).map_err(|e| {
        StepFailure::collaborator(format!("statvfs {}: {}", existing.display(), e))
    })?;

    let total = stat.blocks() as f64;
    if total == 0.0 {
        return Err(StepFailure::collaborator(format!(
            "{} reports zero capacity",
            existing.display()
        )));
    }
    Ok(stat.blocks_available() as f64 / total * 100.0)
}

pub struct HostHealthChecks {
    base_dir: PathBuf,
    ca_dir: PathBuf,
    thresholds: MaintenanceConfig,
    timeout: Duration,
}

impl HostHealthChecks {
    pub fn new(config: &Config) -> Self {
        Self {
            base_dir: config.paths.base_dir.clone(),
            ca_dir: config.paths.ca_dir.clone(),
            thresholds: config.maintenance.clone(),
            timeout: config.maintenance.command_timeout(),
        }
    }
}

#[async_trait]
impl HealthChecks for HostHealthChecks {
    async fn system(&self) -> StepResult<TriStateCode> {
        let mut sys = System::new();
        sys.refresh_memory();

        let total = sys.total_memory();
        let memory_percent = if total == 0 {
            0.0
        } else {
            (total - sys.available_memory().min(total)) as f64 / total as f64 * 100.0
        };
        let load_per_core = System::load_average().one / num_cpus::get().max(1) as f64;

        let code = classify_system(memory_percent, load_per_core, &self.thresholds);
        debug!(
            "[HEALTH] memory {:.1}% load/core {:.2} -> {}",
            memory_percent, load_per_core, code
        );
        Ok(code)
    }

    async fn certificates(&self) -> StepResult<TriStateCode> {
        let inspector = CertificateInspector::new(self.timeout);
        let certs = discover_certificates(&self.ca_dir);
        let results =
            classify_certificates(&inspector, &certs, self.thresholds.cert_warn_days).await;
        Ok(TriStateCode::worst(results.into_iter().map(|(_, code)| code)))
    }

    async fn disk_space(&self) -> StepResult<TriStateCode> {
        let free = free_space_percent(&self.base_dir)?;
        let code = TriStateCode::from_floor(
            free,
            self.thresholds.disk_warn_free_percent,
            self.thresholds.disk_critical_free_percent,
        );
        if !code.is_healthy() {
            warn!("[HEALTH] {:.1}% free on {}", free, self.base_dir.display());
        }
        Ok(code)
    }

    async fn container_daemon(&self) -> StepResult<TriStateCode> {
        let output = GuardedCommand::new("docker")
            .arg("info")
            .timeout(self.timeout)
            .run()
            .await?;
        if output.success() {
            Ok(TriStateCode::Healthy)
        } else {
            warn!("[HEALTH] docker info exited with {}", output.exit_code);
            Ok(TriStateCode::Unhealthy)
        }
    }
}
