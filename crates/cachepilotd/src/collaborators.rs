//! Collaborator Traits v2.2.0
//!
//! The maintenance pipeline talks to alerting, metrics, backups, health
//! checks, certificate renewal, reporting and log retention through these
//! traits only.
//!
//! Production code uses the on-host implementations (`Collaborators::on_host`).
//! Tests use the `Fake*` implementations below, which record every call in a
//! shared `CallLog`.

use async_trait::async_trait;
use cachepilot_common::TriStateCode;
use std::sync::{Arc, Mutex};

use crate::alerts::{AlertSeverity, FileAlertStore};
use crate::backups::TarBackupService;
use crate::certs::HostCertificateMaintenance;
use crate::config::Config;
use crate::health_checks::HostHealthChecks;
use crate::metrics::TenantMetricsCollector;
use crate::reporting::StatsReporter;
use crate::retention::FileLogRetention;
use crate::steps::StepFailure;

pub type StepResult<T> = Result<T, StepFailure>;

// ============================================================================
// Traits
// ============================================================================

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create_alert(
        &self,
        severity: AlertSeverity,
        title: &str,
        description: &str,
        tenant: Option<&str>,
    ) -> StepResult<()>;

    async fn count_unresolved_alerts(&self) -> StepResult<u64>;

    /// Drop resolved alerts older than the cutoff; returns how many went
    async fn cleanup_resolved_alerts(&self, older_than_days: u32) -> StepResult<u64>;
}

#[async_trait]
pub trait MetricsCollector: Send + Sync {
    /// Returns the number of tenants sampled
    async fn collect_all_metrics(&self) -> StepResult<u64>;

    async fn cleanup_old_metrics(&self, older_than_days: u32) -> StepResult<u64>;
}

#[async_trait]
pub trait BackupService: Send + Sync {
    async fn backup_init(&self) -> StepResult<()>;

    /// Returns the number of archives written
    async fn backup_auto_run(&self) -> StepResult<u64>;
}

/// Per-subsystem tri-state checks
#[async_trait]
pub trait HealthChecks: Send + Sync {
    async fn system(&self) -> StepResult<TriStateCode>;
    async fn certificates(&self) -> StepResult<TriStateCode>;
    async fn disk_space(&self) -> StepResult<TriStateCode>;
    /// Healthy or Unhealthy only
    async fn container_daemon(&self) -> StepResult<TriStateCode>;
}

#[async_trait]
pub trait CertificateMaintenance: Send + Sync {
    /// Number of certificates inside the warning window or expired
    async fn check_expiring(&self) -> StepResult<u64>;

    async fn renew_expiring(&self) -> StepResult<()>;
}

#[async_trait]
pub trait Reporter: Send + Sync {
    async fn generate_stats(&self) -> StepResult<()>;
}

#[async_trait]
pub trait LogRetention: Send + Sync {
    /// Delete maintenance logs older than the cutoff; returns files removed
    async fn cleanup_logs(&self, older_than_days: u32) -> StepResult<u64>;
}

/// Everything the orchestrator calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub alerts: Arc<dyn AlertStore>,
    pub metrics: Arc<dyn MetricsCollector>,
    pub backups: Arc<dyn BackupService>,
    pub health: Arc<dyn HealthChecks>,
    pub certificates: Arc<dyn CertificateMaintenance>,
    pub reporter: Arc<dyn Reporter>,
    pub retention: Arc<dyn LogRetention>,
}

impl Collaborators {
    pub fn on_host(config: &Config) -> Self {
        Self {
            alerts: Arc::new(FileAlertStore::new(config.paths.alerts_file())),
            metrics: Arc::new(TenantMetricsCollector::new(config)),
            backups: Arc::new(TarBackupService::new(config)),
            health: Arc::new(HostHealthChecks::new(config)),
            certificates: Arc::new(HostCertificateMaintenance::new(config)),
            reporter: Arc::new(StatsReporter::new(config)),
            retention: Arc::new(FileLogRetention::new(config.paths.maintenance_log_dir())),
        }
    }

    /// A full set of fakes sharing one call log
    pub fn fakes(calls: &CallLog) -> FakeSet {
        FakeSet {
            alerts: Arc::new(FakeAlertStore::new(calls)),
            metrics: Arc::new(FakeMetricsCollector::new(calls)),
            backups: Arc::new(FakeBackupService::new(calls)),
            health: Arc::new(FakeHealthChecks::new(calls)),
            certificates: Arc::new(FakeCertificateMaintenance::new(calls)),
            reporter: Arc::new(FakeReporter::new(calls)),
            retention: Arc::new(FakeLogRetention::new(calls)),
        }
    }
}

// ============================================================================
// Fakes (Testing)
// ============================================================================

/// Ordered record of collaborator calls, e.g. `"metrics.collect"`
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn new_call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(calls: &CallLog, call: &str) {
    if let Ok(mut log) = calls.lock() {
        log.push(call.to_string());
    }
}

fn fake_timeout(what: &str) -> StepFailure {
    StepFailure::Timeout {
        what: what.to_string(),
        secs: 30,
    }
}

/// Concrete fakes, kept typed so tests can inspect them after a run
#[derive(Clone)]
pub struct FakeSet {
    pub alerts: Arc<FakeAlertStore>,
    pub metrics: Arc<FakeMetricsCollector>,
    pub backups: Arc<FakeBackupService>,
    pub health: Arc<FakeHealthChecks>,
    pub certificates: Arc<FakeCertificateMaintenance>,
    pub reporter: Arc<FakeReporter>,
    pub retention: Arc<FakeLogRetention>,
}

impl FakeSet {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            alerts: self.alerts.clone(),
            metrics: self.metrics.clone(),
            backups: self.backups.clone(),
            health: self.health.clone(),
            certificates: self.certificates.clone(),
            reporter: self.reporter.clone(),
            retention: self.retention.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeAlert {
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub tenant: Option<String>,
}

pub struct FakeAlertStore {
    calls: CallLog,
    created: Mutex<Vec<FakeAlert>>,
    preexisting_unresolved: u64,
    fail_count: bool,
}

impl FakeAlertStore {
    pub fn new(calls: &CallLog) -> Self {
        Self {
            calls: calls.clone(),
            created: Mutex::new(Vec::new()),
            preexisting_unresolved: 0,
            fail_count: false,
        }
    }

    pub fn with_unresolved(mut self, count: u64) -> Self {
        self.preexisting_unresolved = count;
        self
    }

    pub fn failing_count(mut self) -> Self {
        self.fail_count = true;
        self
    }

    pub fn created(&self) -> Vec<FakeAlert> {
        self.created.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AlertStore for FakeAlertStore {
    async fn create_alert(
        &self,
        severity: AlertSeverity,
        title: &str,
        description: &str,
        tenant: Option<&str>,
    ) -> StepResult<()> {
        record(&self.calls, "alerts.create");
        self.created
            .lock()
            .map_err(|_| StepFailure::collaborator("alert fake poisoned"))?
            .push(FakeAlert {
                severity,
                title: title.to_string(),
                description: description.to_string(),
                tenant: tenant.map(str::to_string),
            });
        Ok(())
    }

    async fn count_unresolved_alerts(&self) -> StepResult<u64> {
        record(&self.calls, "alerts.count_unresolved");
        if self.fail_count {
            return Err(StepFailure::collaborator("alert history unreadable"));
        }
        Ok(self.preexisting_unresolved + self.created().len() as u64)
    }

    async fn cleanup_resolved_alerts(&self, _older_than_days: u32) -> StepResult<u64> {
        record(&self.calls, "alerts.cleanup");
        Ok(0)
    }
}

pub struct FakeMetricsCollector {
    calls: CallLog,
    fail: bool,
}

impl FakeMetricsCollector {
    pub fn new(calls: &CallLog) -> Self {
        Self {
            calls: calls.clone(),
            fail: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl MetricsCollector for FakeMetricsCollector {
    async fn collect_all_metrics(&self) -> StepResult<u64> {
        record(&self.calls, "metrics.collect");
        if self.fail {
            return Err(fake_timeout("docker"));
        }
        Ok(2)
    }

    async fn cleanup_old_metrics(&self, _older_than_days: u32) -> StepResult<u64> {
        record(&self.calls, "metrics.cleanup");
        Ok(0)
    }
}

pub struct FakeBackupService {
    calls: CallLog,
    fail_auto_run: bool,
}

impl FakeBackupService {
    pub fn new(calls: &CallLog) -> Self {
        Self {
            calls: calls.clone(),
            fail_auto_run: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_auto_run = true;
        self
    }
}

#[async_trait]
impl BackupService for FakeBackupService {
    async fn backup_init(&self) -> StepResult<()> {
        record(&self.calls, "backups.init");
        Ok(())
    }

    async fn backup_auto_run(&self) -> StepResult<u64> {
        record(&self.calls, "backups.auto_run");
        if self.fail_auto_run {
            return Err(StepFailure::collaborator("tar exited with 2"));
        }
        Ok(1)
    }
}

/// `None` for a check makes it time out
pub struct FakeHealthChecks {
    calls: CallLog,
    system: Option<TriStateCode>,
    certificates: Option<TriStateCode>,
    disk: Option<TriStateCode>,
    daemon: Option<TriStateCode>,
}

impl FakeHealthChecks {
    /// All checks healthy
    pub fn new(calls: &CallLog) -> Self {
        Self {
            calls: calls.clone(),
            system: Some(TriStateCode::Healthy),
            certificates: Some(TriStateCode::Healthy),
            disk: Some(TriStateCode::Healthy),
            daemon: Some(TriStateCode::Healthy),
        }
    }

    pub fn with_system(mut self, code: Option<TriStateCode>) -> Self {
        self.system = code;
        self
    }

    pub fn with_certificates(mut self, code: Option<TriStateCode>) -> Self {
        self.certificates = code;
        self
    }

    pub fn with_disk(mut self, code: Option<TriStateCode>) -> Self {
        self.disk = code;
        self
    }

    pub fn with_daemon(mut self, code: Option<TriStateCode>) -> Self {
        self.daemon = code;
        self
    }

    fn answer(&self, call: &str, code: Option<TriStateCode>) -> StepResult<TriStateCode> {
        record(&self.calls, call);
        code.ok_or_else(|| fake_timeout(call))
    }
}

#[async_trait]
impl HealthChecks for FakeHealthChecks {
    async fn system(&self) -> StepResult<TriStateCode> {
        self.answer("health.system", self.system)
    }

    async fn certificates(&self) -> StepResult<TriStateCode> {
        self.answer("health.certificates", self.certificates)
    }

    async fn disk_space(&self) -> StepResult<TriStateCode> {
        self.answer("health.disk", self.disk)
    }

    async fn container_daemon(&self) -> StepResult<TriStateCode> {
        self.answer("health.daemon", self.daemon)
    }
}

pub struct FakeCertificateMaintenance {
    calls: CallLog,
    expiring: u64,
    fail_check: bool,
    fail_renew: bool,
}

impl FakeCertificateMaintenance {
    pub fn new(calls: &CallLog) -> Self {
        Self {
            calls: calls.clone(),
            expiring: 0,
            fail_check: false,
            fail_renew: false,
        }
    }

    pub fn expiring(mut self, count: u64) -> Self {
        self.expiring = count;
        self
    }

    pub fn failing_check(mut self) -> Self {
        self.fail_check = true;
        self
    }

    pub fn failing_renew(mut self) -> Self {
        self.fail_renew = true;
        self
    }
}

#[async_trait]
impl CertificateMaintenance for FakeCertificateMaintenance {
    async fn check_expiring(&self) -> StepResult<u64> {
        record(&self.calls, "certs.check_expiring");
        if self.fail_check {
            return Err(StepFailure::collaborator("openssl exited with 1"));
        }
        Ok(self.expiring)
    }

    async fn renew_expiring(&self) -> StepResult<()> {
        record(&self.calls, "certs.renew_expiring");
        if self.fail_renew {
            return Err(StepFailure::collaborator("renewal hook exited with 1"));
        }
        Ok(())
    }
}

pub struct FakeReporter {
    calls: CallLog,
    fail: bool,
}

impl FakeReporter {
    pub fn new(calls: &CallLog) -> Self {
        Self {
            calls: calls.clone(),
            fail: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl Reporter for FakeReporter {
    async fn generate_stats(&self) -> StepResult<()> {
        record(&self.calls, "reporter.stats");
        if self.fail {
            return Err(fake_timeout("docker"));
        }
        Ok(())
    }
}

pub struct FakeLogRetention {
    calls: CallLog,
}

impl FakeLogRetention {
    pub fn new(calls: &CallLog) -> Self {
        Self {
            calls: calls.clone(),
        }
    }
}

#[async_trait]
impl LogRetention for FakeLogRetention {
    async fn cleanup_logs(&self, _older_than_days: u32) -> StepResult<u64> {
        record(&self.calls, "retention.cleanup_logs");
        Ok(3)
    }
}
