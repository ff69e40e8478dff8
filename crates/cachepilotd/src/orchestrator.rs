//! Maintenance Orchestrator v2.2.0
//!
//! Runs the fixed step sequence once, strictly in order:
//! health, certificates, metrics, alerts, backups, cleanup, reporting,
//! disk, daemon.
//!
//! A step failure is logged (and for health/daemon, alerted or recorded as a
//! security event) and the pipeline moves on. The run always reaches
//! `Completed` and emits exactly one summary line.

use cachepilot_common::{
    FileLogSink, LogEntry, LogLevel, LogSink, SecurityEventLogger, SecurityEventType, StderrSink,
    StructuredLogger, TriStateCode,
};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, warn};

use crate::alerts::AlertSeverity;
use crate::collaborators::{Collaborators, StepResult};
use crate::config::{Config, MaintenanceConfig};
use crate::lock::RunLock;
use crate::steps::{MaintenanceRun, StepFailure, StepName, StepOutcome, StepPolicy};

/// Component name on maintenance log lines
pub const LOG_COMPONENT: &str = "maintenance";

pub struct MaintenanceOrchestrator {
    collaborators: Collaborators,
    settings: MaintenanceConfig,
    policies: BTreeMap<StepName, StepPolicy>,
    log: StructuredLogger,
    security: SecurityEventLogger,
}

impl MaintenanceOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        settings: MaintenanceConfig,
        log: StructuredLogger,
        security: SecurityEventLogger,
    ) -> Self {
        Self {
            collaborators,
            settings,
            policies: BTreeMap::new(),
            log,
            security,
        }
    }

    pub fn with_policy(mut self, step: StepName, policy: StepPolicy) -> Self {
        self.policies.insert(step, policy);
        self
    }

    pub fn policy(&self, step: StepName) -> StepPolicy {
        self.policies.get(&step).copied().unwrap_or_default()
    }

    /// Run unless another run holds `lock_file`; `Ok(None)` when skipped.
    pub async fn run_exclusive(&self, lock_file: &Path) -> io::Result<Option<MaintenanceRun>> {
        let Some(_lock) = RunLock::try_acquire(lock_file)? else {
            warn!("[MAINT] Another maintenance run holds {}", lock_file.display());
            self.log
                .warn(format!("skipped: another run holds {}", lock_file.display()));
            return Ok(None);
        };
        Ok(Some(self.run().await))
    }

    pub async fn run(&self) -> MaintenanceRun {
        let mut run = MaintenanceRun::new();
        self.log.info("maintenance run started");

        for step in StepName::ALL {
            run.begin(step);
            let outcome = self.execute(step).await;
            self.log_outcome(step, &outcome);

            let abort = outcome.is_failed() && self.policy(step).abort_on_error;
            run.record(step, outcome);
            if abort {
                self.log.error(format!("aborting run after {} failed", step));
                break;
            }
        }

        if run.outcome(StepName::Alerts).is_some_and(StepOutcome::is_failed) {
            self.log
                .warn("unresolved alert count unknown, summary reports 0");
        }

        run.complete();
        log_summary(&self.log, &run);
        run
    }

    async fn execute(&self, step: StepName) -> StepOutcome {
        match step {
            StepName::SystemHealth => StepOutcome::Code(self.system_health().await),
            StepName::Certificates => StepOutcome::Code(self.certificates().await),
            StepName::Metrics => into_count(self.collaborators.metrics.collect_all_metrics().await),
            StepName::Alerts => self.alert_audit().await,
            StepName::Backups => into_count(self.backups().await),
            StepName::Cleanup => self.cleanup().await,
            StepName::Reporting => match self.collaborators.reporter.generate_stats().await {
                Ok(()) => StepOutcome::Done,
                Err(e) => StepOutcome::Failed(e),
            },
            StepName::DiskSpace => {
                let result = self.collaborators.health.disk_space().await;
                StepOutcome::Code(self.code_or_log("disk space check", result))
            }
            StepName::DaemonStatus => StepOutcome::Code(self.daemon_status().await),
        }
    }

    fn code_or_log(&self, what: &str, result: StepResult<TriStateCode>) -> TriStateCode {
        match result {
            Ok(code) => code,
            Err(e) => {
                self.log.error(format!("{} failed: {}", what, e));
                e.severity()
            }
        }
    }

    async fn system_health(&self) -> TriStateCode {
        let result = self.collaborators.health.system().await;
        let code = self.code_or_log("system health check", result);

        if code == TriStateCode::Unhealthy {
            let created = self
                .collaborators
                .alerts
                .create_alert(
                    AlertSeverity::Critical,
                    "System health critical",
                    "System health check reported UNHEALTHY during scheduled maintenance",
                    None,
                )
                .await;
            if let Err(e) = created {
                self.log.error(format!("cannot create critical alert: {}", e));
            }
        }
        code
    }

    async fn certificates(&self) -> TriStateCode {
        let result = self.collaborators.health.certificates().await;
        let code = self.code_or_log("certificate health check", result);

        match self.collaborators.certificates.check_expiring().await {
            Ok(0) => {}
            Ok(n) => self.log.warn(format!("{} certificate(s) expiring or expired", n)),
            Err(e) => self.log.warn(format!("certificate expiry check failed: {}", e)),
        }
        if let Err(e) = self.collaborators.certificates.renew_expiring().await {
            self.log.warn(format!("certificate renewal failed: {}", e));
        }
        code
    }

    async fn alert_audit(&self) -> StepOutcome {
        match self.collaborators.alerts.count_unresolved_alerts().await {
            Ok(0) => StepOutcome::Count(0),
            Ok(n) => {
                self.log.warn(format!("{} unresolved alert(s)", n));
                StepOutcome::Count(n)
            }
            Err(e) => StepOutcome::Failed(e),
        }
    }

    async fn backups(&self) -> StepResult<u64> {
        self.collaborators.backups.backup_init().await?;
        self.collaborators.backups.backup_auto_run().await
    }

    async fn cleanup(&self) -> StepOutcome {
        let c = &self.collaborators;
        let s = &self.settings;
        let results = [
            (
                "maintenance logs",
                c.retention.cleanup_logs(s.maintenance_log_retention_days).await,
            ),
            (
                "metrics",
                c.metrics.cleanup_old_metrics(s.metrics_retention_days).await,
            ),
            (
                "resolved alerts",
                c.alerts.cleanup_resolved_alerts(s.alert_retention_days).await,
            ),
        ];

        let mut removed = 0u64;
        let mut first_failure: Option<StepFailure> = None;
        for (what, result) in results {
            match result {
                Ok(n) => removed += n,
                Err(e) => {
                    self.log.warn(format!("cleanup of {} failed: {}", what, e));
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
        }

        match first_failure {
            Some(e) => StepOutcome::Failed(e),
            None => StepOutcome::Count(removed),
        }
    }

    async fn daemon_status(&self) -> TriStateCode {
        let (code, detail) = match self.collaborators.health.container_daemon().await {
            Ok(TriStateCode::Healthy) => (TriStateCode::Healthy, String::new()),
            Ok(other) => (TriStateCode::Unhealthy, format!("daemon reported {}", other)),
            Err(e) => (TriStateCode::Unhealthy, e.to_string()),
        };

        if !code.is_healthy() {
            self.security.log_event(
                SecurityEventType::Error,
                &format!("Container runtime daemon is not running: {}", detail),
            );
        }
        code
    }

    fn log_outcome(&self, step: StepName, outcome: &StepOutcome) {
        let level = match outcome {
            StepOutcome::Code(TriStateCode::Healthy) => LogLevel::Info,
            StepOutcome::Code(TriStateCode::Degraded) => LogLevel::Warn,
            StepOutcome::Code(TriStateCode::Unhealthy) => LogLevel::Error,
            StepOutcome::Failed(_) if step == StepName::Backups => LogLevel::Error,
            StepOutcome::Failed(_) => LogLevel::Warn,
            StepOutcome::Count(_) | StepOutcome::Done => LogLevel::Info,
        };
        self.log
            .log(LogEntry::new(level, LOG_COMPONENT, format!("{}: {}", step, outcome)));
    }
}

/// Today's maintenance log; stderr when the configured logs dir is unusable.
pub fn maintenance_logger(config: &Config) -> StructuredLogger {
    let sink: Arc<dyn LogSink> = if config.paths.logs_dir.is_absolute() {
        Arc::new(FileLogSink::new(config.paths.maintenance_log_file()))
    } else {
        Arc::new(StderrSink)
    };
    StructuredLogger::new(LOG_COMPONENT, sink)
}

/// One scheduled run against the host. `None` only when another run holds
/// the lock; every other path ends with a summary line.
pub async fn run_on_host(config: &Config) -> Option<MaintenanceRun> {
    let log = maintenance_logger(config);

    if let Err(e) = config.validate() {
        error!("[CONFIG] Refusing to run: {:#}", e);
        return Some(refused_run(&log, &format!("invalid configuration: {:#}", e)));
    }

    let security = SecurityEventLogger::new(Arc::new(FileLogSink::new(
        config.paths.security_log_file(),
    )));
    let orchestrator = MaintenanceOrchestrator::new(
        Collaborators::on_host(config),
        config.maintenance.clone(),
        log.clone(),
        security,
    );

    let lock_file = &config.maintenance.lock_file;
    match orchestrator.run_exclusive(lock_file).await {
        Ok(run) => run,
        Err(e) => {
            error!("[LOCK] Cannot open {}: {}", lock_file.display(), e);
            Some(refused_run(
                &log,
                &format!("cannot open run lock {}: {}", lock_file.display(), e),
            ))
        }
    }
}

/// A run that could not start. No step executes; the summary line is still
/// written and every code reads as unhealthy.
pub fn refused_run(log: &StructuredLogger, reason: &str) -> MaintenanceRun {
    let mut run = MaintenanceRun::new();
    log.error(format!("maintenance run refused: {}", reason));
    run.complete();
    log_summary(log, &run);
    run
}

fn log_summary(log: &StructuredLogger, run: &MaintenanceRun) {
    let summary = run.summary();
    let context = serde_json::to_value(summary).unwrap_or_default();
    let level = if summary.health_code.is_healthy()
        && summary.cert_code.is_healthy()
        && summary.disk_code.is_healthy()
    {
        LogLevel::Info
    } else {
        LogLevel::Warn
    };
    log.log(LogEntry::new(level, LOG_COMPONENT, "maintenance run completed").with_context(context));
}

fn into_count(result: StepResult<u64>) -> StepOutcome {
    match result {
        Ok(n) => StepOutcome::Count(n),
        Err(e) => StepOutcome::Failed(e),
    }
}
