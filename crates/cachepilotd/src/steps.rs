//! Maintenance steps, their outcomes and the per-run record

use cachepilot_common::{CommandError, TriStateCode, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Pipeline steps, declared in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    SystemHealth,
    Certificates,
    Metrics,
    Alerts,
    Backups,
    Cleanup,
    Reporting,
    DiskSpace,
    DaemonStatus,
}

impl StepName {
    pub const ALL: [StepName; 9] = [
        StepName::SystemHealth,
        StepName::Certificates,
        StepName::Metrics,
        StepName::Alerts,
        StepName::Backups,
        StepName::Cleanup,
        StepName::Reporting,
        StepName::DiskSpace,
        StepName::DaemonStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemHealth => "system_health",
            Self::Certificates => "certificates",
            Self::Metrics => "metrics",
            Self::Alerts => "alerts",
            Self::Backups => "backups",
            Self::Cleanup => "cleanup",
            Self::Reporting => "reporting",
            Self::DiskSpace => "disk_space",
            Self::DaemonStatus => "daemon_status",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the orchestrator does when a step fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPolicy {
    pub abort_on_error: bool,
}

#[derive(Error, Debug)]
pub enum StepFailure {
    #[error("unhealthy: {0}")]
    Unhealthy(String),

    #[error("degraded: {0}")]
    Degraded(String),

    #[error("{what} timed out after {secs}s")]
    Timeout { what: String, secs: u64 },

    #[error("command failed: {0}")]
    Command(CommandError),

    #[error("{0}")]
    Collaborator(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StepFailure {
    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    /// Code a failed health-style check reports
    pub fn severity(&self) -> TriStateCode {
        match self {
            Self::Degraded(_) => TriStateCode::Degraded,
            Self::Validation(e) => e.severity(),
            _ => TriStateCode::Unhealthy,
        }
    }
}

impl From<CommandError> for StepFailure {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Timeout { program, secs } => Self::Timeout {
                what: program,
                secs,
            },
            other => Self::Command(other),
        }
    }
}

/// Result recorded for one step
#[derive(Debug)]
pub enum StepOutcome {
    Code(TriStateCode),
    Count(u64),
    Done,
    Failed(StepFailure),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn code(&self) -> Option<TriStateCode> {
        match self {
            Self::Code(c) => Some(*c),
            _ => None,
        }
    }

    pub fn count(&self) -> Option<u64> {
        match self {
            Self::Count(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(c) => write!(f, "{} ({})", c, c.code()),
            Self::Count(n) => write!(f, "{}", n),
            Self::Done => f.write_str("done"),
            Self::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    NotStarted,
    Running(StepName),
    Completed,
}

/// The canonical machine-readable result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceSummary {
    pub health_code: TriStateCode,
    pub cert_code: TriStateCode,
    pub disk_code: TriStateCode,
    pub unresolved_alerts: u64,
}

/// One invocation of the pipeline. Only the orchestrator mutates it.
#[derive(Debug)]
pub struct MaintenanceRun {
    timestamp: DateTime<Utc>,
    state: RunState,
    step_results: BTreeMap<StepName, StepOutcome>,
    unresolved_alert_count: u64,
}

impl Default for MaintenanceRun {
    fn default() -> Self {
        Self::new()
    }
}

impl MaintenanceRun {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            state: RunState::NotStarted,
            step_results: BTreeMap::new(),
            unresolved_alert_count: 0,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn step_results(&self) -> &BTreeMap<StepName, StepOutcome> {
        &self.step_results
    }

    pub fn outcome(&self, step: StepName) -> Option<&StepOutcome> {
        self.step_results.get(&step)
    }

    pub fn unresolved_alert_count(&self) -> u64 {
        self.unresolved_alert_count
    }

    /// Unrecorded or failed health-style steps count as unhealthy.
    pub fn code_for(&self, step: StepName) -> TriStateCode {
        match self.step_results.get(&step) {
            Some(StepOutcome::Code(c)) => *c,
            Some(StepOutcome::Failed(e)) => e.severity(),
            _ => TriStateCode::Unhealthy,
        }
    }

    pub fn summary(&self) -> MaintenanceSummary {
        MaintenanceSummary {
            health_code: self.code_for(StepName::SystemHealth),
            cert_code: self.code_for(StepName::Certificates),
            disk_code: self.code_for(StepName::DiskSpace),
            unresolved_alerts: self.unresolved_alert_count,
        }
    }

    pub(crate) fn begin(&mut self, step: StepName) {
        self.state = RunState::Running(step);
    }

    pub(crate) fn record(&mut self, step: StepName, outcome: StepOutcome) {
        if let StepOutcome::Count(n) = outcome {
            if step == StepName::Alerts {
                self.unresolved_alert_count = n;
            }
        }
        self.step_results.insert(step, outcome);
    }

    pub(crate) fn complete(&mut self) {
        self.state = RunState::Completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_order() {
        let mut sorted = StepName::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, StepName::ALL.to_vec());
        assert_eq!(StepName::ALL[0], StepName::SystemHealth);
        assert_eq!(StepName::ALL[8], StepName::DaemonStatus);
    }

    #[test]
    fn test_default_policy_never_aborts() {
        assert!(!StepPolicy::default().abort_on_error);
    }

    #[test]
    fn test_run_state_transitions() {
        let mut run = MaintenanceRun::new();
        assert_eq!(run.state(), RunState::NotStarted);
        run.begin(StepName::Certificates);
        assert_eq!(run.state(), RunState::Running(StepName::Certificates));
        run.complete();
        assert_eq!(run.state(), RunState::Completed);
    }

    #[test]
    fn test_summary_from_results() {
        let mut run = MaintenanceRun::new();
        run.record(StepName::SystemHealth, StepOutcome::Code(TriStateCode::Healthy));
        run.record(
            StepName::Certificates,
            StepOutcome::Failed(StepFailure::Degraded("expiring".into())),
        );
        run.record(StepName::Alerts, StepOutcome::Count(4));

        let summary = run.summary();
        assert_eq!(summary.health_code, TriStateCode::Healthy);
        assert_eq!(summary.cert_code, TriStateCode::Degraded);
        // disk never recorded
        assert_eq!(summary.disk_code, TriStateCode::Unhealthy);
        assert_eq!(summary.unresolved_alerts, 4);
    }

    #[test]
    fn test_summary_json_keys() {
        let summary = MaintenanceSummary {
            health_code: TriStateCode::Unhealthy,
            cert_code: TriStateCode::Degraded,
            disk_code: TriStateCode::Healthy,
            unresolved_alerts: 2,
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert_eq!(
            json,
            r#"{"health_code":2,"cert_code":1,"disk_code":0,"unresolved_alerts":2}"#
        );
    }

    #[test]
    fn test_command_timeout_maps_to_timeout() {
        let failure: StepFailure = CommandError::Timeout {
            program: "docker".into(),
            secs: 30,
        }
        .into();
        assert!(matches!(failure, StepFailure::Timeout { secs: 30, .. }));
        assert_eq!(failure.severity(), TriStateCode::Unhealthy);
    }
}
