//! End-to-end maintenance runs over fake and file-backed collaborators

use cachepilot_common::{MemorySink, SecurityEventLogger, StructuredLogger, TriStateCode};
use cachepilotd::alerts::{AlertSeverity, FileAlertStore};
use cachepilotd::collaborators::{new_call_log, FakeHealthChecks};
use cachepilotd::config::MaintenanceConfig;
use cachepilotd::orchestrator::LOG_COMPONENT;
use cachepilotd::{Collaborators, MaintenanceOrchestrator, RunState, StepName};
use std::sync::Arc;
use tempfile::TempDir;

struct Sinks {
    log: MemorySink,
    security: MemorySink,
    escalations: MemorySink,
}

fn orchestrator(collaborators: Collaborators) -> (MaintenanceOrchestrator, Sinks) {
    let sinks = Sinks {
        log: MemorySink::new(),
        security: MemorySink::new(),
        escalations: MemorySink::new(),
    };
    let orchestrator = MaintenanceOrchestrator::new(
        collaborators,
        MaintenanceConfig::default(),
        StructuredLogger::new(LOG_COMPONENT, Arc::new(sinks.log.clone())),
        SecurityEventLogger::with_error_stream(
            Arc::new(sinks.security.clone()),
            Arc::new(sinks.escalations.clone()),
        ),
    );
    (orchestrator, sinks)
}

#[tokio::test]
async fn test_unhealthy_host_still_completes() {
    let calls = new_call_log();
    let mut fakes = Collaborators::fakes(&calls);
    fakes.health = Arc::new(
        FakeHealthChecks::new(&calls)
            .with_system(Some(TriStateCode::Unhealthy))
            .with_certificates(Some(TriStateCode::Unhealthy))
            .with_daemon(Some(TriStateCode::Unhealthy)),
    );
    let (orchestrator, sinks) = orchestrator(fakes.collaborators());

    let run = orchestrator.run().await;

    assert_eq!(run.state(), RunState::Completed);
    assert_eq!(run.step_results().len(), StepName::ALL.len());

    let created = fakes.alerts.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].severity, AlertSeverity::Critical);

    let lines = sinks.log.lines();
    let summaries: Vec<_> = lines
        .iter()
        .filter(|l| l.contains("maintenance run completed"))
        .collect();
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0]
        .ends_with(r#"{"health_code":2,"cert_code":2,"disk_code":0,"unresolved_alerts":1}"#));
    assert!(sinks.log.contains("ERROR maintenance certificates:"));
    assert!(sinks.log.contains("ERROR maintenance daemon_status:"));

    assert!(sinks
        .security
        .contains("[ERROR] Container runtime daemon is not running"));
    assert_eq!(sinks.escalations.lines().len(), 1);
}

#[tokio::test]
async fn test_daemon_check_timeout_is_recorded() {
    let calls = new_call_log();
    let mut fakes = Collaborators::fakes(&calls);
    fakes.health = Arc::new(FakeHealthChecks::new(&calls).with_daemon(None));
    let (orchestrator, sinks) = orchestrator(fakes.collaborators());

    let run = orchestrator.run().await;

    assert_eq!(run.state(), RunState::Completed);
    assert_eq!(run.code_for(StepName::DaemonStatus), TriStateCode::Unhealthy);
    assert!(fakes.alerts.created().is_empty());
    assert!(sinks.security.contains("Container runtime daemon is not running"));
}

#[tokio::test]
async fn test_critical_alert_lands_in_history_file() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FileAlertStore::new(temp.path().join("alerts/history.json")));

    let calls = new_call_log();
    let fakes = Collaborators::fakes(&calls);
    let mut collaborators = fakes.collaborators();
    collaborators.alerts = store.clone();
    collaborators.health = Arc::new(
        FakeHealthChecks::new(&calls).with_system(Some(TriStateCode::Unhealthy)),
    );
    let (orchestrator, _sinks) = orchestrator(collaborators);

    let run = orchestrator.run().await;
    assert_eq!(run.unresolved_alert_count(), 1);

    let alerts = store.list(Some(AlertSeverity::Critical), None, Some(false)).unwrap();
    assert_eq!(alerts.len(), 1);
    assert!(store.resolve_alert(&alerts[0].id).unwrap());

    let second = orchestrator.run().await;
    assert_eq!(second.unresolved_alert_count(), 1);
    assert_eq!(store.list(None, None, Some(true)).unwrap().len(), 1);
}
