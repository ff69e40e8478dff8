//! Alert history
//!
//! JSON array at {logs_dir}/alerts/history.json. Rewritten atomically on
//! every change.

use async_trait::async_trait;
use cachepilot_common::permissions::atomic_write;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collaborators::{AlertStore, StepResult};
use crate::steps::StepFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tenant: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(severity: AlertSeverity, title: &str, description: &str, tenant: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            severity,
            title: title.to_string(),
            description: description.to_string(),
            tenant: tenant.map(str::to_string),
            timestamp: Utc::now(),
            resolved: false,
            resolved_at: None,
        }
    }
}

pub struct FileAlertStore {
    path: PathBuf,
    // serializes read-modify-write cycles within this process
    guard: Mutex<()>,
}

impl FileAlertStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file = no alerts
    pub fn load(&self) -> StepResult<Vec<Alert>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            StepFailure::collaborator(format!("corrupt alert history {}: {}", self.path.display(), e))
        })
    }

    fn save(&self, alerts: &[Alert]) -> StepResult<()> {
        let json = serde_json::to_vec_pretty(alerts)
            .map_err(|e| StepFailure::collaborator(format!("serialize alerts: {}", e)))?;
        atomic_write(&self.path, &json, 0o640)?;
        Ok(())
    }

    fn modify<T>(&self, f: impl FnOnce(&mut Vec<Alert>) -> T) -> StepResult<T> {
        let _lock = self
            .guard
            .lock()
            .map_err(|_| StepFailure::collaborator("alert store lock poisoned"))?;
        let mut alerts = self.load()?;
        let result = f(&mut alerts);
        self.save(&alerts)?;
        Ok(result)
    }

    /// Filter by severity, tenant and resolution state
    pub fn list(
        &self,
        severity: Option<AlertSeverity>,
        tenant: Option<&str>,
        resolved: Option<bool>,
    ) -> StepResult<Vec<Alert>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .filter(|a| tenant.map_or(true, |t| a.tenant.as_deref() == Some(t)))
            .filter(|a| resolved.map_or(true, |r| a.resolved == r))
            .collect())
    }

    /// Mark one alert resolved; `false` when no alert has that id.
    pub fn resolve_alert(&self, id: &str) -> StepResult<bool> {
        self.modify(|alerts| match alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.resolved = true;
                alert.resolved_at = Some(Utc::now());
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl AlertStore for FileAlertStore {
    async fn create_alert(
        &self,
        severity: AlertSeverity,
        title: &str,
        description: &str,
        tenant: Option<&str>,
    ) -> StepResult<()> {
        let alert = Alert::new(severity, title, description, tenant);
        info!("[ALERT] {} {}: {}", alert.severity, alert.title, alert.id);
        self.modify(|alerts| alerts.push(alert))
    }

    async fn count_unresolved_alerts(&self) -> StepResult<u64> {
        Ok(self.load()?.iter().filter(|a| !a.resolved).count() as u64)
    }

    async fn cleanup_resolved_alerts(&self, older_than_days: u32) -> StepResult<u64> {
        if !self.path.exists() {
            return Ok(0);
        }
        let cutoff = Utc::now() - Duration::days(older_than_days as i64);
        let removed = self.modify(|alerts| {
            let before = alerts.len();
            alerts.retain(|a| !(a.resolved && a.resolved_at.unwrap_or(a.timestamp) < cutoff));
            (before - alerts.len()) as u64
        })?;
        if removed > 0 {
            warn!("[ALERT] Removed {} resolved alerts older than {} days", removed, older_than_days);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> FileAlertStore {
        FileAlertStore::new(temp.path().join("alerts/history.json"))
    }

    #[tokio::test]
    async fn test_create_and_count() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        assert_eq!(store.count_unresolved_alerts().await.unwrap(), 0);

        store
            .create_alert(AlertSeverity::Critical, "System unhealthy", "memory at 97%", None)
            .await
            .unwrap();
        store
            .create_alert(AlertSeverity::Warning, "Memory high", "used 91%", Some("acme"))
            .await
            .unwrap();

        assert_eq!(store.count_unresolved_alerts().await.unwrap(), 2);
        let acme = store.list(None, Some("acme"), None).unwrap();
        assert_eq!(acme.len(), 1);
        assert_eq!(acme[0].severity, AlertSeverity::Warning);
    }

    #[tokio::test]
    async fn test_resolve_alert() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store
            .create_alert(AlertSeverity::Critical, "Daemon down", "docker info failed", None)
            .await
            .unwrap();
        let id = store.load().unwrap()[0].id.clone();

        assert!(store.resolve_alert(&id).unwrap());
        assert!(!store.resolve_alert("no-such-id").unwrap());
        assert_eq!(store.count_unresolved_alerts().await.unwrap(), 0);
        assert!(store.load().unwrap()[0].resolved_at.is_some());
    }

    #[tokio::test]
    async fn test_cleanup_only_old_resolved() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let now = Utc::now();

        let mut old_resolved = Alert::new(AlertSeverity::Info, "old", "", None);
        old_resolved.resolved = true;
        old_resolved.resolved_at = Some(now - Duration::days(45));

        let mut recent_resolved = Alert::new(AlertSeverity::Info, "recent", "", None);
        recent_resolved.resolved = true;
        recent_resolved.resolved_at = Some(now - Duration::days(2));

        let mut old_open = Alert::new(AlertSeverity::Warning, "open", "", None);
        old_open.timestamp = now - Duration::days(90);

        store.save(&[old_resolved, recent_resolved, old_open]).unwrap();

        assert_eq!(store.cleanup_resolved_alerts(30).await.unwrap(), 1);
        let titles: Vec<String> = store.load().unwrap().into_iter().map(|a| a.title).collect();
        assert_eq!(titles, vec!["recent", "open"]);
    }

    #[test]
    fn test_reads_history_without_optional_fields() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            r#"[{"id":"a1","severity":"critical","title":"t","description":"d","timestamp":"2026-01-01T00:00:00Z"}]"#,
        )
        .unwrap();
        let alerts = store.load().unwrap();
        assert!(!alerts[0].resolved);
        assert!(alerts[0].tenant.is_none());
    }

    #[test]
    fn test_corrupt_history_is_an_error() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_err());
    }
}
