//! Configuration management for cachepilotd.
//!
//! Loads settings from /etc/cachepilot/maintenance.toml, then
//! /opt/cachepilot/config/maintenance.toml, or uses defaults.
//! Directory locations can be overridden from the environment.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/cachepilot/maintenance.toml";

/// Fallback config file path
pub const DEFAULT_CONFIG_PATH: &str = "/opt/cachepilot/config/maintenance.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "CACHEPILOT_CONFIG";

/// Directory layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Installation root; `validate_path` base for managed files
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Secrets and API keys
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Parent of the CA store and tenant data (audited as a unit)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_tenants_dir")]
    pub tenants_dir: PathBuf,

    #[serde(default = "default_ca_dir")]
    pub ca_dir: PathBuf,

    #[serde(default = "default_backups_dir")]
    pub backups_dir: PathBuf,

    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/opt/cachepilot")
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/cachepilot")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/cachepilot")
}

fn default_tenants_dir() -> PathBuf {
    PathBuf::from("/var/cachepilot/tenants")
}

fn default_ca_dir() -> PathBuf {
    PathBuf::from("/var/cachepilot/ca")
}

fn default_backups_dir() -> PathBuf {
    PathBuf::from("/var/cachepilot/backups")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("/var/log/cachepilot")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            config_dir: default_config_dir(),
            data_dir: default_data_dir(),
            tenants_dir: default_tenants_dir(),
            ca_dir: default_ca_dir(),
            backups_dir: default_backups_dir(),
            logs_dir: default_logs_dir(),
        }
    }
}

impl PathsConfig {
    /// Maintenance log directory
    pub fn maintenance_log_dir(&self) -> PathBuf {
        self.logs_dir.join("maintenance")
    }

    /// Today's maintenance log file
    pub fn maintenance_log_file(&self) -> PathBuf {
        let date = chrono::Local::now().format("%Y%m%d");
        self.maintenance_log_dir()
            .join(format!("maintenance-{}.log", date))
    }

    pub fn security_log_file(&self) -> PathBuf {
        self.logs_dir
            .join(cachepilot_common::audit_log::SECURITY_LOG_FILE)
    }

    pub fn alerts_file(&self) -> PathBuf {
        self.logs_dir.join("alerts").join("history.json")
    }

    pub fn metrics_dir(&self) -> PathBuf {
        self.logs_dir.join("metrics")
    }

    pub fn stats_file(&self) -> PathBuf {
        self.logs_dir.join("stats.json")
    }
}

/// Thresholds, retention and timeouts for a maintenance run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Bound on every external command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_cert_warn_days")]
    pub cert_warn_days: i64,

    #[serde(default = "default_log_retention")]
    pub maintenance_log_retention_days: u32,

    #[serde(default = "default_metrics_retention")]
    pub metrics_retention_days: u32,

    /// Resolved alerts older than this are dropped
    #[serde(default = "default_alert_retention")]
    pub alert_retention_days: u32,

    #[serde(default = "default_disk_warn")]
    pub disk_warn_free_percent: f64,

    #[serde(default = "default_disk_critical")]
    pub disk_critical_free_percent: f64,

    #[serde(default = "default_memory_warn")]
    pub memory_warn_percent: f64,

    #[serde(default = "default_memory_critical")]
    pub memory_critical_percent: f64,

    /// flock target preventing overlapping runs
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
}

fn default_command_timeout() -> u64 {
    30
}

fn default_cert_warn_days() -> i64 {
    30
}

fn default_log_retention() -> u32 {
    30
}

fn default_metrics_retention() -> u32 {
    7
}

fn default_alert_retention() -> u32 {
    30
}

fn default_disk_warn() -> f64 {
    20.0
}

fn default_disk_critical() -> f64 {
    10.0
}

fn default_memory_warn() -> f64 {
    85.0
}

fn default_memory_critical() -> f64 {
    95.0
}

fn default_lock_file() -> PathBuf {
    PathBuf::from("/run/lock/cachepilot-maintenance.lock")
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            cert_warn_days: default_cert_warn_days(),
            maintenance_log_retention_days: default_log_retention(),
            metrics_retention_days: default_metrics_retention(),
            alert_retention_days: default_alert_retention(),
            disk_warn_free_percent: default_disk_warn(),
            disk_critical_free_percent: default_disk_critical(),
            memory_warn_percent: default_memory_warn(),
            memory_critical_percent: default_memory_critical(),
            lock_file: default_lock_file(),
        }
    }
}

impl MaintenanceConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Operator-supplied command lines (argv, no shell)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HooksConfig {
    /// Renews expiring certificates, e.g. `["systemctl", "start", "cachepilot-renew"]`
    #[serde(default)]
    pub cert_renew: Option<Vec<String>>,

    /// Replaces the built-in tar sweep
    #[serde(default)]
    pub backup_auto_run: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    #[serde(default)]
    pub hooks: HooksConfig,
}

impl Config {
    /// Load config from file, or return defaults. Environment overrides apply
    /// in every case.
    pub fn load() -> Self {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load_from_path(Path::new(&path)).unwrap_or_else(|e| {
                warn!("[CONFIG] {} unusable, using defaults: {:#}", path, e);
                Config::default()
            }),
            Err(_) => Self::load_first(&[Path::new(CONFIG_PATH), Path::new(DEFAULT_CONFIG_PATH)])
                .unwrap_or_else(|e| {
                    warn!("[CONFIG] Using defaults: {:#}", e);
                    Config::default()
                }),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// `path` when it loads, otherwise the regular lookup. Used by the
    /// scheduled run, which must not fail on its config.
    pub fn load_lenient(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::load();
        };
        match Self::load_from_path(path) {
            Ok(mut config) => {
                config.apply_env_overrides(|key| std::env::var(key).ok());
                config
            }
            Err(e) => {
                warn!("[CONFIG] {} unusable, falling back: {:#}", path.display(), e);
                Self::load()
            }
        }
    }

    /// First candidate that loads. Files that exist but fail to parse are
    /// reported, not silently skipped.
    fn load_first(candidates: &[&Path]) -> Result<Self> {
        let mut last_err = None;
        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from_path(path) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    warn!("[CONFIG] Ignoring {}: {:#}", path.display(), e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("no config file found")))
    }

    /// Load config from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        info!("[CONFIG] Loaded config from {}", path.display());
        Ok(config)
    }

    /// `TENANTS_DIR`, `CA_DIR`, `BACKUPS_DIR`, `LOGS_DIR`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides: [(&str, &mut PathBuf); 4] = [
            ("TENANTS_DIR", &mut self.paths.tenants_dir),
            ("CA_DIR", &mut self.paths.ca_dir),
            ("BACKUPS_DIR", &mut self.paths.backups_dir),
            ("LOGS_DIR", &mut self.paths.logs_dir),
        ];
        for (key, slot) in overrides {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                info!("[CONFIG] {} overridden from environment", key);
                *slot = PathBuf::from(value);
            }
        }
    }

    /// Reject relative directories and inverted thresholds.
    pub fn validate(&self) -> Result<()> {
        let p = &self.paths;
        for (name, dir) in [
            ("base_dir", &p.base_dir),
            ("config_dir", &p.config_dir),
            ("data_dir", &p.data_dir),
            ("tenants_dir", &p.tenants_dir),
            ("ca_dir", &p.ca_dir),
            ("backups_dir", &p.backups_dir),
            ("logs_dir", &p.logs_dir),
        ] {
            if !dir.is_absolute() {
                bail!("paths.{} must be absolute, got {}", name, dir.display());
            }
            if dir
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                bail!("paths.{} must not contain '..'", name);
            }
        }

        let m = &self.maintenance;
        if m.command_timeout_secs == 0 {
            bail!("maintenance.command_timeout_secs must be positive");
        }
        if m.cert_warn_days < 0 {
            bail!("maintenance.cert_warn_days must not be negative");
        }
        if !(0.0..=100.0).contains(&m.disk_warn_free_percent)
            || m.disk_critical_free_percent > m.disk_warn_free_percent
        {
            bail!("disk thresholds must satisfy 0 <= critical <= warn <= 100");
        }
        if !(0.0..=100.0).contains(&m.memory_critical_percent)
            || m.memory_warn_percent > m.memory_critical_percent
        {
            bail!("memory thresholds must satisfy warn <= critical <= 100");
        }

        for (name, hook) in [
            ("cert_renew", &self.hooks.cert_renew),
            ("backup_auto_run", &self.hooks.backup_auto_run),
        ] {
            if let Some(argv) = hook {
                let Some(program) = argv.first() else {
                    bail!("hooks.{} must not be empty", name);
                };
                cachepilot_common::check_command_whitelist(program)
                    .with_context(|| format!("hooks.{}", name))?;
            }
        }

        Ok(())
    }
}
