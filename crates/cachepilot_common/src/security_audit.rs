//! Security configuration audit
//!
//! Walks the fixed set of sensitive files and directories and compares
//! their modes with what they must be. Never stops at the first finding.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::ValidationError;
use crate::permissions::{mode_string, ALLOWED_DIR_MODES, SECRET_FILE_MODE};

/// Secrets under the config dir
pub const SENSITIVE_CONFIG_FILES: &[&str] = &[".env", "api-keys.json"];

/// CA private key, relative to the data dir
pub const CA_PRIVATE_KEY: &str = "ca/ca.key";

/// Sensitive directories relative to the data dir
pub const SENSITIVE_DATA_DIRS: &[&str] = &["ca", "tenants"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathCheck {
    pub path: PathBuf,
    /// Accepted modes, `|`-separated for directories
    pub expected_perm: String,
    /// `None` when the path does not exist or its mode cannot be read
    pub actual_perm: Option<String>,
    pub ok: bool,
}

/// Result of one audit; immutable once returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityAuditReport {
    pub checked_paths: Vec<PathCheck>,
    pub checked_dirs: Vec<PathCheck>,
    pub error_count: usize,
}

impl SecurityAuditReport {
    pub fn passed(&self) -> bool {
        self.error_count == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &PathCheck> {
        self.checked_paths
            .iter()
            .chain(self.checked_dirs.iter())
            .filter(|c| !c.ok)
    }
}

/// Audit sensitive files (mode 600) and directories (700 or 755).
///
/// Absent paths are recorded with `actual_perm: None` and are not counted:
/// a fresh install has no API key store yet.
pub fn audit_configuration(config_dir: &Path, data_dir: &Path) -> SecurityAuditReport {
    let mut files: Vec<PathBuf> = SENSITIVE_CONFIG_FILES
        .iter()
        .map(|f| config_dir.join(f))
        .collect();
    files.push(data_dir.join(CA_PRIVATE_KEY));

    let mut dirs: Vec<PathBuf> = SENSITIVE_DATA_DIRS.iter().map(|d| data_dir.join(d)).collect();
    dirs.push(config_dir.to_path_buf());

    let checked_paths: Vec<PathCheck> = files
        .into_iter()
        .map(|p| check_one(p, &[SECRET_FILE_MODE]))
        .collect();
    let checked_dirs: Vec<PathCheck> = dirs
        .into_iter()
        .map(|p| check_one(p, ALLOWED_DIR_MODES))
        .collect();

    let error_count = checked_paths
        .iter()
        .chain(checked_dirs.iter())
        .filter(|c| !c.ok)
        .count();

    if error_count == 0 {
        info!("[AUDIT] Security audit passed");
    } else {
        warn!("[AUDIT] Security audit found {} issue(s)", error_count);
    }

    SecurityAuditReport {
        checked_paths,
        checked_dirs,
        error_count,
    }
}

fn check_one(path: PathBuf, allowed: &[&str]) -> PathCheck {
    let expected_perm = allowed.join("|");

    match mode_string(&path) {
        Ok(actual) => {
            let ok = allowed.contains(&actual.as_str());
            if !ok {
                warn!(
                    "[AUDIT] {} has mode {} (expected {})",
                    path.display(),
                    actual,
                    expected_perm
                );
            }
            PathCheck {
                path,
                expected_perm,
                actual_perm: Some(actual),
                ok,
            }
        }
        Err(ValidationError::Path(_)) => PathCheck {
            path,
            expected_perm,
            actual_perm: None,
            ok: true,
        },
        Err(e) => {
            warn!("[AUDIT] {}", e);
            PathCheck {
                path,
                expected_perm,
                actual_perm: None,
                ok: false,
            }
        }
    }
}
