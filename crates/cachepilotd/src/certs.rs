//! Certificate maintenance
//!
//! Discovers certificates under the CA store, counts the ones inside the
//! warning window and hands renewal to an operator hook. Issuance itself
//! happens elsewhere.

use async_trait::async_trait;
use cachepilot_common::{CertificateInspector, GuardedCommand, TriStateCode};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::collaborators::{CertificateMaintenance, StepResult};
use crate::config::Config;
use crate::steps::StepFailure;

/// Tenant CA layouts nest at most `ca/<tenant>/<cert>`
const MAX_SCAN_DEPTH: usize = 3;

/// `*.crt` and `*.pem`, excluding private keys stored as `*-key.pem`/`key.pem`
pub fn is_certificate_file(path: &Path) -> bool {
    let ext_ok = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("crt") | Some("pem")
    );
    let is_key = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.ends_with("key"))
        .unwrap_or(false);
    ext_ok && !is_key
}

/// Certificates under `ca_dir`, sorted. Missing directory = none.
pub fn discover_certificates(ca_dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(ca_dir)
        .max_depth(MAX_SCAN_DEPTH)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_certificate_file(p))
        .collect();
    found.sort();
    found
}

/// Classify every certificate; unreadable ones take the error's severity.
pub async fn classify_certificates(
    inspector: &CertificateInspector,
    certs: &[PathBuf],
    warn_days: i64,
) -> Vec<(PathBuf, TriStateCode)> {
    let mut results = Vec::with_capacity(certs.len());
    for cert in certs {
        let code = match inspector.verify_certificate_validity(cert, warn_days).await {
            Ok(code) => code,
            Err(e) => {
                warn!("[CERT] {}: {}", cert.display(), e);
                e.severity()
            }
        };
        results.push((cert.clone(), code));
    }
    results
}

pub struct HostCertificateMaintenance {
    ca_dir: PathBuf,
    warn_days: i64,
    renew_hook: Option<Vec<String>>,
    inspector: CertificateInspector,
}

impl HostCertificateMaintenance {
    pub fn new(config: &Config) -> Self {
        let timeout = config.maintenance.command_timeout();
        Self {
            ca_dir: config.paths.ca_dir.clone(),
            warn_days: config.maintenance.cert_warn_days,
            renew_hook: config.hooks.cert_renew.clone(),
            inspector: CertificateInspector::new(timeout),
        }
    }
}

#[async_trait]
impl CertificateMaintenance for HostCertificateMaintenance {
    async fn check_expiring(&self) -> StepResult<u64> {
        let certs = discover_certificates(&self.ca_dir);
        let results = classify_certificates(&self.inspector, &certs, self.warn_days).await;

        let expiring = results
            .iter()
            .filter(|(_, code)| !code.is_healthy())
            .inspect(|(path, code)| info!("[CERT] {} is {}", path.display(), code))
            .count() as u64;

        Ok(expiring)
    }

    async fn renew_expiring(&self) -> StepResult<()> {
        let Some(argv) = &self.renew_hook else {
            return Err(StepFailure::collaborator("no renewal hook configured"));
        };
        let cmd = GuardedCommand::from_argv(argv)
            .ok_or_else(|| StepFailure::collaborator("renewal hook is empty"))?;
        info!("[CERT] Running renewal hook: {}", cmd.display());
        cmd.run_checked().await?;
        Ok(())
    }
}
