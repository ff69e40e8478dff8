//! Automated tenant backups
//!
//! Tenants opt in with a `backup.enabled` marker in their directory. Each
//! sweep writes `<tenant>_<YYYYmmdd_HHMMSS>.tar.gz` plus a sha256sum-style
//! sidecar. A configured `hooks.backup_auto_run` replaces the built-in sweep.

use async_trait::async_trait;
use cachepilot_common::{validate_backup_name, GuardedCommand};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::collaborators::{BackupService, StepResult};
use crate::config::Config;
use crate::steps::StepFailure;
use crate::tenants::list_tenants;

/// Archiving a large tenant takes longer than an ordinary command
const BACKUP_TIMEOUT_SECS: u64 = 120;

pub struct TarBackupService {
    tenants_dir: PathBuf,
    backups_dir: PathBuf,
    hook: Option<Vec<String>>,
    timeout: Duration,
}

impl TarBackupService {
    pub fn new(config: &Config) -> Self {
        let timeout = config
            .maintenance
            .command_timeout()
            .max(Duration::from_secs(BACKUP_TIMEOUT_SECS));
        Self {
            tenants_dir: config.paths.tenants_dir.clone(),
            backups_dir: config.paths.backups_dir.clone(),
            hook: config.hooks.backup_auto_run.clone(),
            timeout,
        }
    }

    async fn archive_tenant(&self, tenant: &str) -> StepResult<PathBuf> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let file_name = format!("{}_{}.tar.gz", tenant, stamp);
        validate_backup_name(&file_name)?;
        let archive = self.backups_dir.join(&file_name);

        if let Err(e) = self.write_archive(&archive, tenant).await {
            discard_partial(&archive);
            return Err(e);
        }
        Ok(archive)
    }

    /// tar, chmod 0600, checksum sidecar
    async fn write_archive(&self, archive: &Path, tenant: &str) -> StepResult<()> {
        GuardedCommand::new("tar")
            .arg("-czf")
            .untrusted_arg(archive.to_string_lossy())
            .arg("-C")
            .untrusted_arg(self.tenants_dir.to_string_lossy())
            .untrusted_arg(tenant)
            .timeout(self.timeout)
            .run_checked()
            .await?;

        fs::set_permissions(archive, fs::Permissions::from_mode(0o600))?;
        write_checksum(archive)?;
        Ok(())
    }
}

/// Remove whatever a failed archive run left in the backups directory.
fn discard_partial(archive: &Path) {
    let sidecar = PathBuf::from(format!("{}.sha256", archive.display()));
    for path in [archive, sidecar.as_path()] {
        match fs::remove_file(path) {
            Ok(()) => info!("[BACKUP] Removed partial {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("[BACKUP] Cannot remove partial {}: {}", path.display(), e),
        }
    }
}

/// `<archive>.sha256` in `sha256sum` format
pub fn write_checksum(archive: &Path) -> StepResult<PathBuf> {
    let digest = sha256_file(archive)?;
    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sidecar = PathBuf::from(format!("{}.sha256", archive.display()));
    fs::write(&sidecar, format!("{}  {}\n", digest, file_name))?;
    Ok(sidecar)
}

pub fn sha256_file(path: &Path) -> StepResult<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[async_trait]
impl BackupService for TarBackupService {
    async fn backup_init(&self) -> StepResult<()> {
        fs::create_dir_all(&self.backups_dir)?;
        fs::set_permissions(&self.backups_dir, fs::Permissions::from_mode(0o700))?;
        Ok(())
    }

    async fn backup_auto_run(&self) -> StepResult<u64> {
        if let Some(argv) = &self.hook {
            let cmd = GuardedCommand::from_argv(argv)
                .ok_or_else(|| StepFailure::collaborator("backup hook is empty"))?
                .timeout(self.timeout);
            info!("[BACKUP] Running hook: {}", cmd.display());
            cmd.run_checked().await?;
            return Ok(0);
        }

        let mut written = 0u64;
        for tenant in list_tenants(&self.tenants_dir)? {
            if !tenant.backup_enabled() {
                continue;
            }
            // first failure ends the sweep
            let archive = self.archive_tenant(&tenant.name).await?;
            info!("[BACKUP] {} -> {}", tenant.name, archive.display());
            written += 1;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachepilot_common::secrets::find_in_path;
    use tempfile::TempDir;

    fn service(temp: &TempDir) -> TarBackupService {
        let mut config = Config::default();
        config.paths.tenants_dir = temp.path().join("tenants");
        config.paths.backups_dir = temp.path().join("backups");
        TarBackupService::new(&config)
    }

    #[tokio::test]
    async fn test_init_creates_private_dir() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        service.backup_init().await.unwrap();
        let mode = fs::metadata(&service.backups_dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }

    #[test]
    fn test_checksum_sidecar() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("acme_20260101_000000.tar.gz");
        fs::write(&archive, b"abc").unwrap();

        let sidecar = write_checksum(&archive).unwrap();
        let content = fs::read_to_string(sidecar).unwrap();
        assert_eq!(
            content,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad  acme_20260101_000000.tar.gz\n"
        );
    }

    #[tokio::test]
    async fn test_auto_run_archives_opted_in_tenants() {
        if find_in_path("tar").is_none() || find_in_path("gzip").is_none() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let tenants = temp.path().join("tenants");
        fs::create_dir_all(tenants.join("acme")).unwrap();
        fs::create_dir_all(tenants.join("blog")).unwrap();
        fs::write(tenants.join("acme/config.env"), "PORT=7300\n").unwrap();
        fs::write(tenants.join("acme/backup.enabled"), "").unwrap();

        service.backup_init().await.unwrap();
        assert_eq!(service.backup_auto_run().await.unwrap(), 1);

        let names: Vec<String> = fs::read_dir(&service.backups_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n.starts_with("acme_") && n.ends_with(".tar.gz")));
        assert!(names.iter().any(|n| n.ends_with(".tar.gz.sha256")));
    }

    #[tokio::test]
    async fn test_failed_archive_leaves_nothing_behind() {
        if find_in_path("tar").is_none() || find_in_path("gzip").is_none() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        fs::create_dir_all(temp.path().join("tenants")).unwrap();
        service.backup_init().await.unwrap();

        // tar creates the output file before it notices the tenant is missing
        assert!(service.archive_tenant("ghost").await.is_err());
        assert_eq!(fs::read_dir(&service.backups_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_discard_partial_removes_sidecar() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("acme_20260101_000000.tar.gz");
        fs::write(&archive, b"partial").unwrap();
        write_checksum(&archive).unwrap();

        discard_partial(&archive);
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
        // nothing left to remove is not an error
        discard_partial(&archive);
    }

    #[tokio::test]
    async fn test_rejected_hook_fails_the_step() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.backups_dir = temp.path().join("backups");
        config.hooks.backup_auto_run = Some(vec!["python3".into(), "backup.py".into()]);
        let service = TarBackupService::new(&config);

        let err = service.backup_auto_run().await.unwrap_err();
        assert!(matches!(err, StepFailure::Command(_)));
    }
}
